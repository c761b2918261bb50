//! Screen-state waits
//!
//! Both waits poll without a deadline. A device that never changes state
//! blocks the driver until the surrounding test run times out.

use std::time::Duration;

use crate::common::Result;
use crate::emulator::{Emulator, Snapshot};

/// Block until the screen differs from `snapshot`, returning the new screen
pub async fn wait_until_screen_is_not<E: Emulator + ?Sized>(
    emulator: &E,
    snapshot: &Snapshot,
    poll_interval: Duration,
) -> Result<Snapshot> {
    loop {
        let current = emulator.snapshot().await?;
        if current != *snapshot {
            return Ok(current);
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Block until the screen equals `snapshot`
pub async fn wait_until_screen_is<E: Emulator + ?Sized>(
    emulator: &E,
    snapshot: &Snapshot,
    poll_interval: Duration,
) -> Result<()> {
    loop {
        if emulator.snapshot().await? == *snapshot {
            return Ok(());
        }
        tokio::time::sleep(poll_interval).await;
    }
}
