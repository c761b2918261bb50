//! Shutdown triggers
//!
//! The driver stops when interrupted or when its stdin reaches end-of-file,
//! which is how a parent test process that goes away is noticed.

use std::fmt;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::common::Result;

/// What asked the driver to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// stdin closed
    StdinClosed,
}

impl fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownTrigger::Interrupt => f.write_str("interrupt signal"),
            ShutdownTrigger::Terminate => f.write_str("terminate signal"),
            ShutdownTrigger::StdinClosed => f.write_str("stdin closed"),
        }
    }
}

/// Wait for the first shutdown trigger
pub async fn wait_for_trigger() -> Result<ShutdownTrigger> {
    tokio::select! {
        trigger = wait_for_signal() => trigger,
        result = wait_for_eof(tokio::io::stdin()) => result.map(|()| ShutdownTrigger::StdinClosed),
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<ShutdownTrigger> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => Ok(ShutdownTrigger::Interrupt),
        _ = sigterm.recv() => Ok(ShutdownTrigger::Terminate),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<ShutdownTrigger> {
    tokio::signal::ctrl_c().await?;
    Ok(ShutdownTrigger::Interrupt)
}

/// Drain `reader` until end-of-file
///
/// Anything written to it is discarded. A read error counts as closed.
async fn wait_for_eof<R: AsyncRead + Unpin>(mut reader: R) -> Result<()> {
    let mut buf = [0u8; 256];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => return Ok(()),
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!("stdin read failed, treating as closed: {}", e);
                return Ok(());
            }
        }
    }
}
