//! Navigation to a review option
//!
//! Walks right through the review pages until the policy's target text is on
//! screen, then selects it. Every visited screen can be kept under
//! `<root>/snapshots-tmp/<testcase>/` for post-mortem inspection.

use std::path::PathBuf;
use std::time::Duration;

use crate::common::config::Config;
use crate::common::{paths, Error, Result};
use crate::emulator::{contains_text, Button, Emulator, ScreenEvent, Snapshot};

use super::policy::ApprovalPolicy;
use super::wait::wait_until_screen_is_not;

/// What a completed navigation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationReport {
    /// Right presses before the target was reached
    pub steps: usize,
    /// Snapshot files written, in visit order
    pub snapshots: Vec<PathBuf>,
}

/// Navigator settings
#[derive(Debug, Clone)]
pub struct Navigator {
    /// Snapshot directory; `None` disables saving
    snapshot_dir: Option<PathBuf>,
    timeout: Duration,
    poll_interval: Duration,
}

impl Navigator {
    pub fn new(snapshot_dir: Option<PathBuf>, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            snapshot_dir,
            timeout,
            poll_interval,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let nav = &config.navigation;
        let snapshot_dir = nav
            .save_snapshots
            .then(|| paths::snapshot_dir(&nav.root, &nav.testcase));
        Self::new(snapshot_dir, nav.timeout(), config.emulator.poll_interval())
    }

    /// Advance until the policy's target is shown, then select it
    pub async fn navigate_until_text<E: Emulator + ?Sized>(
        &self,
        emulator: &E,
        policy: &dyn ApprovalPolicy,
    ) -> Result<NavigationReport> {
        let text = policy.target_text();
        tokio::time::timeout(self.timeout, self.navigate(emulator, policy))
            .await
            .map_err(|_| Error::navigation_timeout(text, self.timeout.as_secs()))?
    }

    async fn navigate<E: Emulator + ?Sized>(
        &self,
        emulator: &E,
        policy: &dyn ApprovalPolicy,
    ) -> Result<NavigationReport> {
        if let Some(dir) = &self.snapshot_dir {
            paths::reset_snapshot_dir(dir)?;
        }

        let mut report = NavigationReport {
            steps: 0,
            snapshots: Vec::new(),
        };

        loop {
            let (current, screen) = self.read_screen(emulator).await?;
            self.save(&current, &mut report).await?;

            if contains_text(&screen, policy.target_text()) {
                tracing::info!(
                    steps = report.steps,
                    "Reached '{}', selecting it",
                    policy.target_text()
                );
                emulator.press(policy.confirm_button()).await?;
                return Ok(report);
            }

            emulator.press(Button::Right).await?;
            report.steps += 1;
            wait_until_screen_is_not(emulator, &current, self.poll_interval).await?;
        }
    }

    /// Read a snapshot and the text drawn on that same screen
    ///
    /// Retries while the screen changes between the two reads, so a saved
    /// snapshot always shows the text the decision was made on.
    async fn read_screen<E: Emulator + ?Sized>(
        &self,
        emulator: &E,
    ) -> Result<(Snapshot, Vec<ScreenEvent>)> {
        let mut before = emulator.snapshot().await?;
        loop {
            let screen = emulator.screen_text().await?;
            let after = emulator.snapshot().await?;
            if after == before {
                return Ok((after, screen));
            }
            tracing::trace!("Screen moved while reading it, reading again");
            before = after;
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn save(&self, snapshot: &Snapshot, report: &mut NavigationReport) -> Result<()> {
        let Some(dir) = &self.snapshot_dir else {
            return Ok(());
        };
        let path = paths::snapshot_file(dir, report.snapshots.len());
        tokio::fs::write(&path, snapshot.as_bytes()).await?;
        report.snapshots.push(path);
        Ok(())
    }
}
