//! Driver loop
//!
//! Rests on the main menu, and whenever the screen leaves it (a client
//! submitted an operation) walks to the policy's option, selects it and waits
//! for the menu to come back.

pub mod navigator;
pub mod policy;
mod session;
pub mod shutdown;
pub mod wait;

use std::convert::Infallible;
use std::time::Duration;

use crate::common::config::Config;
use crate::common::Result;
use crate::emulator::Emulator;

pub use navigator::{NavigationReport, Navigator};
pub use policy::{ApprovalPolicy, ApproveAll, RejectAll};
pub use session::Session;
pub use shutdown::ShutdownTrigger;

/// Reacts to every operation shown on the device
#[derive(Debug)]
pub struct Driver {
    policy: Box<dyn ApprovalPolicy>,
    navigator: Navigator,
    poll_interval: Duration,
}

impl Driver {
    pub fn new(
        policy: Box<dyn ApprovalPolicy>,
        navigator: Navigator,
        poll_interval: Duration,
    ) -> Self {
        Self {
            policy,
            navigator,
            poll_interval,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            policy::from_kind(config.policy),
            Navigator::from_config(config),
            config.emulator.poll_interval(),
        )
    }

    /// Handle operations forever
    ///
    /// Only returns on error; shutdown happens by dropping the future.
    pub async fn run<E: Emulator + ?Sized>(&self, emulator: &E) -> Result<Infallible> {
        let mut handled: u64 = 0;
        loop {
            let report = self.handle_next(emulator).await?;
            handled += 1;
            tracing::info!(handled, steps = report.steps, "Operation answered");
        }
    }

    /// Wait for one operation, answer it, and wait for the menu to return
    pub async fn handle_next<E: Emulator + ?Sized>(&self, emulator: &E) -> Result<NavigationReport> {
        let resting = emulator.main_menu_snapshot().clone();

        wait::wait_until_screen_is_not(emulator, &resting, self.poll_interval).await?;
        tracing::debug!("Screen left the main menu");

        let report = self
            .navigator
            .navigate_until_text(emulator, self.policy.as_ref())
            .await?;

        wait::wait_until_screen_is(emulator, &resting, self.poll_interval).await?;
        tracing::debug!("Back on the main menu");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::scripted::{ScriptedEmulator, REVIEW_FLOW};
    use crate::emulator::Button;

    const POLL: Duration = Duration::from_millis(1);

    fn driver(policy: Box<dyn ApprovalPolicy>) -> Driver {
        Driver::new(policy, Navigator::new(None, Duration::from_secs(5), POLL), POLL)
    }

    #[tokio::test]
    async fn test_answers_each_operation_once() {
        let emulator = ScriptedEmulator::new(REVIEW_FLOW);
        let handle = emulator.handle();
        let driver = driver(Box::new(ApproveAll));

        let script = async {
            // Nothing is pressed while resting
            tokio::time::sleep(Duration::from_millis(30)).await;
            assert!(handle.presses().is_empty());

            handle.trigger();
            handle.wait_for_outcomes(1).await;
            let after_first = handle.presses();
            assert_eq!(after_first, vec![Button::Right, Button::Right, Button::Both]);

            tokio::time::sleep(Duration::from_millis(30)).await;
            assert_eq!(handle.presses(), after_first);

            handle.trigger();
            handle.wait_for_outcomes(2).await;
        };

        tokio::select! {
            result = driver.run(&emulator) => panic!("driver stopped: {:?}", result),
            () = script => {}
        }

        assert_eq!(handle.outcomes(), vec!["approved", "approved"]);
        assert_eq!(handle.presses().len(), 6);
    }

    #[tokio::test]
    async fn test_handle_next_returns_after_menu_is_back() {
        let emulator = ScriptedEmulator::new(REVIEW_FLOW);
        let handle = emulator.handle();
        handle.trigger();

        let report = driver(Box::new(RejectAll))
            .handle_next(&emulator)
            .await
            .unwrap();
        assert_eq!(report.steps, 3);
        assert!(handle.is_resting());
        assert_eq!(handle.outcomes(), vec!["rejected"]);
    }

    #[tokio::test]
    async fn test_navigation_failure_ends_loop() {
        let emulator = ScriptedEmulator::new(&[&["Review"], &["Blind signing"]]);
        emulator.handle().trigger();

        let driver = Driver::new(
            Box::new(ApproveAll),
            Navigator::new(None, Duration::from_millis(50), POLL),
            POLL,
        );
        let err = driver.run(&emulator).await.unwrap_err();
        assert!(matches!(err, crate::common::Error::NavigationTimeout { .. }));
    }
}
