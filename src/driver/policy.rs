//! Approval policies
//!
//! A policy names the review option the navigator walks to and how it is
//! selected. The loop itself never decides.

use std::fmt::Debug;

use crate::common::config::PolicyKind;
use crate::emulator::Button;

/// Decision applied to every pending operation
pub trait ApprovalPolicy: Send + Sync + Debug {
    /// Text of the screen to navigate to
    fn target_text(&self) -> &str;

    /// Button that selects the target screen
    fn confirm_button(&self) -> Button {
        Button::Both
    }
}

/// Approve everything
#[derive(Debug, Default, Clone, Copy)]
pub struct ApproveAll;

impl ApprovalPolicy for ApproveAll {
    fn target_text(&self) -> &str {
        "APPROVE"
    }
}

/// Reject everything
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectAll;

impl ApprovalPolicy for RejectAll {
    fn target_text(&self) -> &str {
        "REJECT"
    }
}

/// Build the policy selected in configuration
pub fn from_kind(kind: PolicyKind) -> Box<dyn ApprovalPolicy> {
    match kind {
        PolicyKind::ApproveAll => Box::new(ApproveAll),
        PolicyKind::RejectAll => Box::new(RejectAll),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_kind() {
        assert_eq!(from_kind(PolicyKind::ApproveAll).target_text(), "APPROVE");
        assert_eq!(from_kind(PolicyKind::RejectAll).target_text(), "REJECT");
        assert_eq!(
            from_kind(PolicyKind::RejectAll).confirm_button(),
            Button::Both
        );
    }
}
