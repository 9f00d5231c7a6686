//! Error types for action primitives

use autopilot_core_types::FailureKind;
use thiserror::Error;

/// Error types for action primitive operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// Bounded wait condition never became true
    #[error("Wait timeout: {0}")]
    WaitTimeout(String),

    /// Superseded by a newer navigation
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Configured or requested value is not acceptable
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Expected control is absent
    #[error("Element not found: {0}")]
    ElementMissing(String),

    /// Expected control is present but inert
    #[error("Element disabled: {0}")]
    ElementDisabled(String),
}

impl ActionError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ActionError::Cancelled(_))
    }

    /// Failure classification for the flow run. Cancellation is not a failure.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ActionError::WaitTimeout(_) => Some(FailureKind::Timeout),
            ActionError::Cancelled(_) => None,
            ActionError::Validation(_) => Some(FailureKind::ValidationFailure),
            ActionError::ElementMissing(_) => Some(FailureKind::ElementMissing),
            ActionError::ElementDisabled(_) => Some(FailureKind::ElementDisabled),
        }
    }
}
