//! Flow execution error types

use action_primitives::ActionError;
use thiserror::Error;

/// A step that ended its flow early.
///
/// Carries the id of the step that stopped so the recorder can attach the
/// terminal phase to it.
#[derive(Debug, Error)]
#[error("Step {step_id} stopped: {source}")]
pub struct FlowError {
    pub step_id: String,
    #[source]
    pub source: ActionError,
}

impl FlowError {
    pub fn at(step_id: impl Into<String>, source: ActionError) -> Self {
        Self {
            step_id: step_id.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.source.is_cancelled()
    }
}

/// Attach a step id to a primitive result.
pub(crate) trait StepResultExt<T> {
    fn at_step(self, step_id: &str) -> Result<T, FlowError>;
}

impl<T> StepResultExt<T> for Result<T, ActionError> {
    fn at_step(self, step_id: &str) -> Result<T, FlowError> {
        self.map_err(|err| FlowError::at(step_id, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_id_travels_with_the_error() {
        let result: Result<(), ActionError> = Err(ActionError::Validation("bad".into()));
        let err = result.at_step("2").unwrap_err();
        assert_eq!(err.step_id, "2");
        assert!(!err.is_cancelled());
        assert_eq!(err.to_string(), "Step 2 stopped: Validation failed: bad");
    }
}
