//! Step transition recording

use std::collections::BTreeMap;
use std::sync::Arc;

use autopilot_core_types::{
    DispatchId, FailureKind, FlowId, FlowOutcome, FlowRun, StepEvent, StepPhase, StepResult,
};
use autopilot_event_bus::EventBus;
use chrono::Utc;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::FlowError;
use crate::types::FlowContext;

/// Collects the step transitions of one run and mirrors them to the event bus
/// and the log.
pub struct StepRecorder {
    flow_id: FlowId,
    dispatch_id: DispatchId,
    events: Option<Arc<dyn EventBus<StepEvent>>>,
    steps: Vec<StepResult>,
    artifacts: BTreeMap<String, Value>,
    started_at: chrono::DateTime<Utc>,
    started: Instant,
}

impl StepRecorder {
    pub fn new(flow_id: FlowId, ctx: &FlowContext) -> Self {
        Self {
            flow_id,
            dispatch_id: ctx.dispatch_id.clone(),
            events: ctx.events.clone(),
            steps: Vec::new(),
            artifacts: BTreeMap::new(),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn start(&mut self, step_id: &str, message: impl Into<String>) {
        self.record(step_id, StepPhase::Start, message.into());
    }

    pub fn ok(&mut self, step_id: &str, message: impl Into<String>) {
        self.record(step_id, StepPhase::Ok, message.into());
    }

    pub fn skip(&mut self, step_id: &str, message: impl Into<String>) {
        self.record(step_id, StepPhase::Skip, message.into());
    }

    pub fn fail(&mut self, step_id: &str, message: impl Into<String>) {
        self.record(step_id, StepPhase::Fail, message.into());
    }

    pub fn artifact(&mut self, name: &str, value: Value) {
        self.artifacts.insert(name.to_string(), value);
    }

    /// Close the run with the given outcome.
    pub fn done(self, outcome: FlowOutcome, message: &str) -> FlowRun {
        self.finish(outcome, None, message)
    }

    /// Close the run after a step stopped it. Cancellation becomes a `Skip` on
    /// that step and an aborted run; anything else is a `Fail`.
    pub fn halt(mut self, err: FlowError) -> FlowRun {
        if err.is_cancelled() {
            let message = match &err.source {
                action_primitives::ActionError::Cancelled(reason) if reason.starts_with("aborted") => {
                    reason.clone()
                }
                other => format!("aborted: {}", other),
            };
            self.skip(&err.step_id, message);
            return self.finish(FlowOutcome::Aborted, None, "flow aborted by navigation");
        }

        self.fail(&err.step_id, err.source.to_string());
        let failure = err.source.failure_kind().unwrap_or(FailureKind::ValidationFailure);
        self.finish(FlowOutcome::Failed, Some(failure), "flow failed")
    }

    fn finish(self, outcome: FlowOutcome, failure: Option<FailureKind>, message: &str) -> FlowRun {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        match outcome {
            FlowOutcome::Failed => warn!(
                flow = %self.flow_id,
                dispatch_id = %self.dispatch_id,
                elapsed_ms,
                failure = ?failure,
                "{}", message
            ),
            _ => info!(
                flow = %self.flow_id,
                dispatch_id = %self.dispatch_id,
                elapsed_ms,
                outcome = ?outcome,
                "{}", message
            ),
        }

        FlowRun {
            flow_id: self.flow_id,
            dispatch_id: self.dispatch_id,
            steps: self.steps,
            outcome,
            failure,
            artifacts: self.artifacts,
            started_at: self.started_at,
            elapsed_ms,
        }
    }

    fn record(&mut self, step_id: &str, phase: StepPhase, message: String) {
        match phase {
            StepPhase::Start => debug!(
                flow = %self.flow_id,
                dispatch_id = %self.dispatch_id,
                step = step_id,
                "STEP {} {} - {}", step_id, phase, message
            ),
            StepPhase::Fail => warn!(
                flow = %self.flow_id,
                dispatch_id = %self.dispatch_id,
                step = step_id,
                "STEP {} {} - {}", step_id, phase, message
            ),
            StepPhase::Ok | StepPhase::Skip => info!(
                flow = %self.flow_id,
                dispatch_id = %self.dispatch_id,
                step = step_id,
                "STEP {} {} - {}", step_id, phase, message
            ),
        }

        let result = StepResult {
            step_id: step_id.to_string(),
            phase,
            message,
            at: Utc::now(),
        };

        if let Some(events) = &self.events {
            let event = StepEvent {
                flow_id: self.flow_id,
                dispatch_id: self.dispatch_id.clone(),
                step: result.clone(),
            };
            if let Err(err) = events.publish(event) {
                debug!(error = %err, "step event not delivered");
            }
        }

        self.steps.push(result);
    }
}
