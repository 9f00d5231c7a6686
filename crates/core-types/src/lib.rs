use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod settings;

pub use settings::{ApplicationSettings, CommonSettings, SelectionSettings, Settings};

/// Shared error type for the orchestrator crates.
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("{message}")]
    Message { message: String },
}

impl CoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct DispatchId(pub String);

impl DispatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for DispatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies the current view of the application. Compared by equality only.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    pub fn new(href: impl Into<String>) -> Self {
        Self(href.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path component used for route matching.
    ///
    /// Absolute URLs are parsed; anything else is treated as a path with the
    /// query string and fragment stripped.
    pub fn path(&self) -> String {
        match url::Url::parse(&self.0) {
            Ok(url) => url.path().to_string(),
            Err(_) => {
                let end = self
                    .0
                    .find(|c: char| c == '?' || c == '#')
                    .unwrap_or(self.0.len());
                self.0[..end].to_string()
            }
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Location {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Location {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Origin of a location change.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NavigationKind {
    /// Full page load; the page the host starts on
    Load,
    PushState,
    ReplaceState,
    PopState,
}

impl fmt::Display for NavigationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NavigationKind::Load => "load",
            NavigationKind::PushState => "pushState",
            NavigationKind::ReplaceState => "replaceState",
            NavigationKind::PopState => "popstate",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NavigationEvent {
    pub kind: NavigationKind,
    pub location: Location,
}

impl NavigationEvent {
    pub fn new(kind: NavigationKind, location: impl Into<Location>) -> Self {
        Self {
            kind,
            location: location.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowId {
    Selection,
    Application,
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowId::Selection => f.write_str("selection"),
            FlowId::Application => f.write_str("application"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepPhase {
    Start,
    Ok,
    Skip,
    Fail,
}

impl StepPhase {
    pub fn is_terminal(self) -> bool {
        !matches!(self, StepPhase::Start)
    }
}

impl fmt::Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StepPhase::Start => "START",
            StepPhase::Ok => "OK",
            StepPhase::Skip => "SKIP",
            StepPhase::Fail => "FAIL",
        };
        f.pad(label)
    }
}

/// One phase transition of one step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub phase: StepPhase,
    pub message: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub at: DateTime<Utc>,
}

/// Observability record published for every step transition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepEvent {
    pub flow_id: FlowId,
    pub dispatch_id: DispatchId,
    #[serde(flatten)]
    pub step: StepResult,
}

/// Why a flow ended in `FlowOutcome::Failed`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    ValidationFailure,
    ElementMissing,
    ElementDisabled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::ValidationFailure => "validation failure",
            FailureKind::ElementMissing => "element missing",
            FailureKind::ElementDisabled => "element disabled",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowOutcome {
    /// Every step ran, including the final external action.
    Completed,
    /// Ended successfully before the final action because a setting disabled it.
    CompletedPartial,
    Failed,
    /// Superseded by a newer navigation.
    Aborted,
}

impl FlowOutcome {
    pub fn is_aborted(self) -> bool {
        matches!(self, FlowOutcome::Aborted)
    }
}

/// Record of one flow execution. Lives for the duration of one dispatch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowRun {
    pub flow_id: FlowId,
    pub dispatch_id: DispatchId,
    pub steps: Vec<StepResult>,
    pub outcome: FlowOutcome,
    pub failure: Option<FailureKind>,
    pub artifacts: BTreeMap<String, serde_json::Value>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl FlowRun {
    /// Steps that reached the given phase, in execution order.
    pub fn steps_in_phase(&self, phase: StepPhase) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(move |step| step.phase == phase)
    }

    /// Whether the step recorded any phase at all.
    pub fn touched(&self, step_id: &str) -> bool {
        self.steps.iter().any(|step| step.step_id == step_id)
    }

    /// Terminal phase recorded for a step, if it got that far.
    pub fn terminal_phase(&self, step_id: &str) -> Option<StepPhase> {
        self.steps
            .iter()
            .rev()
            .find(|step| step.step_id == step_id && step.phase.is_terminal())
            .map(|step| step.phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_path_strips_origin_query_and_fragment() {
        let absolute = Location::new("https://ticketdive.com/event/abc/apply?x=1#top");
        assert_eq!(absolute.path(), "/event/abc/apply");

        let relative = Location::new("/event/abc?ref=mail#frag");
        assert_eq!(relative.path(), "/event/abc");
    }

    #[test]
    fn locations_compare_by_full_string() {
        assert_ne!(Location::new("/event/a?x=1"), Location::new("/event/a?x=2"));
        assert_eq!(Location::from("/event/a"), Location::new("/event/a"));
    }

    #[test]
    fn terminal_phase_ignores_start_records() {
        let now = Utc::now();
        let run = FlowRun {
            flow_id: FlowId::Selection,
            dispatch_id: DispatchId::new(),
            steps: vec![
                StepResult {
                    step_id: "1".into(),
                    phase: StepPhase::Start,
                    message: "wait".into(),
                    at: now,
                },
                StepResult {
                    step_id: "1".into(),
                    phase: StepPhase::Ok,
                    message: "found".into(),
                    at: now,
                },
                StepResult {
                    step_id: "2".into(),
                    phase: StepPhase::Start,
                    message: "validate".into(),
                    at: now,
                },
            ],
            outcome: FlowOutcome::Aborted,
            failure: None,
            artifacts: BTreeMap::new(),
            started_at: now,
            elapsed_ms: 0,
        };

        assert_eq!(run.terminal_phase("1"), Some(StepPhase::Ok));
        assert_eq!(run.terminal_phase("2"), None);
        assert!(run.touched("2"));
        assert!(!run.touched("3"));
        assert_eq!(run.steps_in_phase(StepPhase::Start).count(), 2);
    }
}
