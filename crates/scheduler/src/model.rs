use autopilot_core_types::{DispatchId, FlowId, FlowRun, Location};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::SchedulerError;

/// Route predicate over the path component of a location.
#[derive(Clone, Debug)]
pub struct RouteRule {
    pattern: Regex,
    pub flow: FlowId,
}

impl RouteRule {
    pub fn new(pattern: &str, flow: FlowId) -> Result<Self, SchedulerError> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            flow,
        })
    }

    pub fn matches(&self, location: &Location) -> bool {
        self.pattern.is_match(&location.path())
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

static DEFAULT_RULES: Lazy<Vec<RouteRule>> = Lazy::new(|| {
    vec![
        RouteRule::new(r"^/event/[^/]+/apply/?$", FlowId::Application)
            .expect("valid default route"),
        RouteRule::new(r"^/event/[^/]+/?$", FlowId::Selection).expect("valid default route"),
    ]
});

/// Ordered route rules; the first match wins.
#[derive(Clone, Debug)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self { rules }
    }

    pub fn resolve(&self, location: &Location) -> Option<FlowId> {
        self.rules
            .iter()
            .find(|rule| rule.matches(location))
            .map(|rule| rule.flow)
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(DEFAULT_RULES.clone())
    }
}

/// Result of handing one navigation to the dispatcher.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// No rule matched; the previous flow was still cancelled.
    Unrouted,
    Dispatched(SubmitHandle),
}

impl DispatchOutcome {
    pub fn handle(self) -> Option<SubmitHandle> {
        match self {
            DispatchOutcome::Unrouted => None,
            DispatchOutcome::Dispatched(handle) => Some(handle),
        }
    }

    pub fn is_unrouted(&self) -> bool {
        matches!(self, DispatchOutcome::Unrouted)
    }
}

#[derive(Debug)]
pub struct SubmitHandle {
    pub dispatch_id: DispatchId,
    pub flow: FlowId,
    /// Scheduled start delay computed when the navigation arrived
    pub delay_ms: u64,
    pub receiver: oneshot::Receiver<DispatchOutput>,
}

#[derive(Clone, Debug)]
pub struct DispatchOutput {
    /// `None` when the start was suppressed by a newer navigation
    pub run: Option<FlowRun>,
    pub timeline: DispatchTimeline,
}

impl DispatchOutput {
    pub fn ran(run: FlowRun, timeline: DispatchTimeline) -> Self {
        Self {
            run: Some(run),
            timeline,
        }
    }

    pub fn suppressed(timeline: DispatchTimeline) -> Self {
        Self {
            run: None,
            timeline,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DispatchTimeline {
    pub dispatched_at: Instant,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
}

impl Default for DispatchTimeline {
    fn default() -> Self {
        Self {
            dispatched_at: Instant::now(),
            started_at: None,
            finished_at: None,
        }
    }
}
