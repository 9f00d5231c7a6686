//! Scenario simulation
//!
//! A scenario file describes an in-memory page, a script of timed navigations
//! and page edits, and optional settings. Running it drives the real
//! dispatcher and flows against that page and reports one record per
//! navigation that got through deduplication.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use action_flow::{DefaultFlowExecutor, SiteProfile};
use action_primitives::{ElementNode, MemoryPage};
use autopilot_core_types::{
    DispatchId, FlowId, FlowRun, Location, NavigationKind, Settings, StepEvent,
};
use autopilot_event_bus::{EventBus, InMemoryBus};
use autopilot_scheduler::{
    Dispatcher, DispatchOutcome, HistoryNavigationSource, NavigationSource, Orchestrator,
    RouteTable, SchedulerError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::config::ConfigFormat;

const STEP_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scenario {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Location the page starts at
    pub location: String,
    /// Raw settings merged over the loaded ones
    #[serde(default)]
    pub settings: Option<Value>,
    #[serde(default)]
    pub profile: SiteProfile,
    #[serde(default)]
    pub page_data: Option<Value>,
    #[serde(default)]
    pub elements: Vec<ElementNode>,
    #[serde(default)]
    pub script: Vec<ScriptStep>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptStep {
    /// Offset from the start of the run
    #[serde(default)]
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: ScriptAction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ScriptAction {
    Navigate {
        location: String,
        #[serde(default = "default_kind")]
        kind: NavigationKind,
    },
    Insert {
        elements: Vec<ElementNode>,
    },
    Clear,
    PageData {
        data: Value,
    },
    Cancel,
}

fn default_kind() -> NavigationKind {
    NavigationKind::PushState
}

impl Scenario {
    pub fn from_path(path: &Path) -> Result<Self, ScenarioError> {
        let text = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, ConfigFormat::from_path(path)).map_err(|message| {
            ScenarioError::Parse {
                path: path.to_path_buf(),
                message,
            }
        })
    }

    pub fn parse(text: &str, format: ConfigFormat) -> Result<Self, String> {
        match format {
            ConfigFormat::Yaml => serde_yaml::from_str(text).map_err(|err| err.to_string()),
            ConfigFormat::Json => serde_json::from_str(text).map_err(|err| err.to_string()),
        }
    }

    /// `base` with this scenario's settings merged over it.
    pub fn effective_settings(&self, base: &Settings) -> Settings {
        let Some(overlay) = &self.settings else {
            return base.clone();
        };
        let Ok(mut raw) = serde_json::to_value(base) else {
            return base.clone();
        };
        merge(&mut raw, &canonical_sections(overlay));
        Settings::normalize(&raw)
    }
}

/// Rename section aliases to the keys `Settings` serializes with.
fn canonical_sections(overlay: &Value) -> Value {
    let Value::Object(map) = overlay else {
        return overlay.clone();
    };
    let renamed = map
        .iter()
        .map(|(key, value)| {
            let key = match key.as_str() {
                "selection" => "event",
                "application" => "apply",
                other => other,
            };
            (key.to_string(), value.clone())
        })
        .collect();
    Value::Object(renamed)
}

fn merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge(base.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}

/// Outcome of one dispatched navigation.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchRecord {
    pub location: Location,
    /// `None` when no route matched
    pub flow: Option<FlowId>,
    pub dispatch_id: Option<DispatchId>,
    pub delay_ms: u64,
    /// Routed, but a newer navigation arrived before the flow started
    pub suppressed: bool,
    pub run: Option<FlowRun>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioReport {
    pub dispatches: Vec<DispatchRecord>,
    /// Navigations dropped because the location did not change
    pub duplicates: usize,
    pub step_events: usize,
    pub clicks: u32,
}

impl ScenarioReport {
    pub fn runs(&self) -> impl Iterator<Item = &FlowRun> {
        self.dispatches.iter().filter_map(|record| record.run.as_ref())
    }
}

/// Play the scenario script and wait for every dispatched flow to finish.
pub async fn run_scenario(
    scenario: Scenario,
    base: &Settings,
) -> Result<ScenarioReport, ScenarioError> {
    let settings = scenario.effective_settings(base);
    let location = scenario.location;
    let page = MemoryPage::new(location.as_str());
    if let Some(data) = scenario.page_data {
        page.set_page_data(data);
    }
    for node in scenario.elements {
        page.insert(node);
    }

    let bus = InMemoryBus::<StepEvent>::new(STEP_EVENT_CAPACITY);
    let mut step_events = bus.subscribe();
    let orchestrator = Orchestrator::new(
        RouteTable::default(),
        Arc::new(DefaultFlowExecutor::new(scenario.profile)),
        page.clone(),
        Arc::new(settings),
    )
    .with_events(bus.clone());

    let source = HistoryNavigationSource::with_location(location.as_str());
    let mut navigations = source
        .subscribe()
        .ok_or(SchedulerError::AlreadySubscribed)?;

    let mut report = ScenarioReport::default();
    let origin = Instant::now();
    info!(steps = scenario.script.len(), %location, "Running scenario");
    let boot = orchestrator.boot(location.as_str());
    let mut outcomes = vec![(Location::new(location), boot)];

    for step in scenario.script {
        sleep_until(origin + Duration::from_millis(step.at_ms)).await;
        match step.action {
            ScriptAction::Navigate { location, kind } => {
                page.set_location(location.as_str());
                let emitted = match kind {
                    NavigationKind::Load => source.load(location),
                    NavigationKind::PushState => source.push_state(location),
                    NavigationKind::ReplaceState => source.replace_state(location),
                    NavigationKind::PopState => source.pop_state(location),
                };
                if !emitted {
                    report.duplicates += 1;
                }
            }
            ScriptAction::Insert { elements } => {
                for node in elements {
                    page.insert(node);
                }
            }
            ScriptAction::Clear => page.clear(),
            ScriptAction::PageData { data } => page.set_page_data(data),
            ScriptAction::Cancel => {
                if orchestrator.cancel_active() {
                    debug!("scenario cancelled the active flow");
                }
            }
        }

        while let Ok(event) = navigations.try_recv() {
            let location = event.location.clone();
            outcomes.push((location, orchestrator.on_navigation(event)));
        }
    }

    orchestrator.idle().await;

    for (location, outcome) in outcomes {
        let record = match outcome {
            DispatchOutcome::Unrouted => DispatchRecord {
                location,
                flow: None,
                dispatch_id: None,
                delay_ms: 0,
                suppressed: false,
                run: None,
            },
            DispatchOutcome::Dispatched(handle) => {
                let run = handle.receiver.await.ok().and_then(|output| output.run);
                DispatchRecord {
                    location,
                    flow: Some(handle.flow),
                    dispatch_id: Some(handle.dispatch_id),
                    delay_ms: handle.delay_ms,
                    suppressed: run.is_none(),
                    run,
                }
            }
        };
        report.dispatches.push(record);
    }

    loop {
        match step_events.try_recv() {
            Ok(_) => report.step_events += 1,
            Err(TryRecvError::Lagged(skipped)) => report.step_events += skipped as usize,
            Err(_) => break,
        }
    }
    report.clicks = page.total_clicks();
    Ok(report)
}

/// Plain-text rendering of a report.
pub fn render_human(report: &ScenarioReport) -> String {
    let mut out = String::new();
    for (index, record) in report.dispatches.iter().enumerate() {
        let _ = write!(out, "#{} {}", index + 1, record.location);
        let Some(flow) = record.flow else {
            let _ = writeln!(out, " -> no route");
            continue;
        };
        let _ = write!(out, " -> {}", flow);
        if record.delay_ms > 0 {
            let _ = write!(
                out,
                " (scheduled +{})",
                humantime::format_duration(Duration::from_millis(record.delay_ms))
            );
        }
        let Some(run) = &record.run else {
            let _ = writeln!(out, ": start suppressed");
            continue;
        };
        let _ = write!(out, ": {:?}", run.outcome);
        if let Some(failure) = run.failure {
            let _ = write!(out, " ({})", failure);
        }
        let _ = writeln!(out, " in {}ms", run.elapsed_ms);
        for step in run.steps.iter().filter(|step| step.phase.is_terminal()) {
            let _ = writeln!(out, "    {:<4} {:<4} {}", step.phase, step.step_id, step.message);
        }
    }
    let _ = writeln!(
        out,
        "{} dispatch(es), {} duplicate navigation(s), {} step event(s), {} click(s)",
        report.dispatches.len(),
        report.duplicates,
        report.step_events,
        report.clicks
    );
    out
}
