//! Core types for flow orchestration

use std::sync::Arc;

use action_primitives::{ActionError, ExecCtx};
use async_trait::async_trait;
use autopilot_core_types::{DispatchId, FlowId, FlowRun, Settings, StepEvent};
use autopilot_event_bus::EventBus;
use serde::{Deserialize, Serialize};

use crate::errors::FlowError;

/// A bounded, ordered sequence of steps bound to one route.
#[async_trait]
pub trait Flow: Send + Sync {
    fn id(&self) -> FlowId;

    /// Run every step against the current page state. Never panics on page
    /// problems; the outcome is carried by the returned run.
    async fn run(&self, ctx: &FlowContext) -> FlowRun;
}

/// Everything one flow run needs.
#[derive(Clone)]
pub struct FlowContext {
    /// Page, cancellation signal and correlation id
    pub exec: ExecCtx,

    /// Dispatch this run belongs to
    pub dispatch_id: DispatchId,

    /// Settings snapshot taken when the dispatch started
    pub settings: Arc<Settings>,

    /// Optional sink for step transitions
    pub events: Option<Arc<dyn EventBus<StepEvent>>>,
}

impl FlowContext {
    pub fn new(exec: ExecCtx, dispatch_id: DispatchId, settings: Arc<Settings>) -> Self {
        Self {
            exec,
            dispatch_id,
            settings,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventBus<StepEvent>>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn timeout_ms(&self) -> u64 {
        self.settings.common.timeout_ms
    }

    /// Whether page snapshots are attached to the run as artifacts.
    pub fn diagnostics(&self) -> bool {
        self.settings.common.debug
    }

    /// Fails with `Cancelled` once the dispatch has been superseded.
    pub fn checkpoint(&self, step_id: &str, what: &str) -> Result<(), FlowError> {
        if self.exec.is_cancelled() {
            return Err(FlowError::at(
                step_id,
                ActionError::Cancelled(format!("aborted {}", what)),
            ));
        }
        Ok(())
    }
}

/// Selectors and labels binding the flows to one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SiteProfile {
    /// Text of the button revealing the ticket selector
    pub open_selector_label: String,
    pub open_settle_ms: u64,
    pub favorite_settle_ms: u64,
    /// Quantity `select` of the ticket type card
    pub quantity_selector: String,
    /// Button moving from selection to application
    pub confirm_selector: String,
    pub last_name_field: String,
    pub first_name_field: String,
    pub phone_number_field: String,
    /// Substring of the payment option's label
    pub payment_label: String,
    /// Exact text of the final submit button
    pub submit_label: String,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            open_selector_label: "選択する".to_string(),
            open_settle_ms: 500,
            favorite_settle_ms: 300,
            quantity_selector: r#"[class*="TicketTypeCard_numberSelector"]"#.to_string(),
            confirm_selector: r#"[class*="Button_rectMain"]"#.to_string(),
            last_name_field: "lastName".to_string(),
            first_name_field: "firstName".to_string(),
            phone_number_field: "phoneNumber".to_string(),
            payment_label: "コンビニ支払い".to_string(),
            submit_label: "申し込みを完了する".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_profile_keeps_defaults() {
        let profile: SiteProfile =
            serde_json::from_value(serde_json::json!({ "submitLabel": "Apply" })).unwrap();
        assert_eq!(profile.submit_label, "Apply");
        assert_eq!(profile.last_name_field, "lastName");
        assert_eq!(profile.open_settle_ms, 500);
    }
}
