//! Flow executor implementation

use std::sync::Arc;

use async_trait::async_trait;
use autopilot_core_types::{FlowId, FlowRun};
use tracing::info;

use crate::application::ApplicationFlow;
use crate::selection::SelectionFlow;
use crate::types::{Flow, FlowContext, SiteProfile};

/// Runs the flow registered for a route.
#[async_trait]
pub trait FlowExecutor: Send + Sync {
    async fn execute(&self, flow_id: FlowId, ctx: FlowContext) -> FlowRun;
}

/// Default flow executor implementation
pub struct DefaultFlowExecutor {
    selection: Arc<dyn Flow>,
    application: Arc<dyn Flow>,
}

impl DefaultFlowExecutor {
    /// Create an executor for the given site
    pub fn new(profile: SiteProfile) -> Self {
        Self {
            selection: Arc::new(SelectionFlow::new(profile.clone())),
            application: Arc::new(ApplicationFlow::new(profile)),
        }
    }

    fn flow(&self, flow_id: FlowId) -> &Arc<dyn Flow> {
        match flow_id {
            FlowId::Selection => &self.selection,
            FlowId::Application => &self.application,
        }
    }
}

impl Default for DefaultFlowExecutor {
    fn default() -> Self {
        Self::new(SiteProfile::default())
    }
}

#[async_trait]
impl FlowExecutor for DefaultFlowExecutor {
    async fn execute(&self, flow_id: FlowId, ctx: FlowContext) -> FlowRun {
        let flow = self.flow(flow_id);
        info!(
            flow = %flow.id(),
            dispatch_id = %ctx.dispatch_id,
            location = %ctx.exec.page.location(),
            "Executing flow"
        );
        flow.run(&ctx).await
    }
}
