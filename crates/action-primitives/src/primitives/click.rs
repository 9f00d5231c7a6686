//! Click primitive - Trigger a control

use crate::{
    errors::ActionError,
    types::{ElementHandle, ExecCtx},
};
use tracing::{debug, info};

/// Execute click primitive
///
/// Steps:
/// 1. Check the context was not cancelled
/// 2. Re-read the element so the check reflects current page state
/// 3. Refuse disabled controls
/// 4. Click
pub fn execute_click(ctx: &ExecCtx, element: &ElementHandle) -> Result<(), ActionError> {
    info!(
        action_id = %ctx.action_id,
        element = element.id.0,
        tag = %element.tag,
        "Executing click primitive"
    );

    // 1. Check context
    if ctx.is_cancelled() {
        return Err(ActionError::Cancelled("cancelled before click".to_string()));
    }

    // 2. Re-read element
    let current = ctx.page.element(element.id).ok_or_else(|| {
        ActionError::ElementMissing(format!("<{}> detached before click", element.tag))
    })?;

    // 3. Check enabled
    if current.disabled {
        return Err(ActionError::ElementDisabled(format!(
            "<{}> '{}' is disabled",
            current.tag,
            current.text.trim()
        )));
    }

    // 4. Click
    debug!(element = current.id.0, "dispatching click");
    ctx.page.click(current.id)
}
