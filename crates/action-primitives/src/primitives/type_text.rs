//! Set value primitive - Write a control's value the way a user edit would

use crate::{
    errors::ActionError,
    types::{ElementHandle, ExecCtx},
};
use tracing::info;

/// Execute set value primitive
///
/// Assigns the value and notifies the page framework so it picks the change up.
/// Returns the value the element reports afterwards.
pub fn execute_set_value(
    ctx: &ExecCtx,
    element: &ElementHandle,
    value: &str,
) -> Result<String, ActionError> {
    info!(
        action_id = %ctx.action_id,
        element = element.id.0,
        tag = %element.tag,
        value_length = value.len(),
        "Executing set value primitive"
    );

    if ctx.is_cancelled() {
        return Err(ActionError::Cancelled(
            "cancelled before value update".to_string(),
        ));
    }

    if ctx.page.element(element.id).is_none() {
        return Err(ActionError::ElementMissing(format!(
            "<{}> detached before value update",
            element.tag
        )));
    }

    ctx.page.set_value(element.id, value)
}
