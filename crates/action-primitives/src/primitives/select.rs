//! Select primitive - Select from dropdown

use crate::{
    errors::ActionError,
    primitives::execute_set_value,
    types::{ElementHandle, ExecCtx, SelectMethod},
};
use tracing::{debug, info};

/// Execute select primitive
///
/// Steps:
/// 1. Re-read the select element
/// 2. Find the matching option
/// 3. Apply its value through the set value primitive
pub fn execute_select(
    ctx: &ExecCtx,
    element: &ElementHandle,
    method: SelectMethod,
    item: &str,
) -> Result<String, ActionError> {
    info!(
        action_id = %ctx.action_id,
        element = element.id.0,
        method = ?method,
        item = %item,
        "Executing select primitive"
    );

    // 1. Re-read element
    let current = ctx.page.element(element.id).ok_or_else(|| {
        ActionError::ElementMissing(format!("<{}> detached before select", element.tag))
    })?;

    // 2. Find matching option
    let option = current
        .options
        .iter()
        .find(|option| match method {
            SelectMethod::Value => option.value == item,
            SelectMethod::ValueOrText => option.value == item || option.text == item,
        })
        .ok_or_else(|| ActionError::Validation(format!("option '{}' not found", item)))?;
    debug!(value = %option.value, text = %option.text, "option matched");

    // 3. Apply
    let value = option.value.clone();
    execute_set_value(ctx, &current, &value)
}
