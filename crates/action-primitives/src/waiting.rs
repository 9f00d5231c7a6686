//! Cancellable waiting mechanisms for flow steps

use crate::{errors::ActionError, primitives::Page, types::CancelSignal};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, trace};

/// Wait until `condition` yields a value, the timeout elapses, or `cancel` fires.
///
/// The condition is evaluated against the page immediately; when it already holds
/// the value is returned without subscribing to mutation notifications or arming
/// a timer. Otherwise the condition is re-evaluated on every mutation
/// notification. The notification subscription and the timer are owned by this
/// future and released on every exit path, including when the future is dropped.
///
/// A `timeout_ms` of zero never succeeds unless the condition already holds.
pub async fn wait_until<T, F>(
    page: &dyn Page,
    cancel: &CancelSignal,
    timeout_ms: u64,
    mut condition: F,
) -> Result<T, ActionError>
where
    F: FnMut(&dyn Page) -> Option<T>,
{
    if cancel.is_cancelled() {
        return Err(ActionError::Cancelled("cancelled before wait".to_string()));
    }

    if let Some(value) = condition(page) {
        trace!("wait condition satisfied immediately");
        return Ok(value);
    }

    if timeout_ms == 0 {
        return Err(ActionError::WaitTimeout(
            "condition not met and timeout is 0ms".to_string(),
        ));
    }

    let mut changes = page.mutations();
    // A mutation may have landed between the first check and subscribing.
    if let Some(value) = condition(page) {
        return Ok(value);
    }

    let deadline = sleep(Duration::from_millis(timeout_ms));
    tokio::pin!(deadline);
    let mut notifications_open = true;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("wait cancelled");
                return Err(ActionError::Cancelled("cancelled while waiting".to_string()));
            }

            _ = &mut deadline => {
                return Err(ActionError::WaitTimeout(format!(
                    "condition not met after {}ms",
                    timeout_ms
                )));
            }

            changed = changes.changed(), if notifications_open => {
                match changed {
                    Ok(()) => {
                        if let Some(value) = condition(page) {
                            trace!("wait condition satisfied after mutation");
                            return Ok(value);
                        }
                    }
                    Err(_) => {
                        debug!("page stopped publishing mutations; waiting for timeout");
                        notifications_open = false;
                    }
                }
            }
        }
    }
}

/// Fixed delay between steps that ends early with `Cancelled`.
pub async fn pause(cancel: &CancelSignal, ms: u64) -> Result<(), ActionError> {
    if cancel.is_cancelled() {
        return Err(ActionError::Cancelled("cancelled before delay".to_string()));
    }

    tokio::select! {
        biased;

        _ = cancel.cancelled() => {
            Err(ActionError::Cancelled(format!("cancelled during {}ms delay", ms)))
        }

        _ = sleep(Duration::from_millis(ms)) => Ok(()),
    }
}
