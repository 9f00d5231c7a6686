//! Wait primitive - Bounded wait for an element to appear

use crate::{
    errors::ActionError,
    types::{AnchorDescriptor, ElementHandle, ExecCtx},
    waiting::wait_until,
};
use std::time::Instant;
use tracing::{debug, info};

/// Execute wait primitive
///
/// Resolves with the first element matching `anchor` once it exists, failing with
/// `WaitTimeout` after `timeout_ms` or `Cancelled` when the dispatch is superseded.
pub async fn execute_wait_for_element(
    ctx: &ExecCtx,
    anchor: &AnchorDescriptor,
    timeout_ms: u64,
) -> Result<ElementHandle, ActionError> {
    let start_instant = Instant::now();

    info!(
        action_id = %ctx.action_id,
        anchor = %anchor,
        timeout_ms = timeout_ms,
        "Executing wait primitive"
    );

    let element = wait_until(ctx.page.as_ref(), &ctx.cancel, timeout_ms, |page| {
        page.query(anchor)
    })
    .await
    .map_err(|err| match err {
        ActionError::WaitTimeout(_) => {
            ActionError::WaitTimeout(format!("timeout ({}ms): \"{}\" not found", timeout_ms, anchor))
        }
        other => other,
    })?;

    debug!(
        action_id = %ctx.action_id,
        anchor = %anchor,
        latency_ms = start_instant.elapsed().as_millis() as u64,
        "Element available"
    );
    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CancelSignal, ElementNode, MemoryPage};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn timeout_message_names_the_anchor() {
        let page = MemoryPage::new("/event/1");
        let ctx = ExecCtx::new(page, CancelSignal::never());
        let anchor = AnchorDescriptor::css(".missing");

        let err = execute_wait_for_element(&ctx, &anchor, 250)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ActionError::WaitTimeout("timeout (250ms): \"css:.missing\" not found".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_late_element() {
        let page = MemoryPage::new("/event/1");
        let ctx = ExecCtx::new(page.clone(), CancelSignal::never());
        let anchor = AnchorDescriptor::name("lastName");

        let late = Arc::clone(&page);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(400)).await;
            late.insert(ElementNode::new("input").name("lastName"));
        });

        let element = execute_wait_for_element(&ctx, &anchor, 2_000).await.unwrap();
        assert_eq!(element.name.as_deref(), Some("lastName"));
    }
}
