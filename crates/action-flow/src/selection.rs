//! Selection flow: pick a ticket quantity and advance to the application form

use action_primitives::{
    execute_click, execute_select, execute_wait_for_element, pause, ActionError, AnchorDescriptor,
    SelectMethod,
};
use async_trait::async_trait;
use autopilot_core_types::{FlowId, FlowOutcome, FlowRun};
use tracing::{debug, info, warn};

use crate::errors::{FlowError, StepResultExt};
use crate::insight::{page_props, pick_favorite_group, PageInsight};
use crate::recorder::StepRecorder;
use crate::types::{Flow, FlowContext, SiteProfile};

/// Steps `0, 0.1, 0.2, 0.5, 1, 2, 3, 4, 5`.
pub struct SelectionFlow {
    profile: SiteProfile,
}

impl SelectionFlow {
    pub fn new(profile: SiteProfile) -> Self {
        Self { profile }
    }

    async fn steps(
        &self,
        ctx: &FlowContext,
        rec: &mut StepRecorder,
    ) -> Result<FlowOutcome, FlowError> {
        let exec = &ctx.exec;
        let settings = &ctx.settings.selection;

        rec.start("0", "selection flow started");
        rec.artifact(
            "settings",
            serde_json::to_value(settings).unwrap_or_default(),
        );
        rec.ok(
            "0",
            format!(
                "ticketCount={} autoClick={} waitMs={} timeoutMs={}",
                settings.ticket_count,
                settings.auto_click,
                settings.wait_ms,
                ctx.timeout_ms()
            ),
        );

        // 0.1 open the selector surface when the page hides it behind a button
        rec.start("0.1", "check ticket selector button");
        let open = AnchorDescriptor::exact_text("button", self.profile.open_selector_label.as_str());
        match exec.page.query(&open) {
            Some(button) => {
                execute_click(exec, &button).at_step("0.1")?;
                pause(&exec.cancel, self.profile.open_settle_ms)
                    .await
                    .at_step("0.1")?;
                rec.ok("0.1", "ticket selector opened");
            }
            None => rec.skip("0.1", "ticket selector button not found"),
        }

        rec.start("0.2", "collect page insight");
        let insight = PageInsight::collect(exec.page.as_ref());
        debug!(
            tickets = insight.ticket_info.len(),
            candidates = insight.input_candidates.len(),
            "page insight collected"
        );
        rec.ok(
            "0.2",
            format!(
                "{} ticket info entries, {} input candidates",
                insight.ticket_info.len(),
                insight.input_candidates.len()
            ),
        );
        if ctx.diagnostics() {
            rec.artifact("page_insight", serde_json::to_value(&insight).unwrap_or_default());
        }

        self.apply_favorite(ctx, rec).await?;

        rec.start("1", "wait for ticket count selector");
        let quantity = execute_wait_for_element(
            exec,
            &AnchorDescriptor::css(self.profile.quantity_selector.as_str()),
            ctx.timeout_ms(),
        )
        .await
        .at_step("1")?;
        ctx.checkpoint("1", "after ticket count selector appeared")?;
        rec.ok("1", "ticket count selector found");

        let count = settings.ticket_count.to_string();
        rec.start("2", format!("validate ticket count: {}", count));
        let accepted = quantity.valid_values();
        if !accepted.contains(&count) {
            return Err(FlowError::at(
                "2",
                ActionError::Validation(format!(
                    "invalid ticket count: {} (accepted: {})",
                    count,
                    accepted.join(", ")
                )),
            ));
        }
        rec.ok("2", format!("ticket count is valid: {}", count));

        rec.start("3", "apply ticket count");
        let applied = execute_select(exec, &quantity, SelectMethod::Value, &count).at_step("3")?;
        rec.ok("3", format!("ticket count applied: {}", applied));

        if !settings.auto_click {
            rec.start("4", "advance to application");
            rec.skip("4", "autoClick disabled");
            return Ok(FlowOutcome::CompletedPartial);
        }

        rec.start("4", "wait for confirm button");
        let confirm = execute_wait_for_element(
            exec,
            &AnchorDescriptor::css(self.profile.confirm_selector.as_str()),
            ctx.timeout_ms(),
        )
        .await
        .at_step("4")?;
        ctx.checkpoint("4", "after confirm button appeared")?;
        rec.ok("4", "confirm button found");

        rec.start("5", format!("click confirm after {}ms", settings.wait_ms));
        if confirm.disabled {
            return Err(FlowError::at(
                "5",
                ActionError::ElementDisabled("confirm button is disabled".to_string()),
            ));
        }
        pause(&exec.cancel, settings.wait_ms).await.at_step("5")?;
        execute_click(exec, &confirm).at_step("5")?;
        rec.ok("5", "confirm button clicked");

        Ok(FlowOutcome::Completed)
    }

    /// Step 0.5: select the favored option in the first select offering it.
    async fn apply_favorite(
        &self,
        ctx: &FlowContext,
        rec: &mut StepRecorder,
    ) -> Result<(), FlowError> {
        let exec = &ctx.exec;
        rec.start("0.5", "resolve favorite group");

        let Some(favorite) = resolve_favorite(ctx) else {
            rec.skip("0.5", "favorite group not configured");
            return Ok(());
        };

        let target = exec
            .page
            .query_all(&AnchorDescriptor::Tag("select".to_string()))
            .into_iter()
            .find(|select| select.find_option(&favorite).is_some());

        match target {
            Some(select) => {
                execute_select(exec, &select, SelectMethod::ValueOrText, &favorite)
                    .at_step("0.5")?;
                pause(&exec.cancel, self.profile.favorite_settle_ms)
                    .await
                    .at_step("0.5")?;
                rec.ok("0.5", format!("favorite group selected: {}", favorite));
            }
            None => rec.skip("0.5", format!("favorite group not found: {}", favorite)),
        }
        Ok(())
    }
}

/// Manual setting first, then the page data when auto resolution is on.
fn resolve_favorite(ctx: &FlowContext) -> Option<String> {
    let settings = &ctx.settings.selection;
    let manual = settings.favorite_group.trim();
    if !manual.is_empty() {
        return Some(manual.to_string());
    }
    if !settings.favorite_group_auto {
        return None;
    }

    let data = ctx.exec.page.page_data();
    let picked = data.as_ref().and_then(page_props).and_then(pick_favorite_group);
    match &picked {
        Some(value) => info!(favorite = %value, "favorite group resolved from page data"),
        None => warn!("favorite group could not be resolved from page data"),
    }
    picked
}

#[async_trait]
impl Flow for SelectionFlow {
    fn id(&self) -> FlowId {
        FlowId::Selection
    }

    async fn run(&self, ctx: &FlowContext) -> FlowRun {
        let mut rec = StepRecorder::new(FlowId::Selection, ctx);
        match self.steps(ctx, &mut rec).await {
            Ok(FlowOutcome::Completed) => rec.done(FlowOutcome::Completed, "selection flow completed"),
            Ok(outcome) => rec.done(outcome, "selection flow completed without clicking confirm"),
            Err(err) => rec.halt(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::{CancelSignal, ElementId, ElementNode, ExecCtx, MemoryPage, SelectOption};
    use autopilot_core_types::{DispatchId, FailureKind, Settings, StepPhase};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const QUANTITY: &str = r#"[class*="TicketTypeCard_numberSelector"]"#;
    const CONFIRM: &str = r#"[class*="Button_rectMain"]"#;

    fn settings(patch: serde_json::Value) -> Arc<Settings> {
        Arc::new(Settings::normalize(&patch))
    }

    fn context(page: &Arc<MemoryPage>, cancel: CancelSignal, settings: Arc<Settings>) -> FlowContext {
        FlowContext::new(ExecCtx::new(page.clone(), cancel), DispatchId::new(), settings)
    }

    fn quantity_select(values: &[&str]) -> ElementNode {
        ElementNode::new("select")
            .selector(QUANTITY)
            .value("0")
            .options(values.iter().map(|v| SelectOption::new(*v, *v)).collect())
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_clicks_confirm() {
        let page = MemoryPage::new("/event/abc");
        let select = page.insert(quantity_select(&["0", "1", "2"]));
        let confirm = page.insert(ElementNode::new("button").selector(CONFIRM).text("申し込む"));
        let ctx = context(
            &page,
            CancelSignal::never(),
            settings(json!({ "event": { "ticketCount": 2, "favoriteGroupAuto": false } })),
        );

        let run = SelectionFlow::new(SiteProfile::default()).run(&ctx).await;

        assert_eq!(run.outcome, FlowOutcome::Completed);
        assert_eq!(page.value_of(select).as_deref(), Some("2"));
        assert_eq!(page.change_notifications(select), 1);
        assert_eq!(page.click_count(confirm), 1);
        assert_eq!(run.terminal_phase("0.1"), Some(StepPhase::Skip));
        assert_eq!(run.terminal_phase("0.5"), Some(StepPhase::Skip));
        assert!(run.artifacts.contains_key("page_insight"));
    }

    #[tokio::test(start_paused = true)]
    async fn debug_off_skips_the_page_insight_artifact() {
        let page = MemoryPage::new("/event/abc");
        page.insert(quantity_select(&["0", "1"]));
        page.insert(ElementNode::new("button").selector(CONFIRM).text("申し込む"));
        let ctx = context(
            &page,
            CancelSignal::never(),
            settings(json!({ "common": { "debug": false }, "event": { "favoriteGroupAuto": false } })),
        );

        let run = SelectionFlow::new(SiteProfile::default()).run(&ctx).await;

        assert_eq!(run.outcome, FlowOutcome::Completed);
        assert_eq!(run.terminal_phase("0.2"), Some(StepPhase::Ok));
        assert!(!run.artifacts.contains_key("page_insight"));
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_quantity_fails_validation_without_touching_the_page() {
        let page = MemoryPage::new("/event/abc");
        let select = page.insert(quantity_select(&["0", "1", "3"]));
        let ctx = context(
            &page,
            CancelSignal::never(),
            settings(json!({ "event": { "ticketCount": 2 } })),
        );

        let run = SelectionFlow::new(SiteProfile::default()).run(&ctx).await;

        assert_eq!(run.outcome, FlowOutcome::Failed);
        assert_eq!(run.failure, Some(FailureKind::ValidationFailure));
        assert_eq!(run.terminal_phase("2"), Some(StepPhase::Fail));
        assert!(!run.touched("3"));
        assert_eq!(page.value_of(select).as_deref(), Some("0"));
        assert_eq!(page.change_notifications(select), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_click_off_stops_before_confirm() {
        let page = MemoryPage::new("/event/abc");
        page.insert(quantity_select(&["0", "1"]));
        let confirm = page.insert(ElementNode::new("button").selector(CONFIRM));
        let ctx = context(
            &page,
            CancelSignal::never(),
            settings(json!({ "event": { "autoClick": false } })),
        );

        let run = SelectionFlow::new(SiteProfile::default()).run(&ctx).await;

        assert_eq!(run.outcome, FlowOutcome::CompletedPartial);
        assert_eq!(run.terminal_phase("4"), Some(StepPhase::Skip));
        assert!(!run.touched("5"));
        assert_eq!(page.click_count(confirm), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_confirm_fails_step_five() {
        let page = MemoryPage::new("/event/abc");
        page.insert(quantity_select(&["0", "1"]));
        let confirm = page.insert(ElementNode::new("button").selector(CONFIRM).disabled(true));
        let ctx = context(&page, CancelSignal::never(), settings(json!({})));

        let run = SelectionFlow::new(SiteProfile::default()).run(&ctx).await;

        assert_eq!(run.failure, Some(FailureKind::ElementDisabled));
        assert_eq!(run.terminal_phase("5"), Some(StepPhase::Fail));
        assert_eq!(page.click_count(confirm), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn selector_that_never_appears_times_out() {
        let page = MemoryPage::new("/event/abc");
        let ctx = context(
            &page,
            CancelSignal::never(),
            settings(json!({ "common": { "timeoutMs": 1000 } })),
        );

        let run = SelectionFlow::new(SiteProfile::default()).run(&ctx).await;

        assert_eq!(run.failure, Some(FailureKind::Timeout));
        assert_eq!(run.terminal_phase("1"), Some(StepPhase::Fail));
        assert_eq!(page.mutation_subscribers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn opens_selector_and_applies_favorite_from_page_data() {
        let page = MemoryPage::new("/event/abc");
        let open = page.insert(ElementNode::new("button").text(" 選択する "));
        let favorite = page.insert(ElementNode::new("select").value("").options(vec![
            SelectOption::new("", "--"),
            SelectOption::new("aoi", "Aoi"),
        ]));
        page.insert(quantity_select(&["0", "1"]));
        page.set_page_data(json!({ "props": { "pageProps": { "eventDetail": {
            "stages": [{ "favoriteSelections": { "selectOptions": ["Aoi"] } }]
        }}}}));
        let ctx = context(
            &page,
            CancelSignal::never(),
            settings(json!({ "event": { "autoClick": false } })),
        );

        let run = SelectionFlow::new(SiteProfile::default()).run(&ctx).await;

        assert_eq!(page.click_count(open), 1);
        assert_eq!(run.terminal_phase("0.1"), Some(StepPhase::Ok));
        assert_eq!(run.terminal_phase("0.5"), Some(StepPhase::Ok));
        assert_eq!(page.value_of(favorite).as_deref(), Some("aoi"));
        assert_eq!(run.outcome, FlowOutcome::CompletedPartial);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_selector_rendered_later() {
        let page = MemoryPage::new("/event/abc");
        let renderer = {
            let page = page.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(800)).await;
                page.insert(quantity_select(&["0", "1"]))
            })
        };
        let ctx = context(
            &page,
            CancelSignal::never(),
            settings(json!({ "event": { "autoClick": false } })),
        );

        let run = SelectionFlow::new(SiteProfile::default()).run(&ctx).await;
        let select: ElementId = renderer.await.unwrap();

        assert_eq!(run.outcome, FlowOutcome::CompletedPartial);
        assert_eq!(page.value_of(select).as_deref(), Some("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_settle_prevents_the_click() {
        let page = MemoryPage::new("/event/abc");
        page.insert(quantity_select(&["0", "1"]));
        let confirm = page.insert(ElementNode::new("button").selector(CONFIRM));
        let token = CancellationToken::new();
        let ctx = context(
            &page,
            CancelSignal::from(&token),
            settings(json!({ "event": { "waitMs": 5000 } })),
        );

        let flow = tokio::spawn(async move { SelectionFlow::new(SiteProfile::default()).run(&ctx).await });
        tokio::time::sleep(Duration::from_millis(1000)).await;
        token.cancel();
        let run = flow.await.unwrap();

        assert_eq!(run.outcome, FlowOutcome::Aborted);
        assert_eq!(run.terminal_phase("5"), Some(StepPhase::Skip));
        assert_eq!(page.click_count(confirm), 0);
    }

    #[test]
    fn manual_favorite_wins_over_page_data() {
        let page = MemoryPage::new("/event/abc");
        page.set_page_data(json!({ "eventDetail": { "stages": [
            { "favoriteSelections": { "selectOptions": ["Mio"] } }
        ]}}));
        let ctx = context(
            &page,
            CancelSignal::never(),
            settings(json!({ "event": { "favoriteGroup": "  Hana " } })),
        );
        assert_eq!(resolve_favorite(&ctx).as_deref(), Some("Hana"));

        let auto = context(&page, CancelSignal::never(), settings(json!({})));
        assert_eq!(resolve_favorite(&auto).as_deref(), Some("Mio"));

        let off = context(
            &page,
            CancelSignal::never(),
            settings(json!({ "event": { "favoriteGroupAuto": false } })),
        );
        assert_eq!(resolve_favorite(&off), None);
    }
}
