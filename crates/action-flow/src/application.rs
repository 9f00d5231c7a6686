//! Application flow: fill the applicant form and optionally submit it

use action_primitives::{
    execute_click, execute_set_value, execute_wait_for_element, pause, ActionError,
    AnchorDescriptor,
};
use async_trait::async_trait;
use autopilot_core_types::{FlowId, FlowOutcome, FlowRun};
use serde_json::json;

use crate::errors::{FlowError, StepResultExt};
use crate::insight::FormSchema;
use crate::recorder::StepRecorder;
use crate::types::{Flow, FlowContext, SiteProfile};

/// Steps `0` through `7`.
pub struct ApplicationFlow {
    profile: SiteProfile,
}

impl ApplicationFlow {
    pub fn new(profile: SiteProfile) -> Self {
        Self { profile }
    }

    async fn steps(
        &self,
        ctx: &FlowContext,
        rec: &mut StepRecorder,
    ) -> Result<FlowOutcome, FlowError> {
        let exec = &ctx.exec;
        let settings = &ctx.settings.application;

        rec.start("0", "application flow started");
        rec.artifact(
            "settings",
            json!({
                "lastName": settings.last_name,
                "firstName": settings.first_name,
                "phoneNumber": settings.phone_number,
                "autoSubmit": settings.auto_submit,
            }),
        );
        rec.ok(
            "0",
            format!(
                "autoSubmit={} stepDelayMs={}",
                if settings.auto_submit { "enabled" } else { "disabled" },
                settings.step_delay_ms
            ),
        );

        rec.start("1", "wait for application form");
        execute_wait_for_element(
            exec,
            &AnchorDescriptor::name(self.profile.last_name_field.as_str()),
            ctx.timeout_ms(),
        )
        .await
        .at_step("1")?;
        ctx.checkpoint("1", "after application form appeared")?;
        if ctx.diagnostics() {
            rec.artifact(
                "form_schema",
                serde_json::to_value(FormSchema::collect(exec.page.as_ref())).unwrap_or_default(),
            );
        }
        rec.ok("1", "application form is ready");

        rec.start("2", "select payment option");
        let payment = exec
            .page
            .query(&self.payment_anchor())
            .ok_or_else(|| {
                ActionError::ElementMissing(format!(
                    "payment label containing '{}' not found",
                    self.profile.payment_label
                ))
            })
            .at_step("2")?;
        let already_selected = payment.checked == Some(true);
        if !already_selected {
            execute_click(exec, &payment).at_step("2")?;
        }
        pause(&exec.cancel, settings.step_delay_ms)
            .await
            .at_step("2")?;
        if already_selected {
            rec.skip("2", "payment option already selected");
        } else {
            rec.ok("2", "payment option clicked");
        }

        let fields = [
            ("3", self.profile.last_name_field.as_str(), settings.last_name.as_str()),
            ("4", self.profile.first_name_field.as_str(), settings.first_name.as_str()),
            ("5", self.profile.phone_number_field.as_str(), settings.phone_number.as_str()),
        ];
        for (step_id, field, value) in fields {
            self.fill_field(ctx, rec, step_id, field, value).await?;
        }

        rec.start("6", "verify final input state");
        let snapshot = self.form_state(ctx);
        rec.artifact("final_form_state", snapshot);
        rec.ok("6", "all input fields verified");

        rec.start("7", "process submit button");
        let submit = exec
            .page
            .query(&AnchorDescriptor::exact_text(
                "button",
                self.profile.submit_label.as_str(),
            ))
            .ok_or_else(|| ActionError::ElementMissing("submit button not found".to_string()))
            .at_step("7")?;
        if submit.disabled {
            return Err(FlowError::at(
                "7",
                ActionError::ElementDisabled("submit button is disabled".to_string()),
            ));
        }
        if !settings.auto_submit {
            rec.skip("7", "autoSubmit disabled (dry run)");
            return Ok(FlowOutcome::CompletedPartial);
        }
        execute_click(exec, &submit).at_step("7")?;
        rec.ok("7", "submit button clicked");

        Ok(FlowOutcome::Completed)
    }

    /// Steps 3 to 5: one required text field each.
    async fn fill_field(
        &self,
        ctx: &FlowContext,
        rec: &mut StepRecorder,
        step_id: &str,
        field: &str,
        configured: &str,
    ) -> Result<(), FlowError> {
        let exec = &ctx.exec;
        rec.start(step_id, format!("input {}", field));

        let value = configured.trim();
        if value.is_empty() {
            return Err(FlowError::at(
                step_id,
                ActionError::Validation(format!("{} is required but empty in settings", field)),
            ));
        }

        let element = exec
            .page
            .query(&AnchorDescriptor::name(field))
            .ok_or_else(|| ActionError::ElementMissing(format!("{} field not found", field)))
            .at_step(step_id)?;
        let applied = execute_set_value(exec, &element, value).at_step(step_id)?;
        pause(&exec.cancel, ctx.settings.application.step_delay_ms)
            .await
            .at_step(step_id)?;
        rec.ok(step_id, format!("{} set: {}", field, applied));
        Ok(())
    }

    fn payment_anchor(&self) -> AnchorDescriptor {
        AnchorDescriptor::partial_text("label", self.profile.payment_label.as_str())
    }

    fn form_state(&self, ctx: &FlowContext) -> serde_json::Value {
        let page = &ctx.exec.page;
        let value_of = |field: &str| {
            page.query(&AnchorDescriptor::name(field))
                .map(|element| element.value)
        };
        json!({
            "payment": { "checked": page.query(&self.payment_anchor()).and_then(|label| label.checked) },
            "lastName": { "value": value_of(self.profile.last_name_field.as_str()) },
            "firstName": { "value": value_of(self.profile.first_name_field.as_str()) },
            "phoneNumber": { "value": value_of(self.profile.phone_number_field.as_str()) },
        })
    }
}

#[async_trait]
impl Flow for ApplicationFlow {
    fn id(&self) -> FlowId {
        FlowId::Application
    }

    async fn run(&self, ctx: &FlowContext) -> FlowRun {
        let mut rec = StepRecorder::new(FlowId::Application, ctx);
        match self.steps(ctx, &mut rec).await {
            Ok(FlowOutcome::Completed) => rec.done(FlowOutcome::Completed, "application flow completed"),
            Ok(outcome) => rec.done(outcome, "application flow completed in dry-run mode"),
            Err(err) => rec.halt(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::{CancelSignal, ElementId, ElementNode, ExecCtx, MemoryPage};
    use autopilot_core_types::{DispatchId, FailureKind, Settings, StepPhase};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct Form {
        page: Arc<MemoryPage>,
        payment: ElementId,
        last_name: ElementId,
        first_name: ElementId,
        phone: ElementId,
        submit: ElementId,
    }

    fn form() -> Form {
        let page = MemoryPage::new("/event/abc/apply");
        let payment = page.insert(ElementNode::new("label").text("コンビニ支払い").checked(false));
        let last_name = page.insert(ElementNode::new("input").name("lastName"));
        let first_name = page.insert(ElementNode::new("input").name("firstName"));
        let phone = page.insert(ElementNode::new("input").name("phoneNumber"));
        let submit = page.insert(ElementNode::new("button").text("申し込みを完了する"));
        Form {
            page,
            payment,
            last_name,
            first_name,
            phone,
            submit,
        }
    }

    fn applicant(extra: Value) -> Arc<Settings> {
        let mut apply = json!({
            "lastName": "Sato",
            "firstName": "Hana",
            "phoneNumber": " 09012345678 ",
        });
        if let (Some(base), Some(extra)) = (apply.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        Arc::new(Settings::normalize(&json!({ "apply": apply })))
    }

    fn context(page: &Arc<MemoryPage>, cancel: CancelSignal, settings: Arc<Settings>) -> FlowContext {
        FlowContext::new(ExecCtx::new(page.clone(), cancel), DispatchId::new(), settings)
    }

    #[tokio::test(start_paused = true)]
    async fn dry_run_fills_every_field_without_submitting() {
        let form = form();
        let ctx = context(&form.page, CancelSignal::never(), applicant(json!({})));

        let run = ApplicationFlow::new(SiteProfile::default()).run(&ctx).await;

        assert_eq!(run.outcome, FlowOutcome::CompletedPartial);
        assert_eq!(run.terminal_phase("7"), Some(StepPhase::Skip));
        assert_eq!(form.page.click_count(form.payment), 1);
        assert_eq!(form.page.value_of(form.last_name).as_deref(), Some("Sato"));
        assert_eq!(form.page.value_of(form.first_name).as_deref(), Some("Hana"));
        assert_eq!(form.page.value_of(form.phone).as_deref(), Some("09012345678"));
        assert_eq!(form.page.click_count(form.submit), 0);

        let state = &run.artifacts["final_form_state"];
        assert_eq!(state["payment"]["checked"], json!(true));
        assert_eq!(state["phoneNumber"]["value"], json!("09012345678"));
        assert!(run.artifacts.contains_key("form_schema"));
    }

    #[tokio::test(start_paused = true)]
    async fn debug_off_leaves_out_the_form_schema() {
        let form = form();
        let mut settings = (*applicant(json!({}))).clone();
        settings.common.debug = false;
        let ctx = context(&form.page, CancelSignal::never(), Arc::new(settings));

        let run = ApplicationFlow::new(SiteProfile::default()).run(&ctx).await;

        assert_eq!(run.outcome, FlowOutcome::CompletedPartial);
        assert!(!run.artifacts.contains_key("form_schema"));
        assert!(run.artifacts.contains_key("final_form_state"));
    }

    #[tokio::test(start_paused = true)]
    async fn auto_submit_clicks_submit() {
        let form = form();
        let ctx = context(
            &form.page,
            CancelSignal::never(),
            applicant(json!({ "autoSubmit": true })),
        );

        let run = ApplicationFlow::new(SiteProfile::default()).run(&ctx).await;

        assert_eq!(run.outcome, FlowOutcome::Completed);
        assert_eq!(form.page.click_count(form.submit), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_last_name_fails_step_three_and_stops() {
        let form = form();
        let ctx = context(
            &form.page,
            CancelSignal::never(),
            applicant(json!({ "lastName": "   " })),
        );

        let run = ApplicationFlow::new(SiteProfile::default()).run(&ctx).await;

        assert_eq!(run.outcome, FlowOutcome::Failed);
        assert_eq!(run.failure, Some(FailureKind::ValidationFailure));
        assert_eq!(run.terminal_phase("3"), Some(StepPhase::Fail));
        for later in ["4", "5", "6", "7"] {
            assert!(!run.touched(later), "step {} must not run", later);
        }
        assert_eq!(form.page.total_change_notifications(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn preselected_payment_is_skipped() {
        let form = form();
        form.page.update(form.payment, |node| node.checked = Some(true));
        let ctx = context(&form.page, CancelSignal::never(), applicant(json!({})));

        let run = ApplicationFlow::new(SiteProfile::default()).run(&ctx).await;

        assert_eq!(run.terminal_phase("2"), Some(StepPhase::Skip));
        assert_eq!(form.page.click_count(form.payment), 0);
        assert_eq!(run.outcome, FlowOutcome::CompletedPartial);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_payment_label_fails() {
        let form = form();
        form.page.remove(form.payment);
        let ctx = context(&form.page, CancelSignal::never(), applicant(json!({})));

        let run = ApplicationFlow::new(SiteProfile::default()).run(&ctx).await;

        assert_eq!(run.failure, Some(FailureKind::ElementMissing));
        assert_eq!(run.terminal_phase("2"), Some(StepPhase::Fail));
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_submit_fails_even_in_dry_run() {
        let form = form();
        form.page.update(form.submit, |node| node.disabled = true);
        let ctx = context(&form.page, CancelSignal::never(), applicant(json!({})));

        let run = ApplicationFlow::new(SiteProfile::default()).run(&ctx).await;

        assert_eq!(run.failure, Some(FailureKind::ElementDisabled));
        assert_eq!(run.terminal_phase("7"), Some(StepPhase::Fail));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_after_form_appears_prevents_field_updates() {
        let form = form();
        let token = CancellationToken::new();
        let ctx = context(
            &form.page,
            CancelSignal::from(&token),
            applicant(json!({ "stepDelayMs": 1000 })),
        );

        let flow = tokio::spawn(async move { ApplicationFlow::new(SiteProfile::default()).run(&ctx).await });
        // Step 2 is settling after the payment click.
        tokio::time::sleep(Duration::from_millis(500)).await;
        token.cancel();
        let run = flow.await.unwrap();

        assert_eq!(run.outcome, FlowOutcome::Aborted);
        assert_eq!(run.terminal_phase("1"), Some(StepPhase::Ok));
        assert_eq!(run.terminal_phase("2"), Some(StepPhase::Skip));
        assert!(!run.touched("3"));
        assert_eq!(form.page.total_change_notifications(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_form_times_out() {
        let page = MemoryPage::new("/event/abc/apply");
        let ctx = context(
            &page,
            CancelSignal::never(),
            Arc::new(Settings::normalize(&json!({ "common": { "timeoutMs": 200 } }))),
        );

        let run = ApplicationFlow::new(SiteProfile::default()).run(&ctx).await;

        assert_eq!(run.failure, Some(FailureKind::Timeout));
        assert_eq!(run.terminal_phase("1"), Some(StepPhase::Fail));
    }
}
