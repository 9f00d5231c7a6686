use autopilot_core_types::{FlowId, FlowOutcome, Settings, StepPhase};
use ticket_autopilot::config::ConfigFormat;
use ticket_autopilot::scenario::{render_human, run_scenario, Scenario};

fn scenario(text: &str) -> Scenario {
    Scenario::parse(text, ConfigFormat::Yaml).expect("valid scenario")
}

const TICKET_JOURNEY: &str = r#"
location: /event/abc
settings:
  event:
    ticketCount: 2
    waitMs: 300
  apply:
    lastName: Sato
    firstName: Hana
    phoneNumber: "09012345678"
elements:
  - tag: select
    selectors: ['[class*="TicketTypeCard_numberSelector"]']
    value: "0"
    options:
      - { value: "0", text: "0" }
      - { value: "1", text: "1" }
      - { value: "2", text: "2" }
  - tag: button
    text: 申し込む
    selectors: ['[class*="Button_rectMain"]']
script:
  - atMs: 10
    action: navigate
    kind: replaceState
    location: /event/abc
  - atMs: 1990
    action: clear
  - atMs: 1990
    action: insert
    elements:
      - { tag: label, text: コンビニ支払い, checked: false }
      - { tag: input, name: lastName }
      - { tag: input, name: firstName }
      - { tag: input, name: phoneNumber }
      - { tag: button, text: 申し込みを完了する }
  - atMs: 2000
    action: navigate
    location: /event/abc/apply
"#;

#[tokio::test(start_paused = true)]
async fn selection_then_application_journey() {
    let report = run_scenario(scenario(TICKET_JOURNEY), &Settings::default())
        .await
        .unwrap();

    assert_eq!(report.duplicates, 1);
    assert_eq!(report.dispatches.len(), 2);

    let selection = report.dispatches[0].run.as_ref().unwrap();
    assert_eq!(report.dispatches[0].flow, Some(FlowId::Selection));
    assert_eq!(selection.outcome, FlowOutcome::Completed);
    assert_eq!(selection.terminal_phase("5"), Some(StepPhase::Ok));

    let application = report.dispatches[1].run.as_ref().unwrap();
    assert_eq!(report.dispatches[1].flow, Some(FlowId::Application));
    assert_eq!(application.outcome, FlowOutcome::CompletedPartial);
    assert_eq!(application.terminal_phase("7"), Some(StepPhase::Skip));

    // Confirm button and payment label; submit stays untouched in a dry run.
    assert_eq!(report.clicks, 2);
    assert!(report.step_events >= selection.steps.len() + application.steps.len());

    let text = render_human(&report);
    assert!(text.contains("#1 /event/abc -> selection: Completed"));
    assert!(text.contains("#2 /event/abc/apply -> application: CompletedPartial"));
    assert!(text.contains("1 duplicate navigation(s)"));
}

#[tokio::test(start_paused = true)]
async fn leaving_the_page_aborts_the_waiting_flow() {
    let report = run_scenario(
        scenario(
            r#"
location: /event/abc
script:
  - atMs: 500
    action: navigate
    location: /mypage
"#,
        ),
        &Settings::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.dispatches.len(), 2);
    let first = report.dispatches[0].run.as_ref().unwrap();
    assert_eq!(first.outcome, FlowOutcome::Aborted);
    assert_eq!(first.terminal_phase("1"), Some(StepPhase::Skip));
    assert_eq!(report.dispatches[1].flow, None);
    assert!(report.dispatches[1].run.is_none());
    assert!(render_human(&report).contains("/mypage -> no route"));
}

#[tokio::test(start_paused = true)]
async fn pending_scheduled_start_can_be_cancelled() {
    let report = run_scenario(
        scenario(
            r#"
location: /event/abc
settings:
  common:
    startDate: "2099-01-01"
    startTime: "10:00"
script:
  - atMs: 100
    action: cancel
"#,
        ),
        &Settings::default(),
    )
    .await
    .unwrap();

    let record = &report.dispatches[0];
    assert!(record.delay_ms > 0);
    assert!(record.suppressed);
    assert!(record.run.is_none());
    assert_eq!(report.runs().count(), 0);
    assert!(render_human(&report).contains("start suppressed"));
}

#[tokio::test(start_paused = true)]
async fn json_report_carries_flow_runs() {
    let report = run_scenario(scenario(TICKET_JOURNEY), &Settings::default())
        .await
        .unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["dispatches"][0]["flow"], "selection");
    assert_eq!(json["dispatches"][0]["run"]["outcome"], "completed");
    assert_eq!(json["dispatches"][1]["run"]["outcome"], "completed_partial");
    assert_eq!(json["duplicates"], 1);
}

#[tokio::test(start_paused = true)]
async fn starting_page_is_routed_and_only_a_reload_routes_it_again() {
    let report = run_scenario(
        scenario(
            r#"
location: /event/abc
settings:
  common:
    startDate: "2099-01-01"
    startTime: "10:00"
script:
  - action: navigate
    location: /event/abc
  - atMs: 100
    action: navigate
    kind: load
    location: /event/abc
  - atMs: 200
    action: cancel
"#,
        ),
        &Settings::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.duplicates, 1);
    assert_eq!(report.dispatches.len(), 2);
    for record in &report.dispatches {
        assert_eq!(record.location.as_str(), "/event/abc");
        assert_eq!(record.flow, Some(FlowId::Selection));
        assert!(record.suppressed);
    }
    assert_ne!(report.dispatches[0].dispatch_id, report.dispatches[1].dispatch_id);
}
