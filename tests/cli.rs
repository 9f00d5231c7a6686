use assert_cmd::prelude::*;
use serde_json::Value;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

fn autopilot(config: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("autopilot").expect("binary built");
    cmd.arg("--config")
        .arg(config)
        .env_remove("AUTOPILOT_START_DATE")
        .env_remove("AUTOPILOT_START_TIME")
        .env_remove("AUTOPILOT_AUTO_SUBMIT")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn config_init_writes_defaults_once() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.yaml");

    autopilot(&path).args(["config", "init"]).assert().success();
    assert!(fs::read_to_string(&path).unwrap().contains("autoSubmit: false"));

    autopilot(&path).args(["config", "init"]).assert().failure();
    autopilot(&path)
        .args(["config", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn config_path_prints_the_chosen_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("custom.json");

    let assert = autopilot(&path).args(["config", "path"]).assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert_eq!(stdout.trim(), path.display().to_string());
}

#[test]
fn schedule_reports_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.yaml");
    fs::write(&path, "common:\n  startDate: '2000-01-01'\n  startTime: '10:00'\n").unwrap();

    let assert = autopilot(&path)
        .args(["--output", "json", "schedule"])
        .assert()
        .success();
    let payload: Value = serde_json::from_slice(&assert.get_output().stdout).expect("json output");
    assert_eq!(payload["scheduled"], true);
    assert_eq!(payload["delayMs"], 0);
    assert_eq!(payload["startTime"], "10:00");
}

#[test]
fn malformed_schedule_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.yaml");
    fs::write(&path, "common:\n  startTime: 'soon'\n").unwrap();

    autopilot(&path).arg("schedule").assert().failure();
}

#[test]
fn simulate_prints_human_report() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("settings.yaml");
    let scenario = dir.path().join("scenario.yaml");
    fs::write(
        &scenario,
        r#"
location: /
script:
  - action: navigate
    location: /mypage
"#,
    )
    .unwrap();

    let assert = autopilot(&config)
        .arg("simulate")
        .arg(&scenario)
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.contains("#1 / -> no route"));
    assert!(stdout.contains("#2 /mypage -> no route"));
    assert!(config.exists());
}
