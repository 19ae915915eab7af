#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const POLICY: &str = r#"{
  "version": "2024-06",
  "sdks": [
    { "id": "BRANCH", "requiredConsent": ["ANALYTICS"], "initOrder": 5 },
    { "id": "APPSFLYER", "requiredConsent": ["MARKETING"], "initOrder": 1, "thread": "FOREGROUND" }
  ]
}"#;

fn consentgate() -> Command {
    let mut cmd = Command::cargo_bin("consentgate").unwrap();
    cmd.env_remove("RUST_LOG").env_remove("CONSENTGATE_DATA_DIR");
    cmd
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"queued").unwrap();
}

fn simulate(policy: &Path, script: &Path, data_dir: &Path) -> (i32, Value) {
    let output = consentgate()
        .args(["simulate", "--policy"])
        .arg(policy)
        .arg("--script")
        .arg(script)
        .arg("--data-dir")
        .arg(data_dir)
        .output()
        .unwrap();
    let report: Value = serde_json::from_slice(&output.stdout).expect("report is JSON");
    (output.status.code().unwrap(), report)
}

fn count_calls(report: &Value, call: &str) -> usize {
    report["vendor_calls"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|c| c["call"] == call)
        .count()
}

#[test]
fn policy_validate_lists_entries_in_init_order() {
    let dir = tempdir().unwrap();
    let policy = write(dir.path(), "sdk_policy.json", POLICY);

    let output = consentgate()
        .args(["policy", "validate"])
        .arg(&policy)
        .assert()
        .success()
        .stderr(predicate::str::contains("Policy OK"))
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(output).unwrap();
    let appsflyer = stdout.find("APPSFLYER").unwrap();
    let branch = stdout.find("BRANCH").unwrap();
    assert!(appsflyer < branch, "init order not respected:\n{stdout}");
}

#[test]
fn policy_validate_json_reports_warnings() {
    let dir = tempdir().unwrap();
    let policy = write(
        dir.path(),
        "sdk_policy.json",
        r#"{"version":"1","sdks":[{"id":"MYSTERY"},{"id":"ADJUST","requiredConsent":[]}]}"#,
    );

    let output = consentgate()
        .args(["policy", "validate", "--json"])
        .arg(&policy)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));
    let doc: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["sdks"].as_array().unwrap().len(), 1);
    assert_eq!(doc["warnings"].as_array().unwrap().len(), 2);

    consentgate()
        .args(["policy", "validate", "--strict"])
        .arg(&policy)
        .assert()
        .code(1);
}

#[test]
fn policy_validate_rejects_malformed_file() {
    let dir = tempdir().unwrap();
    let policy = write(dir.path(), "sdk_policy.json", "{ not json");
    consentgate()
        .args(["policy", "validate"])
        .arg(&policy)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Policy invalid"));
}

#[test]
fn cache_inspect_and_purge() {
    let dir = tempdir().unwrap();
    consentgate()
        .args(["cache", "inspect", "--data-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No vendor cache files"));

    touch(&dir.path().join("cache").join("appsflyer_event_queue.jsonl"));
    touch(&dir.path().join("shared_prefs").join("appsflyer-data.xml"));
    touch(&dir.path().join("cache").join("glide_thumbs"));

    consentgate()
        .args(["cache", "inspect", "--data-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 2 vendor cache files"));

    consentgate()
        .args(["cache", "purge", "--json", "--data-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"deleted\": 2"));

    assert!(dir.path().join("cache").join("glide_thumbs").exists());
    assert!(!dir.path().join("cache").join("appsflyer_event_queue.jsonl").exists());
}

#[test]
fn simulate_denied_consent_never_reaches_vendor() {
    let dir = tempdir().unwrap();
    let policy = write(dir.path(), "sdk_policy.json", POLICY);
    let script = write(
        dir.path(),
        "deny.yaml",
        r#"
steps:
  - cmp: { ready: true, has_transparency_string: true, jurisdiction: true }
  - consent: [ANALYTICS]
  - log_event: should_not_leak
"#,
    );

    let (code, report) = simulate(&policy, &script, &dir.path().join("data"));
    assert_eq!(code, 0);
    assert_eq!(report["final_state"], "uninitialized");
    assert_eq!(report["sink"], "noop");
    assert_eq!(count_calls(&report, "start"), 0);
    assert_eq!(count_calls(&report, "log_event"), 0);
    assert_eq!(report["metrics"]["blocked_calls"], 1);
}

#[test]
fn simulate_grant_then_revoke_purges() {
    let dir = tempdir().unwrap();
    let policy = write(dir.path(), "sdk_policy.json", POLICY);
    let script = write(
        dir.path(),
        "grant_revoke.yaml",
        r#"
name: grant-revoke
steps:
  - cmp: { ready: true, has_transparency_string: true, jurisdiction: true }
  - consent: [MARKETING]
  - log_event: level_complete
  - log_revenue: { revenue: "2.49", currency: EUR }
  - consent: []
  - probe_event: leak_check
  - check_cache
  - consent: [MARKETING]
  - consent: [ANALYTICS]
"#,
    );

    let (code, report) = simulate(&policy, &script, &dir.path().join("data"));
    assert_eq!(code, 0, "report: {report:#}");
    assert_eq!(report["name"], "grant-revoke");
    assert_eq!(report["final_state"], "bootstrapped_stopped");
    assert_eq!(report["sink"], "noop");
    assert_eq!(count_calls(&report, "init"), 1);
    assert_eq!(count_calls(&report, "start"), 2);
    assert_eq!(report["metrics"]["stops"], 2);
    assert_eq!(report["cache"], "No vendor cache files");

    let steps = report["steps"].as_array().unwrap();
    assert!(steps[6]["detail"]
        .as_str()
        .unwrap()
        .starts_with("Found 1 vendor cache files"));
}

#[test]
fn simulate_tripwire_sets_exit_code() {
    let dir = tempdir().unwrap();
    let policy = write(dir.path(), "sdk_policy.json", POLICY);
    let script = write(
        dir.path(),
        "tripwire.yaml",
        r#"
steps:
  - cmp: { ready: true, has_transparency_string: true, jurisdiction: true }
  - consent: [MARKETING]
  - consent: []
  - callback: { kind: conversion_data, keys: [campaign, media_source] }
"#,
    );

    let (code, report) = simulate(&policy, &script, &dir.path().join("data"));
    assert_eq!(code, 5);
    assert_eq!(report["metrics"]["tripwire_hits"], 1);
    assert!(report["events"]
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e["tag"] == "tripwire"));
}

#[test]
fn simulate_missing_policy_fails() {
    let dir = tempdir().unwrap();
    let script = write(dir.path(), "s.yaml", "steps: []\n");
    consentgate()
        .args(["simulate", "--policy"])
        .arg(dir.path().join("absent.json"))
        .arg("--script")
        .arg(&script)
        .assert()
        .code(1);
}
