use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::{TempDir, tempdir};

// Flat schedules so the expected numbers are easy to derive by hand
fn write_valid_config(dir: &TempDir) -> PathBuf {
    let toml = r#"
[pump]
dia_h = 3.0
max_basal_u_per_h = 3.0
max_bolus_u = 10.0

[[schedules.basal]]
time = "00:00"
value = 1.0

[[schedules.isf]]
time = "00:00"
value = 2.0

[[schedules.csf]]
time = "00:00"
value = 10.0

[[schedules.targets]]
time = "00:00"
value = 5.5
high = 6.5
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

/// Readings every 5 min from 11:30 to 12:00, `f(minutes_ago)`.
fn write_input(dir: &TempDir, name: &str, f: impl Fn(u32) -> f64) -> PathBuf {
    let readings: Vec<String> = (0..=6)
        .map(|k| {
            let ago = 30 - 5 * k;
            let minute = 60 - ago;
            let time = if minute == 60 {
                "2024-03-01T12:00:00".to_string()
            } else {
                format!("2024-03-01T11:{minute:02}:00")
            };
            format!(r#"{{"time": "{time}", "value": {}}}"#, f(ago))
        })
        .collect();
    let json = format!(
        r#"{{"now": "2024-03-01T12:00:00", "records": [], "readings": [{}]}}"#,
        readings.join(",")
    );
    let path = dir.path().join(name);
    fs::write(&path, json).unwrap();
    path
}

fn aid(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("aid_cli").unwrap();
    cmd.arg("--log-level").arg("error").arg("--config").arg(cfg);
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["check-config"], 0, "Config OK", "stdout")]
#[case(&["recommend"], 2, "required", "stderr")]
#[case(&["recommend", "--input", "/no/such/input.json"], 1, "read input", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let assert = aid(&cfg).args(args).assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[test]
fn flat_bg_needs_no_action() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let input = write_input(&dir, "flat.json", |_| 6.0);
    aid(&cfg)
        .arg("recommend")
        .arg("--input")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("no action (matches basal)"))
        .stdout(predicate::str::contains("Pump: nothing to do"));
}

#[test]
fn rising_bg_json_outcome_is_capped() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let input = write_input(&dir, "rising.json", |ago| 10.0 - 2.0 * f64::from(ago) / 30.0);
    let out = aid(&cfg)
        .arg("--json")
        .arg("recommend")
        .arg("--input")
        .arg(&input)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["recommendation"]["action"], "tbr");
    assert_eq!(v["recommendation"]["rate"], 3.0);
    assert_eq!(v["action"]["command"], "set");
    assert!(
        v["warnings"]
            .as_array()
            .unwrap()
            .iter()
            .any(|w| w["warning"] == "max_basal_exceeded")
    );
}

#[test]
fn insufficient_data_has_its_own_exit_code() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let input = dir.path().join("one.json");
    fs::write(
        &input,
        r#"{"readings": [{"time": "2024-03-01T11:58:00", "value": 7.0}]}"#,
    )
    .unwrap();
    let out = aid(&cfg)
        .arg("--json")
        .arg("recommend")
        .arg("--input")
        .arg(&input)
        .arg("--now")
        .arg("2024-03-01T12:00:00")
        .assert()
        .code(3)
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8_lossy(&out);
    let line = stderr
        .lines()
        .find(|l| l.contains("\"reason\""))
        .unwrap_or_default();
    let v: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(v["reason"], "InsufficientData");
    assert_eq!(v["retryable"], true);
    assert_eq!(v["details"]["found"], 1);
    assert_eq!(v["details"]["trend_window_min"], 30);
}

#[test]
fn iob_log_is_appended_and_listed() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let input = write_input(&dir, "flat.json", |_| 6.0);
    let log = dir.path().join("iob.jsonl");
    for _ in 0..2 {
        aid(&cfg)
            .arg("recommend")
            .arg("--input")
            .arg(&input)
            .arg("--iob-log")
            .arg(&log)
            .assert()
            .success();
    }
    assert_eq!(fs::read_to_string(&log).unwrap().lines().count(), 2);

    aid(&cfg)
        .arg("snapshots")
        .arg("--file")
        .arg(&log)
        .assert()
        .success()
        .stdout(predicate::str::contains("2024-03-01 12:00:00  0.00 U"));
}

#[test]
fn bolus_shows_up_in_iob() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let input = dir.path().join("bolus.json");
    fs::write(
        &input,
        r#"{"now": "2024-03-01T12:00:00",
            "records": [{"kind": "bolus", "time": "2024-03-01T11:58:00", "amount": 2.0}]}"#,
    )
    .unwrap();
    let out = aid(&cfg)
        .arg("--json")
        .arg("iob")
        .arg("--input")
        .arg(&input)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let iob = v["iob_u"].as_f64().unwrap();
    assert!((iob - 2.0).abs() < 0.05, "iob = {iob}");
    // 3 h at 5 min steps
    assert_eq!(v["prediction"].as_array().unwrap().len(), 37);
}

#[test]
fn schedule_dir_with_bad_header_is_reported() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let sched = dir.path().join("sched");
    fs::create_dir(&sched).unwrap();
    fs::write(sched.join("basal.csv"), "time,rate\n00:00,1.0\n").unwrap();
    fs::write(sched.join("isf.csv"), "time,value\n00:00,2.0\n").unwrap();
    fs::write(sched.join("csf.csv"), "time,value\n00:00,10\n").unwrap();
    fs::write(sched.join("targets.csv"), "time,value,high\n00:00,5.5,6.5\n").unwrap();
    aid(&cfg)
        .arg("--schedule-dir")
        .arg(&sched)
        .arg("check-config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid headers"));
}

#[test]
fn invalid_dia_for_walsh_is_a_config_error() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let text = fs::read_to_string(&cfg)
        .unwrap()
        .replace("dia_h = 3.0", "dia_h = 3.5");
    fs::write(&cfg, text).unwrap();
    aid(&cfg)
        .arg("check-config")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid configuration"));
}
