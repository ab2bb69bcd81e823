//! CLI smoke tests for the ae-core binary.
//!
//! Every test pins the configuration explicitly (or isolates discovery in a
//! temp directory) so the host's archives.json never leaks in.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ae_core::exit_codes::ExitCode;
use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn ae_core(home: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("ae-core");
    cmd.timeout(Duration::from_secs(60))
        .env_remove("AE_ARCHIVE_CONFIG")
        .env_remove("AE_CONFIG_DIR")
        .env_remove("RUST_LOG")
        .env("XDG_CONFIG_HOME", home)
        .env("AE_LOG", "error");
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

fn write_config(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("archives.json");
    fs::write(
        &path,
        r#"{
          "heartbeat_secs": 60,
          "archives": [
            { "code": "Cur", "bit": 0,
              "storage": { "driver": "snapshot", "path": "data/cur.json", "flush_period_secs": 1 } },
            { "code": "Min", "bit": 1,
              "storage": { "driver": "jsonl_trend", "dir": "data/min", "write_period_secs": 1 } },
            { "code": "Events", "bit": 2,
              "storage": { "driver": "jsonl_events", "dir": "data/events" } }
          ]
        }"#,
    )
    .unwrap();
    path
}

fn write_feed(dir: &TempDir, lines: &[&str]) -> PathBuf {
    let path = dir.path().join("feed.jsonl");
    fs::write(&path, lines.join("\n")).unwrap();
    path
}

const FEED: &[&str] = &[
    r#"{"type":"snapshot","timestamp":"2026-07-01T00:00:00Z","values":{"10":{"val":1.0,"stat":1},"20":{"val":5.0,"stat":1}}}"#,
    r#"{"type":"snapshot","timestamp":"2026-07-01T00:01:00Z","values":{"10":{"val":2.0,"stat":1},"20":{"val":6.0,"stat":1}}}"#,
    r#"{"type":"event","mask":4,"event":{"id":77,"timestamp":"2026-07-01T00:01:30Z","cnl_num":10,"severity":800,"text":"high"}}"#,
    r#"{"type":"snapshot","timestamp":"2026-07-01T00:02:00Z","values":{"10":{"val":3.0,"stat":1},"20":{"val":7.0,"stat":1}}}"#,
    r#"{"type":"ack","id":77,"timestamp":"2026-07-01T00:03:00Z","user_id":5}"#,
];

#[test]
fn version_reports_crate_version() {
    let home = TempDir::new().unwrap();
    ae_core(home.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ae_core_version"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn check_uses_builtin_default_without_config() {
    let home = TempDir::new().unwrap();
    let output = ae_core(home.path()).arg("check").output().unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["command"], "check");
    assert_eq!(json["source"], "builtin default");
    let archives = json["archives"].as_array().unwrap();
    assert_eq!(archives.len(), 3);
    assert_eq!(archives[0]["code"], "Cur");
}

#[test]
fn check_summary_is_one_line() {
    let home = TempDir::new().unwrap();
    ae_core(home.path())
        .args(["check", "--format", "summary"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[run-"))
        .stdout(predicate::str::contains("config ok: 3 archive(s)"));
}

#[test]
fn missing_config_file_is_config_error() {
    let home = TempDir::new().unwrap();
    ae_core(home.path())
        .args(["check", "--config"])
        .arg(home.path().join("absent.json"))
        .assert()
        .code(ExitCode::ConfigError.as_i32())
        .stderr(predicate::str::contains("config file not found"))
        .stderr(predicate::str::contains(r#""headline":"Configuration Error""#));
}

#[test]
fn duplicate_bits_abort_start_up() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("archives.json");
    fs::write(
        &path,
        r#"{ "archives": [
             { "code": "A", "bit": 3, "storage": { "driver": "memory_events" } },
             { "code": "B", "bit": 3, "storage": { "driver": "memory_trend" } } ] }"#,
    )
    .unwrap();
    ae_core(home.path())
        .args(["check", "--config"])
        .arg(&path)
        .assert()
        .code(ExitCode::ConfigError.as_i32());
}

#[test]
fn query_on_empty_archive_exits_empty() {
    let home = TempDir::new().unwrap();
    ae_core(home.path())
        .args(["trend", "--bit", "1", "--cnl", "10,20"])
        .assert()
        .code(ExitCode::Empty.as_i32());
}

#[test]
fn malformed_feed_is_args_error() {
    let home = TempDir::new().unwrap();
    let feed = write_feed(&home, &[FEED[0], r#"{"type":"reading"}"#]);
    ae_core(home.path())
        .args(["replay", "--input"])
        .arg(&feed)
        .assert()
        .code(ExitCode::ArgsError.as_i32())
        .stderr(predicate::str::contains("feed.jsonl:2"));
}

#[test]
fn replayed_feed_is_queryable_from_files() {
    let home = TempDir::new().unwrap();
    let config = write_config(&home);
    let feed = write_feed(&home, FEED);

    let output = ae_core(home.path())
        .arg("--config")
        .arg(&config)
        .args(["replay", "--input"])
        .arg(&feed)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    assert_eq!(json["stats"]["cycles"], 3);
    assert_eq!(json["stats"]["events"], 1);
    assert_eq!(json["stats"]["acks_applied"], 1);

    // Trend rows were flushed to daily files and reload in a new process.
    let output = ae_core(home.path())
        .arg("--config")
        .arg(&config)
        .args(["trend", "--bit", "1", "--cnl", "20,10"])
        .args(["--from", "2026-07-01T00:00:00Z", "--to", "2026-07-01T00:01:00Z"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    let bundle = &json["bundle"];
    assert_eq!(bundle["cnl_nums"], serde_json::json!([20, 10]));
    assert_eq!(bundle["timestamps"].as_array().unwrap().len(), 2);
    assert_eq!(bundle["series"][0][1]["val"], 6.0);
    assert_eq!(bundle["series"][1][1]["val"], 2.0);

    let output = ae_core(home.path())
        .arg("--config")
        .arg(&config)
        .args(["slice", "--bit", "1", "--cnl", "10", "--at", "2026-07-01T00:02:00Z"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["slice"]["values"][0]["val"], 3.0);

    // The acknowledgment from the feed was persisted with the event.
    let output = ae_core(home.path())
        .arg("--config")
        .arg(&config)
        .args(["event", "--bit", "2", "--id", "77"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let event = &stdout_json(&output)["event"];
    assert_eq!(event["severity"], 800);
    assert_eq!(event["ack"]["ack"], true);
    assert_eq!(event["ack"]["ack_user_id"], 5);

    let output = ae_core(home.path())
        .arg("--config")
        .arg(&config)
        .args(["events", "--bit", "2", "--min-severity", "750", "--acked"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["events"].as_array().unwrap().len(), 1);

    ae_core(home.path())
        .arg("--config")
        .arg(&config)
        .args(["events", "--bit", "2", "--unacked"])
        .assert()
        .code(ExitCode::Empty.as_i32());
}

#[test]
fn ack_reaches_persisted_events() {
    let home = TempDir::new().unwrap();
    let config = write_config(&home);
    let feed = write_feed(&home, &FEED[..4]);

    ae_core(home.path())
        .arg("--config")
        .arg(&config)
        .args(["replay", "--input"])
        .arg(&feed)
        .assert()
        .success();

    ae_core(home.path())
        .arg("--config")
        .arg(&config)
        .args(["ack", "--id", "77", "--user", "9", "--at", "2026-07-01T01:00:00Z"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"archives\": 1"));

    ae_core(home.path())
        .arg("--config")
        .arg(&config)
        .args(["ack", "--id", "999", "--user", "9"])
        .assert()
        .code(ExitCode::Empty.as_i32());

    let output = ae_core(home.path())
        .arg("--config")
        .arg(&config)
        .args(["--format", "jsonl", "event", "--bit", "2", "--id", "77"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).lines().count(), 1);
    let event = &stdout_json(&output)["event"];
    assert_eq!(event["ack"]["ack_user_id"], 9);
}

#[test]
fn restart_restores_current_snapshot() {
    let home = TempDir::new().unwrap();
    let config = write_config(&home);
    let feed = write_feed(&home, &FEED[..1]);
    ae_core(home.path())
        .arg("--config")
        .arg(&config)
        .args(["replay", "--input"])
        .arg(&feed)
        .assert()
        .success();
    assert!(home.path().join("data/cur.json").exists());

    // A snapshot with channel 10 undefined is filled from the stored one.
    let second = write_feed(
        &home,
        &[r#"{"type":"snapshot","timestamp":"2026-07-01T00:10:00Z","values":{"10":{"val":0.0,"stat":0}}}"#],
    );
    let output = ae_core(home.path())
        .arg("--config")
        .arg(&config)
        .args(["replay", "--input"])
        .arg(&second)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["stats"]["restored"], true);
}

#[test]
fn events_filter_by_severity_band() {
    let home = TempDir::new().unwrap();
    let config = write_config(&home);
    let feed = write_feed(
        &home,
        &[
            r#"{"type":"event","mask":4,"event":{"id":1,"timestamp":"2026-07-01T00:00:01Z","severity":300}}"#,
            r#"{"type":"event","mask":4,"event":{"id":2,"timestamp":"2026-07-01T00:00:02Z","severity":600}}"#,
            r#"{"type":"event","mask":4,"event":{"id":3,"timestamp":"2026-07-01T00:00:03Z","severity":800}}"#,
        ],
    );
    ae_core(home.path())
        .arg("--config")
        .arg(&config)
        .args(["replay", "--input"])
        .arg(&feed)
        .assert()
        .success();

    let count = |band: &str| {
        let output = ae_core(home.path())
            .arg("--config")
            .arg(&config)
            .args(["events", "--bit", "2", "--severity", band])
            .output()
            .unwrap();
        stdout_json(&output)["events"].as_array().unwrap().len()
    };
    assert_eq!(count("minor"), 3);
    assert_eq!(count("major"), 2);
    assert_eq!(count("critical"), 1);

    ae_core(home.path())
        .arg("--config")
        .arg(&config)
        .args(["--format", "summary", "event", "--bit", "2", "--id", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("severity 600 (major)"));

    ae_core(home.path())
        .arg("--config")
        .arg(&config)
        .args(["events", "--bit", "2", "--severity", "urgent"])
        .assert()
        .failure();
}
