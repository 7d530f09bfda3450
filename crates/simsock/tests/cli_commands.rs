#![cfg(feature = "cli")]

use std::process::{Command, Output};

fn simsock(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_simsock"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .output()
        .expect("simsock should run")
}

fn json_report(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).expect("echo should emit json")
}

#[test]
fn echo_queue_mode_reports_all_matched() {
    let output = simsock(&[
        "--format",
        "json",
        "echo",
        "--mode",
        "queue",
        "--clients",
        "4",
        "--messages",
        "8",
        "--message-size",
        "300",
        "--buffer-capacity",
        "32",
    ]);

    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report = json_report(&output);
    assert_eq!(report["mode"], "queue");
    assert_eq!(report["total_sent"], 32);
    assert_eq!(report["total_matched"], 32);
    assert_eq!(report["timed_out"], false);
    assert_eq!(report["clients"].as_array().map(Vec::len), Some(4));
}

#[test]
fn echo_channel_mode_reports_all_matched() {
    let output = simsock(&[
        "--format",
        "json",
        "echo",
        "--mode",
        "channel",
        "--clients",
        "2",
        "--messages",
        "5",
        "--buffer-capacity",
        "8",
    ]);

    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report = json_report(&output);
    assert_eq!(report["mode"], "channel");
    assert_eq!(report["buffer_capacity"], 8);
    assert_eq!(report["total_matched"], 10);
}

#[test]
fn echo_table_output_lists_clients() {
    let output = simsock(&["--format", "table", "echo", "--clients", "2", "--messages", "1"]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("CLIENT"));
    assert!(stdout.contains("client-0"));
    assert!(stdout.contains("client-1"));
    assert!(stdout.contains("TOTAL"));
}

#[test]
fn echo_pretty_output_summarizes() {
    let output = simsock(&["--format", "pretty", "echo", "--clients", "1", "--messages", "3"]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("mode=queue"));
    assert!(stdout.contains("total: sent=3 matched=3"));
}

#[test]
fn echo_rejects_zero_clients_with_usage_code() {
    let output = simsock(&["echo", "--clients", "0"]);

    assert_eq!(output.status.code(), Some(64));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--clients must be at least 1"));
}

#[test]
fn echo_rejects_bad_timeout_with_usage_code() {
    let output = simsock(&["echo", "--timeout", "soon"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_prints_name_and_version() {
    let output = simsock(&["version"]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("simsock {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn version_extended_includes_target() {
    let output = simsock(&["version", "--extended"]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("name: simsock"));
    assert!(stdout.contains("target: "));
    assert!(stdout.contains("features: peer=true, cli=true"));
}
