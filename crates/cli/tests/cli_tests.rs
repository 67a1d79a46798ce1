//! CLI integration tests

use std::process::{Command, Output};

fn anomalyctl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_anomalyctl"))
        .args(args)
        .env("NO_COLOR", "1")
        .env_remove("ANOMALY_API_URL")
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = anomalyctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("anomaly detection"), "Should describe the tool");
    assert!(stdout.contains("list"), "Should show list command");
    assert!(stdout.contains("summary"), "Should show summary command");
    assert!(stdout.contains("types"), "Should show types command");
    assert!(stdout.contains("health"), "Should show health command");
}

#[test]
fn test_cli_version() {
    let output = anomalyctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("anomalyctl"), "Should show binary name");
}

#[test]
fn test_list_help() {
    let output = anomalyctl(&["list", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--lookback-hours"));
    assert!(stdout.contains("--severity"));
    assert!(stdout.contains("--type"));
}

#[test]
fn test_list_against_server() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/anomalies")
        .match_query(mockito::Matcher::UrlEncoded(
            "lookback_hours".into(),
            "2".into(),
        ))
        .with_header("content-type", "application/json")
        .with_body(
            r#"[{"type": "high_error_rate", "severity": "HIGH",
                "timestamp": "2024-05-01T12:00:00Z",
                "description": "High error rate in container api: 33.3%",
                "details": {"error_rate": 33.3, "error_count": 10, "total_logs": 30},
                "affected_resource": "api", "confidence": 1.0}]"#,
        )
        .create();

    let url = server.url();
    let output = anomalyctl(&["--api-url", &url, "list", "--lookback-hours", "2"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    mock.assert();
    assert!(output.status.success());
    assert!(stdout.contains("high_error_rate"));
    assert!(stdout.contains("Total: 1 anomalies"));
}

#[test]
fn test_json_output_against_server() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/anomalies")
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create();

    let url = server.url();
    let output = anomalyctl(&["--api-url", &url, "--format", "json", "list"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert_eq!(stdout.trim(), "[]");
}

#[test]
fn test_api_error_fails_command() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/anomalies")
        .match_query(mockito::Matcher::Any)
        .with_status(400)
        .with_body(r#"{"error": "Invalid severity filter"}"#)
        .create();

    let url = server.url();
    let output = anomalyctl(&["--api-url", &url, "list", "--severity", "urgent"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Invalid severity filter"));
}
