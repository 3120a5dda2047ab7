//! CLI integration tests

use mockito::Matcher;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn costctl(db: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_costctl"))
        .arg("--database-url")
        .arg(format!("sqlite://{}", db.display()))
        .args(args)
        .env_remove("COST_DATABASE_URL")
        .env_remove("COST_PROMETHEUS_URL")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute command")
}

fn vector_body(samples: &[(&str, &str)]) -> String {
    let result: Vec<serde_json::Value> = samples
        .iter()
        .map(|(component, value)| {
            serde_json::json!({
                "metric": {
                    "application": "shop",
                    "environment": "prod",
                    "component": component,
                },
                "value": [1709294400.0, value],
            })
        })
        .collect();

    serde_json::json!({
        "status": "success",
        "data": { "resultType": "vector", "result": result },
    })
    .to_string()
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_costctl"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("collect"), "Should show collect command");
    assert!(stdout.contains("runs"), "Should show runs command");
    assert!(stdout.contains("--database-url"), "Should show database flag");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_costctl"))
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("costctl"), "Should show binary name");
}

#[test]
fn test_runs_on_empty_database_prints_empty_json() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("runs.db");

    let output = costctl(
        &db,
        &[
            "--format",
            "json",
            "runs",
            "--from",
            "2024-03-01T00:00:00Z",
            "--to",
            "2024-03-02T00:00:00Z",
        ],
    );

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let runs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(runs, serde_json::json!([]));
}

#[test]
fn test_runs_rejects_inverted_range() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("runs.db");

    let output = costctl(
        &db,
        &["runs", "--from", "2024-03-02T00:00:00Z", "--to", "2024-03-01T00:00:00Z"],
    );

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("is after"));
}

#[test]
fn test_collect_then_list_run() {
    let mut server = mockito::Server::new();
    let cpu = server
        .mock("GET", "/api/v1/query")
        .match_query(Matcher::UrlEncoded(
            "query".into(),
            "sum(radix_operator_requested_cpu) by (application, environment, component)".into(),
        ))
        .with_body(vector_body(&[("web", "150.7"), ("api", "50")]))
        .create();
    let memory = server
        .mock("GET", "/api/v1/query")
        .match_query(Matcher::UrlEncoded(
            "query".into(),
            "sum(radix_operator_requested_memory) by (application, environment, component)".into(),
        ))
        .with_body(vector_body(&[("web", "256")]))
        .create();
    let replicas = server
        .mock("GET", "/api/v1/query")
        .match_query(Matcher::UrlEncoded(
            "query".into(),
            "sum(radix_operator_requested_replicas) by (application, environment, component)"
                .into(),
        ))
        .with_body(vector_body(&[("web", "2"), ("api", "1")]))
        .create();

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("runs.db");
    let at = "2024-03-01T12:00:00Z";

    let output = costctl(
        &db,
        &[
            "--format",
            "json",
            "collect",
            "--prometheus-url",
            &server.url(),
            "--at",
            at,
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    cpu.assert();
    memory.assert();
    replicas.assert();

    let collected: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(collected["cluster_cpu_millicores"], 200);
    assert_eq!(collected["cluster_memory_mega_bytes"], 256);

    let output = costctl(&db, &["--format", "json", "runs", "--from", at, "--to", at]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let runs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let runs = runs.as_array().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["id"], collected["id"]);
    assert_eq!(runs[0]["resources"].as_array().unwrap().len(), 2);
}

#[test]
fn test_collect_with_unreachable_prometheus_stores_nothing() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("runs.db");

    let output = costctl(
        &db,
        &[
            "collect",
            "--prometheus-url",
            "http://127.0.0.1:1",
            "--timeout-secs",
            "1",
            "--at",
            "2024-03-01T12:00:00Z",
        ],
    );
    assert!(!output.status.success());

    let output = costctl(
        &db,
        &[
            "--format",
            "json",
            "runs",
            "--from",
            "2024-03-01T00:00:00Z",
            "--to",
            "2024-03-02T00:00:00Z",
        ],
    );
    assert!(output.status.success());
    let runs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(runs, serde_json::json!([]));
}
