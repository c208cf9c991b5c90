//! The `ferry` binary: stdout block, exit codes, and the host/submit/ledger round trip.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn ferry(temp: &TempDir, workspace: &Path, args: &[&str]) -> Output {
    let home = temp.path().join("home");
    let config_home = temp.path().join("config");
    std::fs::create_dir_all(&home).unwrap();
    std::fs::create_dir_all(&config_home).unwrap();
    Command::new(env!("CARGO_BIN_EXE_ferry"))
        .arg("--workspace")
        .arg(workspace)
        .args(args)
        .env("HOME", &home)
        .env("XDG_CONFIG_HOME", &config_home)
        .env_remove("FERRY_ENV")
        .env_remove("FERRY_LOG")
        .env_remove("FERRY_LOG_FORMAT")
        .env_remove("FERRY_LOG_OUTPUT")
        .env_remove("FERRY_LOG_MODULES")
        .output()
        .expect("failed to run ferry binary")
}

fn workspace(temp: &TempDir) -> std::path::PathBuf {
    let ws = temp.path().join("ws");
    std::fs::create_dir_all(&ws).unwrap();
    ws
}

#[test]
fn compile_without_host_exits_with_timeout_code() {
    let temp = TempDir::new().unwrap();
    let ws = workspace(&temp);
    let output = ferry(&temp, &ws, &["compile", "--timeout", "1"]);

    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("STATUS: TIMEOUT\n"), "stdout: {}", stdout);
    assert!(stdout.contains("ERRORS: 0\nWARNINGS: 0\n"));
    assert!(stdout.contains("SCRIPT_VERSION: "));
    assert!(
        !stdout.contains("INFO") && !stdout.contains("WARN"),
        "logs must stay off stdout: {}",
        stdout
    );
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    let temp = TempDir::new().unwrap();
    let ws = workspace(&temp);
    let output = ferry(&temp, &ws, &["launch-rockets"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn invalid_config_is_an_internal_error() {
    let temp = TempDir::new().unwrap();
    let ws = workspace(&temp);
    std::fs::create_dir_all(ws.join(".ferry")).unwrap();
    std::fs::write(ws.join(".ferry/config.toml"), "[host]\ntick_ms = 0\n").unwrap();

    let output = ferry(&temp, &ws, &["--quiet", "ledger"]);
    assert_eq!(output.status.code(), Some(3));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("STATUS: ERROR\n"), "stdout: {}", stdout);
}

#[test]
fn submit_host_ledger_round_trip() {
    let temp = TempDir::new().unwrap();
    let ws = workspace(&temp);

    let ledger = ferry(&temp, &ws, &["ledger", "--format", "json"]);
    assert_eq!(ledger.status.code(), Some(0));
    let value: serde_json::Value = serde_json::from_slice(&ledger.stdout).unwrap();
    assert_eq!(value["state"], "missing");

    let batch = temp.path().join("batch.json");
    std::fs::write(
        &batch,
        r#"{"correlationId":"cli-1","context":"Foo","commands":[{"action":"add-widget","name":"Bar"}]}"#,
    )
    .unwrap();
    let submitted = ferry(&temp, &ws, &["submit", batch.to_str().unwrap()]);
    assert_eq!(submitted.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&submitted.stdout).contains("Correlation: cli-1"));

    let host = ferry(&temp, &ws, &["host", "--max-ticks", "3", "--poll"]);
    assert_eq!(host.status.code(), Some(0));
    let host_stdout = String::from_utf8_lossy(&host.stdout);
    assert!(host_stdout.contains("Contexts: Foo"), "stdout: {}", host_stdout);
    assert!(host_stdout.contains("Saves: 1"));

    assert!(ws.join(".ferry/responses/cli-1.json").is_file());
    assert_eq!(std::fs::read_dir(ws.join(".ferry/queue")).unwrap().count(), 0);

    let ledger = ferry(&temp, &ws, &["ledger"]);
    let stdout = String::from_utf8_lossy(&ledger.stdout);
    assert!(stdout.contains("Status: idle"));
    assert!(stdout.contains("Locked: false"));
}
