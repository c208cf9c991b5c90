//! External client against a live host thread and against a silent workspace.

use super::test_utils::{fast_config, HostThread};
use ferry::client::{ClientOptions, ExternalClient, Verdict};
use ferry::executor::CommandStatus;
use ferry::host::{CompileSummary, Diagnostic, MemoryHost};
use ferry::ledger::LedgerRecord;
use ferry::request::{RawCommand, Request};
use ferry::types::now_millis;
use serde_json::{json, Map};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn options(timeout: Duration) -> ClientOptions {
    ClientOptions {
        timeout,
        poll_interval: Duration::from_millis(10),
        grace: Duration::from_millis(200),
        nudge_retries: 2,
        include_warnings: true,
    }
}

#[tokio::test]
async fn compile_without_host_times_out_within_budget() {
    let temp = TempDir::new().unwrap();
    let client =
        ExternalClient::new(temp.path(), &fast_config()).with_options(options(Duration::from_millis(500)));

    let started = Instant::now();
    let report = client.compile().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(report.verdict, Verdict::Timeout);
    assert_eq!(report.exit_code(), 2);
    assert!(elapsed >= Duration::from_millis(500));
    assert!(elapsed < Duration::from_secs(3), "took {:?}", elapsed);
    assert!(report.render().starts_with("STATUS: TIMEOUT\n"));
    assert!(report.details.iter().any(|d| d.contains("correlation id")));
}

#[tokio::test]
async fn stale_complete_record_is_accepted_after_grace() {
    let temp = TempDir::new().unwrap();
    let config = fast_config();
    let ledger_file = config.paths.resolve(temp.path()).ledger_file;
    std::fs::create_dir_all(ledger_file.parent().unwrap()).unwrap();
    let earlier = now_millis().saturating_sub(60_000);
    let record = LedgerRecord::complete(
        earlier,
        earlier + 250,
        &CompileSummary {
            diagnostics: vec![Diagnostic::error("old failure")],
        },
    );
    std::fs::write(&ledger_file, record.to_bytes().unwrap()).unwrap();

    let client = ExternalClient::new(temp.path(), &config).with_options(options(Duration::from_secs(5)));
    let started = Instant::now();
    let report = client.compile().await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(report.verdict, Verdict::Failure);
    assert_eq!(report.errors, 1);
    assert!(report.details.iter().any(|d| d == "error: old failure"));
    assert!(report
        .details
        .iter()
        .any(|d| d.contains("reporting the last completed compile")));
}

#[tokio::test]
async fn compile_against_running_host_reports_errors() {
    let temp = TempDir::new().unwrap();
    let mut host = MemoryHost::new().with_compile_ticks(3);
    host.stage_diagnostics(vec![
        Diagnostic::error("unresolved reference 'Knob'"),
        Diagnostic::warning("unused widget 'Panel'"),
    ]);
    let host_thread = HostThread::spawn(temp.path(), fast_config(), host);

    let client = ExternalClient::new(temp.path(), &fast_config()).with_options(options(Duration::from_secs(5)));
    let report = client.compile().await.unwrap();
    let host = host_thread.finish();

    assert_eq!(report.verdict, Verdict::Failure);
    assert_eq!(report.errors, 1);
    assert_eq!(report.warnings, 1);
    let rendered = report.render();
    assert!(rendered.contains("  error: unresolved reference 'Knob'\n"));
    assert!(rendered.contains("  warning: unused widget 'Panel'\n"));
    assert!(!rendered.contains("last completed compile"));
    assert_eq!(host.compile_count(), 1);
}

#[tokio::test]
async fn clean_compile_against_running_host_succeeds() {
    let temp = TempDir::new().unwrap();
    let host_thread = HostThread::spawn(
        temp.path(),
        fast_config(),
        MemoryHost::new().with_compile_ticks(2),
    );

    let client = ExternalClient::new(temp.path(), &fast_config()).with_options(options(Duration::from_secs(5)));
    let report = client.compile().await.unwrap();
    host_thread.finish();

    assert_eq!(report.verdict, Verdict::Success);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.errors, 0);
}

#[tokio::test]
async fn submitted_batch_answers_with_its_transcript() {
    let temp = TempDir::new().unwrap();
    let host_thread = HostThread::spawn(temp.path(), fast_config(), MemoryHost::new());

    let client = ExternalClient::new(temp.path(), &fast_config()).with_options(options(Duration::from_secs(5)));
    let mut set_property = Map::new();
    set_property.insert("target".to_string(), json!("Bar"));
    set_property.insert("property".to_string(), json!("color"));
    set_property.insert("value".to_string(), json!("red"));
    let mut add_widget = Map::new();
    add_widget.insert("name".to_string(), json!("Bar"));
    add_widget.insert("extra".to_string(), json!(true));
    let request = Request::new(vec![
        RawCommand::new("add-widget", add_widget),
        RawCommand::new("set-property", set_property),
    ])
    .with_context("Foo");

    let submission = client.submit(request).unwrap();
    let transcript = client
        .wait_for_response(&submission.correlation_id)
        .await
        .unwrap()
        .expect("host should answer");
    let host = host_thread.finish();

    assert_eq!(transcript.correlation_id, Some(submission.correlation_id));
    assert_eq!(transcript.succeeded, 2);
    assert!(transcript
        .commands
        .iter()
        .all(|c| c.status == CommandStatus::Succeeded));
    assert_eq!(transcript.commands[0].ignored_fields, vec!["extra".to_string()]);
    assert_eq!(
        host.widget("Foo", "Bar").unwrap().properties.get("color"),
        Some(&json!("red"))
    );
}
