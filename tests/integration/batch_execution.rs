//! Batch execution end to end: request file in, host mutated, transcript and response out.

use super::test_utils::{fast_config, write_request};
use ferry::archive::{Archive, ResponseStore};
use ferry::config::FerryConfig;
use ferry::executor::{BatchTranscript, CommandStatus, FailurePolicy};
use ferry::host::MemoryHost;
use ferry::ledger::MemoryLockProvider;
use ferry::runtime::HostRuntime;
use ferry::types::CorrelationId;
use std::sync::Arc;
use tempfile::TempDir;

fn runtime(temp: &TempDir, config: &FerryConfig) -> HostRuntime<MemoryHost> {
    let mut runtime = HostRuntime::with_lock_provider(
        temp.path(),
        config,
        MemoryHost::new(),
        Arc::new(MemoryLockProvider::new()),
    )
    .without_watcher();
    runtime.start().unwrap();
    runtime
}

fn response(runtime: &HostRuntime<MemoryHost>, id: &str) -> BatchTranscript {
    ResponseStore::new(runtime.paths().responses_dir.clone())
        .read(&CorrelationId::from(id.to_string()))
        .unwrap()
        .expect("response written")
}

#[test]
fn create_then_attach_saves_once() {
    let temp = TempDir::new().unwrap();
    let mut runtime = runtime(&temp, &fast_config());
    let queue = runtime.paths().queue_dir.clone();
    write_request(
        &queue,
        "1-p5.json",
        r#"{
            "correlationId": "p5",
            "timestampMs": 1,
            "commands": [
                {"action": "create-context", "name": "Foo"},
                {"action": "add-widget", "name": "Bar", "parent": "Foo"}
            ]
        }"#,
    );
    runtime.tick();

    let host = runtime.host();
    assert_eq!(host.context_names(), vec!["Foo".to_string()]);
    assert_eq!(host.widget("Foo", "Bar").unwrap().parent, "Foo");
    assert_eq!(host.save_count(), 1);

    let transcript = response(&runtime, "p5");
    assert_eq!(transcript.total(), 2);
    assert_eq!(transcript.succeeded, 2);
    assert_eq!(transcript.failed, 0);
    assert!(transcript.saved);

    let archived = Archive::new(runtime.paths().archive_dir.clone()).entries().unwrap();
    assert_eq!(archived.len(), 1);
    assert!(Archive::transcript_path(&archived[0]).exists());
}

#[test]
fn missing_parent_fails_with_available_names_and_is_not_retried() {
    let temp = TempDir::new().unwrap();
    let mut runtime = runtime(&temp, &fast_config());
    let queue = runtime.paths().queue_dir.clone();
    write_request(
        &queue,
        "1-p6.json",
        r#"{
            "correlationId": "p6",
            "timestampMs": 1,
            "context": "Main",
            "commands": [
                {"action": "add-widget", "name": "Panel"},
                {"action": "add-widget", "name": "Knob", "parent": "Ghost"}
            ]
        }"#,
    );
    runtime.tick();

    let transcript = response(&runtime, "p6");
    assert_eq!(transcript.succeeded, 1);
    assert_eq!(transcript.failed, 1);
    let failed = &transcript.commands[1];
    assert_eq!(failed.status, CommandStatus::Failed);
    assert!(failed.message.contains("'Ghost'"), "{}", failed.message);
    assert!(failed.message.contains("Main"), "{}", failed.message);
    assert!(failed.message.contains("Panel"), "{}", failed.message);

    // Archived, not retried: more ticks change nothing.
    for _ in 0..3 {
        assert_eq!(runtime.tick().drained.executed, 0);
    }
    assert_eq!(
        Archive::new(runtime.paths().archive_dir.clone())
            .entries()
            .unwrap()
            .len(),
        1
    );
    assert!(runtime.host().widget("Main", "Panel").is_some());
}

#[test]
fn abort_policy_skips_rest_and_does_not_save() {
    let temp = TempDir::new().unwrap();
    let mut config = fast_config();
    config.host.failure_policy = FailurePolicy::Abort;
    let mut runtime = runtime(&temp, &config);
    let queue = runtime.paths().queue_dir.clone();
    write_request(
        &queue,
        "1-abort.json",
        r#"{
            "correlationId": "abort",
            "timestampMs": 1,
            "context": "Main",
            "commands": [
                {"action": "explode"},
                {"action": "add-widget", "name": "Never"}
            ]
        }"#,
    );
    runtime.tick();

    let transcript = response(&runtime, "abort");
    assert_eq!(transcript.policy, FailurePolicy::Abort);
    assert_eq!(transcript.failed, 1);
    assert_eq!(transcript.skipped, 1);
    assert!(!transcript.saved);
    assert!(transcript.commands[0].message.contains("Unknown action 'explode'"));
    assert_eq!(runtime.host().save_count(), 0);
    assert!(runtime.host().widget("Main", "Never").is_none());
}

#[test]
fn requests_run_in_submission_order() {
    let temp = TempDir::new().unwrap();
    let mut runtime = runtime(&temp, &fast_config());
    let queue = runtime.paths().queue_dir.clone();
    write_request(
        &queue,
        "2-second.json",
        r#"{"commands":[{"action":"rename-widget","name":"W","newName":"W2"}]}"#,
    );
    write_request(
        &queue,
        "1-first.json",
        r#"{"context":"C","commands":[{"action":"add-widget","name":"W"}]}"#,
    );
    runtime.tick();

    assert!(runtime.host().widget("C", "W2").is_some());
    assert!(runtime.host().widget("C", "W").is_none());
}
