//! Queue ingestion: readiness, single consumption, archiving, and the watcher.

use super::test_utils::{fast_config, wait_until, write_request};
use ferry::archive::Archive;
use ferry::executor::BatchTranscript;
use ferry::host::MemoryHost;
use ferry::ledger::MemoryLockProvider;
use ferry::runtime::HostRuntime;
use fs2::FileExt;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn polling_runtime(temp: &TempDir) -> HostRuntime<MemoryHost> {
    let mut runtime = HostRuntime::with_lock_provider(
        temp.path(),
        &fast_config(),
        MemoryHost::new(),
        Arc::new(MemoryLockProvider::new()),
    )
    .without_watcher();
    runtime.start().unwrap();
    runtime
}

fn read_transcript(archived: &std::path::Path) -> BatchTranscript {
    serde_json::from_slice(&fs::read(Archive::transcript_path(archived)).unwrap()).unwrap()
}

#[test]
fn request_is_consumed_at_most_once_across_scans() {
    let temp = TempDir::new().unwrap();
    let mut runtime = polling_runtime(&temp);
    let queue = runtime.paths().queue_dir.clone();
    let file = write_request(
        &queue,
        "1-once.json",
        r#"{"commands":[{"action":"create-context","name":"Once"}]}"#,
    );

    // Several scans before the drain must not enqueue the file twice.
    for _ in 0..5 {
        runtime.sweep().unwrap();
    }
    let report = runtime.tick();
    assert_eq!(report.drained.executed, 1);
    for _ in 0..5 {
        assert_eq!(runtime.tick().drained.executed, 0);
    }

    assert!(!file.exists());
    let archive = Archive::new(runtime.paths().archive_dir.clone());
    let entries = archive.entries().unwrap();
    assert_eq!(entries.len(), 1);
    let transcript = read_transcript(&entries[0]);
    assert_eq!(transcript.succeeded, 1);
    assert_eq!(runtime.host().save_count(), 1);
}

#[test]
fn archived_files_are_never_reprocessed() {
    let temp = TempDir::new().unwrap();
    let mut runtime = polling_runtime(&temp);
    let queue = runtime.paths().queue_dir.clone();
    write_request(
        &queue,
        "1-first.json",
        r#"{"commands":[{"action":"create-context","name":"A"}]}"#,
    );
    runtime.tick();

    // Something that looks like a request sitting in the archive is not a queue entry.
    fs::write(
        runtime.paths().archive_dir.join("2-stray.json"),
        r#"{"commands":[{"action":"create-context","name":"B"}]}"#,
    )
    .unwrap();
    for _ in 0..3 {
        runtime.tick();
    }
    assert_eq!(runtime.host().context_names(), vec!["A".to_string()]);
    assert_eq!(runtime.host().save_count(), 1);
}

#[test]
fn not_ready_file_is_skipped_then_retried() {
    let temp = TempDir::new().unwrap();
    let mut runtime = polling_runtime(&temp);
    let queue = runtime.paths().queue_dir.clone();
    let file = write_request(
        &queue,
        "1-slow.json",
        r#"{"commands":[{"action":"create-context","name":"Slow"}]}"#,
    );

    let writer = fs::File::open(&file).unwrap();
    FileExt::lock_exclusive(&writer).unwrap();
    let report = runtime.sweep().unwrap();
    assert_eq!(report.not_ready, 1);
    assert_eq!(runtime.tick().drained.executed, 0);
    assert!(file.exists());

    FileExt::unlock(&writer).unwrap();
    drop(writer);
    assert_eq!(runtime.tick().drained.executed, 1);
    assert!(!file.exists());
    assert_eq!(runtime.host().context_names(), vec!["Slow".to_string()]);
}

#[test]
fn unlocked_half_written_file_is_left_until_complete() {
    use std::io::Write;

    let temp = TempDir::new().unwrap();
    let mut runtime = polling_runtime(&temp);
    let queue = runtime.paths().queue_dir.clone();
    let file = queue.join("1-partial.json");
    let mut writer = fs::File::create(&file).unwrap();
    writer
        .write_all(br#"{"commands":[{"action":"create-context","na"#)
        .unwrap();
    writer.flush().unwrap();

    for _ in 0..3 {
        runtime.tick();
    }
    assert!(file.exists(), "partial request must not be archived");
    let archive = Archive::new(runtime.paths().archive_dir.clone());
    assert!(archive.entries().unwrap().is_empty());
    assert!(runtime.host().context_names().is_empty());

    writer.write_all(br#"me":"Partial"}]}"#).unwrap();
    drop(writer);
    runtime.tick();
    assert!(!file.exists());
    let entries = archive.entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(read_transcript(&entries[0]).succeeded, 1);
    assert_eq!(runtime.host().context_names(), vec!["Partial".to_string()]);
}

#[test]
fn failed_archive_move_leaves_file_for_reprocessing() {
    let temp = TempDir::new().unwrap();
    let mut config = fast_config();
    config.paths.archive_dir = "blocked-archive".into();
    // A regular file where the archive directory should be makes the move fail.
    fs::write(temp.path().join("blocked-archive"), "not a directory").unwrap();
    let queue = temp.path().join(".ferry").join("queue");
    let file = write_request(
        &queue,
        "1-stuck.json",
        r#"{"commands":[{"action":"set-property","target":"x","property":"p","value":1}]}"#,
    );

    let dispatcher = ferry::dispatch::AffinityDispatcher::<MemoryHost>::new();
    let paths = config.paths.resolve(temp.path());
    let ingestor = ferry::queue::QueueIngestor::new(
        paths.queue_dir.clone(),
        dispatcher.handle(),
        Archive::new(paths.archive_dir.clone()),
        ferry::archive::ResponseStore::new(paths.responses_dir.clone()),
        ferry::executor::BatchExecutor::default(),
    );
    let mut host = MemoryHost::new();

    ingestor.sweep().unwrap();
    let report = dispatcher.drain(&mut host);
    assert_eq!(report.failed, 1);
    assert!(file.exists(), "file must stay in the queue after a failed move");
    assert_eq!(ingestor.in_flight(), 0);

    // Once the archive location is usable the next scan picks the file up again.
    fs::remove_file(temp.path().join("blocked-archive")).unwrap();
    assert_eq!(ingestor.sweep().unwrap().enqueued, 1);
    assert_eq!(dispatcher.drain(&mut host).failed, 0);
    assert!(!file.exists());
    assert_eq!(Archive::new(paths.archive_dir).entries().unwrap().len(), 1);
}

#[test]
fn watcher_picks_up_new_files() {
    let temp = TempDir::new().unwrap();
    let mut runtime = HostRuntime::with_lock_provider(
        temp.path(),
        &fast_config(),
        MemoryHost::new(),
        Arc::new(MemoryLockProvider::new()),
    );
    runtime.start().unwrap();
    let queue = runtime.paths().queue_dir.clone();

    let file = write_request(
        &queue,
        "1-watched.json",
        r#"{"commands":[{"action":"create-context","name":"Watched"}]}"#,
    );
    let done = wait_until(Duration::from_secs(5), || {
        runtime.tick();
        !file.exists()
    });
    assert!(done, "watcher never delivered the request");
    assert_eq!(runtime.host().context_names(), vec!["Watched".to_string()]);
    runtime.stop().unwrap();
}

#[test]
fn single_command_form_is_accepted() {
    let temp = TempDir::new().unwrap();
    let mut runtime = polling_runtime(&temp);
    let queue = runtime.paths().queue_dir.clone();
    write_request(
        &queue,
        "1-single.json",
        r#"{"action":"create-context","name":"Solo","correlationId":"solo-1","timestampMs":1}"#,
    );
    runtime.tick();
    assert_eq!(runtime.host().context_names(), vec!["Solo".to_string()]);
    assert!(runtime.paths().responses_dir.join("solo-1.json").exists());
}
