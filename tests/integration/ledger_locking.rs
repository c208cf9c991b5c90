//! Ledger lock semantics against real files: compiling implies locked, terminal implies unlocked.

use super::test_utils::fast_config;
use ferry::host::{Diagnostic, HostOperations, MemoryHost};
use ferry::ledger::{
    FsLockProvider, LedgerObservation, LedgerReader, LedgerRecord, LedgerStatus,
    LedgerTransition, LockProvider,
};
use ferry::runtime::HostRuntime;
use std::sync::Arc;
use tempfile::TempDir;

fn reader(runtime: &HostRuntime<MemoryHost>) -> LedgerReader {
    LedgerReader::new(runtime.paths().ledger_file.clone(), Arc::new(FsLockProvider))
}

#[test]
fn compiling_record_is_locked_until_complete() {
    let temp = TempDir::new().unwrap();
    let mut host = MemoryHost::new().with_compile_ticks(3);
    host.stage_diagnostics(vec![Diagnostic::error("broken binding")]);
    let mut runtime = HostRuntime::new(temp.path(), &fast_config(), host).without_watcher();
    runtime.start().unwrap();
    let reader = reader(&runtime);

    let LedgerObservation::Record { record, locked } = reader.observe() else {
        panic!("expected an idle record after start");
    };
    assert_eq!(record.status, LedgerStatus::Idle);
    assert!(!locked);

    runtime.host_mut().request_compile().unwrap();
    let started = runtime.tick();
    assert!(matches!(started.transition, LedgerTransition::Started { .. }));

    let LedgerObservation::Record { record, locked } = reader.observe() else {
        panic!("expected a compiling record");
    };
    assert_eq!(record.status, LedgerStatus::Compiling);
    assert!(locked, "a compiling record must be backed by a held lock");
    assert!(reader.observe().shows_compiling());

    let mut finished = None;
    for _ in 0..10 {
        if let LedgerTransition::Finished(record) = runtime.tick().transition {
            finished = Some(record);
            break;
        }
        assert!(FsLockProvider
            .is_locked(&runtime.paths().ledger_file)
            .unwrap());
    }
    let finished = finished.expect("compile should finish within a few ticks");

    let LedgerObservation::Record { record, locked } = reader.observe() else {
        panic!("expected a terminal record");
    };
    assert!(!locked);
    assert_eq!(record, finished);
    assert_eq!(record.status, LedgerStatus::Complete);
    assert_eq!(record.errors, Some(1));
    assert!(record.ended_at_ms.unwrap() >= record.started_at_ms.unwrap());
    assert_eq!(
        record.duration_ms,
        Some(record.ended_at_ms.unwrap() - record.started_at_ms.unwrap())
    );
    assert!(record.started_at.is_some() && record.ended_at.is_some());

    runtime.stop().unwrap();
}

#[test]
fn stale_compiling_record_is_reset_at_start() {
    let temp = TempDir::new().unwrap();
    let config = fast_config();
    let ledger_file = config.paths.resolve(temp.path()).ledger_file;
    std::fs::create_dir_all(ledger_file.parent().unwrap()).unwrap();
    std::fs::write(
        &ledger_file,
        LedgerRecord::compiling(1_000).to_bytes().unwrap(),
    )
    .unwrap();

    let mut runtime = HostRuntime::new(temp.path(), &config, MemoryHost::new()).without_watcher();
    runtime.start().unwrap();

    let record = LedgerRecord::parse(&std::fs::read(&ledger_file).unwrap()).unwrap();
    assert_eq!(record.status, LedgerStatus::Idle);
    runtime.stop().unwrap();
}

#[test]
fn compile_in_progress_is_released_on_stop() {
    let temp = TempDir::new().unwrap();
    let mut runtime = HostRuntime::new(
        temp.path(),
        &fast_config(),
        MemoryHost::new().with_compile_ticks(50),
    )
    .without_watcher();
    runtime.start().unwrap();
    runtime.host_mut().request_compile().unwrap();
    runtime.tick();
    let ledger_file = runtime.paths().ledger_file.clone();
    assert!(FsLockProvider.is_locked(&ledger_file).unwrap());

    runtime.stop().unwrap();

    assert!(!FsLockProvider.is_locked(&ledger_file).unwrap());
    let record = LedgerRecord::parse(&std::fs::read(&ledger_file).unwrap()).unwrap();
    assert_eq!(record.status, LedgerStatus::Idle);
}
