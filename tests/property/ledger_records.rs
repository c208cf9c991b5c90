//! Property-based tests for ledger records and archive naming

use chrono::{TimeZone, Utc};
use ferry::archive::Archive;
use ferry::host::{CompileSummary, Diagnostic};
use ferry::ledger::{LedgerRecord, LedgerStatus};
use proptest::prelude::*;

const MAX_MS: u64 = 4_000_000_000_000;

/// Terminal records never report a negative duration, even with a skewed clock.
#[test]
fn test_complete_record_duration_non_negative() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(0..MAX_MS, 0..MAX_MS, 0usize..5, 0usize..5),
            |(started, ended, errors, warnings)| {
                let mut diagnostics = Vec::new();
                diagnostics.extend((0..errors).map(|i| Diagnostic::error(format!("e{}", i))));
                diagnostics.extend((0..warnings).map(|i| Diagnostic::warning(format!("w{}", i))));
                let record = LedgerRecord::complete(started, ended, &CompileSummary { diagnostics });

                prop_assert_eq!(record.status, LedgerStatus::Complete);
                let start = record.started_at_ms.unwrap();
                let end = record.ended_at_ms.unwrap();
                prop_assert!(end >= start);
                prop_assert_eq!(record.duration_ms, Some(end - start));
                prop_assert_eq!(record.errors, Some(errors));
                prop_assert_eq!(record.warnings, Some(warnings));
                Ok(())
            },
        )
        .unwrap();
}

/// Archive names sort in the order their files were archived.
#[test]
fn test_archive_names_sort_chronologically() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(0i64..4_000_000_000_000, 0i64..4_000_000_000_000, "[a-z0-9-]{1,16}\\.json"),
            |(a, b, original)| {
                let ta = Utc.timestamp_millis_opt(a).unwrap();
                let tb = Utc.timestamp_millis_opt(b).unwrap();
                let na = Archive::archived_name(&original, ta);
                let nb = Archive::archived_name(&original, tb);

                prop_assert_eq!(ta.cmp(&tb), na.cmp(&nb));
                prop_assert!(na.ends_with(&original));
                Ok(())
            },
        )
        .unwrap();
}
