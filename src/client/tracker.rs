//! Poll-side state machine deciding when a ledger record answers this invocation.
//!
//! A `complete` record is only trusted as ours when either a `compiling` state was
//! observed first, or its start time is not earlier than our submission. Anything else
//! may be left over from an earlier compile; it is accepted only after the grace window
//! passes without a `compiling` showing up.

use crate::ledger::{LedgerObservation, LedgerRecord, LedgerStatus};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollDecision {
    Pending,
    Done(LedgerRecord),
}

#[derive(Debug, Clone)]
pub struct PollTracker {
    submitted_at_ms: u64,
    grace: Duration,
    seen_compiling: bool,
    stale_since: Option<Instant>,
    accepted_stale: bool,
}

impl PollTracker {
    pub fn new(submitted_at_ms: u64, grace: Duration) -> Self {
        Self {
            submitted_at_ms,
            grace,
            seen_compiling: false,
            stale_since: None,
            accepted_stale: false,
        }
    }

    pub fn seen_compiling(&self) -> bool {
        self.seen_compiling
    }

    /// True when the accepted record could not be proven to belong to this call.
    pub fn accepted_stale(&self) -> bool {
        self.accepted_stale
    }

    pub fn observe(&mut self, observation: &LedgerObservation, now: Instant) -> PollDecision {
        let LedgerObservation::Record { record, locked } = observation else {
            return PollDecision::Pending;
        };

        if *locked || record.status == LedgerStatus::Compiling {
            self.seen_compiling = true;
            self.stale_since = None;
            return PollDecision::Pending;
        }
        if record.status != LedgerStatus::Complete {
            return PollDecision::Pending;
        }

        let fresh = record
            .started_at_ms
            .map(|started| started >= self.submitted_at_ms)
            .unwrap_or(false);
        if self.seen_compiling || fresh {
            return PollDecision::Done(record.clone());
        }

        let since = *self.stale_since.get_or_insert(now);
        if now.saturating_duration_since(since) >= self.grace {
            self.accepted_stale = true;
            return PollDecision::Done(record.clone());
        }
        PollDecision::Pending
    }
}
