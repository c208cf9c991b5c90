//! Compilation Ledger
//!
//! Exposes the host's compile state to outside processes through one shared file.
//! The host polls its compile flag every tick (level-triggered) but only writes on an
//! observed transition (edge-triggered):
//!
//! - idle → compiling: lock the file exclusively, write the start record, keep the
//!   handle open for the whole compile.
//! - compiling → idle: read the start back through the held handle, release the lock,
//!   then write the terminal record without the lock.
//!
//! So `status == compiling` holds exactly while the host owns the lock. A host that dies
//! mid-compile leaves a `compiling` record behind; readers must bound their own wait.

mod lock;

pub use lock::{FsLockProvider, LedgerHandle, LockProvider, MemoryLockProvider};

use crate::error::LedgerError;
use crate::host::{CompileProbe, CompileSummary, Diagnostic};
use crate::types::{now_millis, rfc3339_from_millis};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    Idle,
    Compiling,
    Complete,
}

/// Contents of the ledger file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    pub status: LedgerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Diagnostic>,
}

impl LedgerRecord {
    pub fn idle() -> Self {
        Self {
            status: LedgerStatus::Idle,
            started_at: None,
            started_at_ms: None,
            ended_at: None,
            ended_at_ms: None,
            duration_ms: None,
            errors: None,
            warnings: None,
            messages: Vec::new(),
        }
    }

    pub fn compiling(started_at_ms: u64) -> Self {
        Self {
            status: LedgerStatus::Compiling,
            started_at: Some(rfc3339_from_millis(started_at_ms)),
            started_at_ms: Some(started_at_ms),
            ..Self::idle()
        }
    }

    /// Terminal record. `ended_at_ms` is clamped so the duration is never negative.
    pub fn complete(started_at_ms: u64, ended_at_ms: u64, summary: &CompileSummary) -> Self {
        let ended_at_ms = ended_at_ms.max(started_at_ms);
        Self {
            status: LedgerStatus::Complete,
            started_at: Some(rfc3339_from_millis(started_at_ms)),
            started_at_ms: Some(started_at_ms),
            ended_at: Some(rfc3339_from_millis(ended_at_ms)),
            ended_at_ms: Some(ended_at_ms),
            duration_ms: Some(ended_at_ms - started_at_ms),
            errors: Some(summary.errors()),
            warnings: Some(summary.warnings()),
            messages: summary.diagnostics.clone(),
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, LedgerError> {
        let record: LedgerRecord = serde_json::from_slice(bytes)?;
        if let (Some(start), Some(end)) = (record.started_at_ms, record.ended_at_ms) {
            if end < start {
                return Err(LedgerError::InvalidRecord(format!(
                    "endedAtMs {end} precedes startedAtMs {start}"
                )));
            }
        }
        Ok(record)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// What a single `observe` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerTransition {
    Unchanged,
    Started { started_at_ms: u64 },
    Finished(LedgerRecord),
}

enum LedgerState {
    Idle,
    Compiling {
        handle: Option<Box<dyn LedgerHandle>>,
        started_at_ms: u64,
    },
}

/// Host-side writer. Owned by the runtime and driven from the affinity thread.
pub struct CompilationLedger {
    path: PathBuf,
    provider: Arc<dyn LockProvider>,
    state: LedgerState,
}

impl CompilationLedger {
    pub fn new(path: impl Into<PathBuf>, provider: Arc<dyn LockProvider>) -> Self {
        Self {
            path: path.into(),
            provider,
            state: LedgerState::Idle,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_compiling(&self) -> bool {
        matches!(self.state, LedgerState::Compiling { .. })
    }

    /// Prepare the ledger at host start: create an idle record when none exists and
    /// reset a `compiling` record nobody holds a lock on (its host died mid-compile).
    pub fn recover_stale(&self) -> Result<bool, LedgerError> {
        let existing = self.provider.read(&self.path)?;
        let stale = match existing {
            None => {
                self.provider
                    .write_unlocked(&self.path, &LedgerRecord::idle().to_bytes()?)?;
                return Ok(false);
            }
            Some(bytes) => match LedgerRecord::parse(&bytes) {
                Ok(record) => record.status == LedgerStatus::Compiling,
                Err(e) => {
                    warn!(error = %e, path = ?self.path, "Unreadable ledger record; resetting");
                    true
                }
            },
        };
        if stale && !self.provider.is_locked(&self.path)? {
            warn!(path = ?self.path, "Stale compiling record without a lock holder; resetting to idle");
            self.provider
                .write_unlocked(&self.path, &LedgerRecord::idle().to_bytes()?)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Feed one level-triggered probe. Writes happen only on transitions.
    pub fn observe<F>(
        &mut self,
        probe: CompileProbe,
        summary: F,
    ) -> Result<LedgerTransition, LedgerError>
    where
        F: FnOnce() -> CompileSummary,
    {
        match (self.is_compiling(), probe) {
            (false, CompileProbe::Compiling) => self.begin(),
            (true, CompileProbe::Idle) => self.end(summary()),
            _ => Ok(LedgerTransition::Unchanged),
        }
    }

    fn begin(&mut self) -> Result<LedgerTransition, LedgerError> {
        let started_at_ms = now_millis();
        let handle = match self.provider.try_acquire(&self.path)? {
            Some(mut handle) => {
                handle.write_record(&LedgerRecord::compiling(started_at_ms).to_bytes()?)?;
                Some(handle)
            }
            None => {
                warn!(path = ?self.path, "Ledger already locked at compile start; tracking in memory only");
                None
            }
        };
        self.state = LedgerState::Compiling {
            handle,
            started_at_ms,
        };
        info!(started_at_ms, "Compile started");
        Ok(LedgerTransition::Started { started_at_ms })
    }

    fn end(&mut self, summary: CompileSummary) -> Result<LedgerTransition, LedgerError> {
        let previous = std::mem::replace(&mut self.state, LedgerState::Idle);
        let LedgerState::Compiling {
            handle,
            started_at_ms: remembered,
        } = previous
        else {
            return Ok(LedgerTransition::Unchanged);
        };

        let started_at_ms = match handle {
            Some(mut handle) => {
                let started = handle
                    .read_back()
                    .ok()
                    .and_then(|bytes| LedgerRecord::parse(&bytes).ok())
                    .and_then(|record| record.started_at_ms)
                    .unwrap_or(remembered);
                if let Err(e) = handle.release() {
                    warn!(error = %e, path = ?self.path, "Failed to release ledger lock cleanly");
                }
                started
            }
            None => remembered,
        };

        let record = LedgerRecord::complete(started_at_ms, now_millis(), &summary);
        self.provider.write_unlocked(&self.path, &record.to_bytes()?)?;
        info!(
            duration_ms = record.duration_ms.unwrap_or(0),
            errors = record.errors.unwrap_or(0),
            warnings = record.warnings.unwrap_or(0),
            "Compile finished"
        );
        Ok(LedgerTransition::Finished(record))
    }

    /// Release a held lock on host shutdown and leave an idle record behind.
    pub fn shutdown(&mut self) -> Result<(), LedgerError> {
        if let LedgerState::Compiling { handle, .. } =
            std::mem::replace(&mut self.state, LedgerState::Idle)
        {
            if let Some(handle) = handle {
                if let Err(e) = handle.release() {
                    warn!(error = %e, "Failed to release ledger lock on shutdown");
                }
            }
            self.provider
                .write_unlocked(&self.path, &LedgerRecord::idle().to_bytes()?)?;
            debug!("Ledger reset to idle on shutdown");
        }
        Ok(())
    }
}

/// Client-side view of the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerObservation {
    Missing,
    Unreadable(String),
    Record { record: LedgerRecord, locked: bool },
}

impl LedgerObservation {
    /// Whether this observation shows the host busy compiling.
    pub fn shows_compiling(&self) -> bool {
        match self {
            LedgerObservation::Record { record, locked } => {
                *locked || record.status == LedgerStatus::Compiling
            }
            _ => false,
        }
    }
}

/// Read-only access used by external processes: read and probe the lock, never write.
#[derive(Clone)]
pub struct LedgerReader {
    path: PathBuf,
    provider: Arc<dyn LockProvider>,
}

impl LedgerReader {
    pub fn new(path: impl Into<PathBuf>, provider: Arc<dyn LockProvider>) -> Self {
        Self {
            path: path.into(),
            provider,
        }
    }

    pub fn observe(&self) -> LedgerObservation {
        let locked = match self.provider.is_locked(&self.path) {
            Ok(locked) => locked,
            Err(e) => return LedgerObservation::Unreadable(e.to_string()),
        };
        match self.provider.read(&self.path) {
            Ok(None) => LedgerObservation::Missing,
            Ok(Some(bytes)) => match LedgerRecord::parse(&bytes) {
                Ok(record) => LedgerObservation::Record { record, locked },
                Err(e) => LedgerObservation::Unreadable(e.to_string()),
            },
            Err(e) => LedgerObservation::Unreadable(e.to_string()),
        }
    }
}
