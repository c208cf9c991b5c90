//! Queue Ingestor
//!
//! Discovers request files in the queue directory, probes each one for readiness, and
//! hands ready files to the affinity dispatcher. Both the startup sweep and watcher
//! notifications go through [`QueueIngestor::handle_file`]. Processing (parse, execute,
//! archive, transcript, response) runs later on the affinity thread.

use crate::archive::{Archive, ResponseStore};
use crate::config::HostConfig;
use crate::dispatch::DispatchHandle;
use crate::error::{DispatchError, QueueError};
use crate::executor::{BatchExecutor, BatchTranscript};
use crate::host::HostOperations;
use crate::request::Request;
use crate::types::CorrelationId;
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

pub mod watch;

pub use watch::QueueWatcher;

/// Result of offering one file to the ingestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// Handed to the dispatcher.
    Enqueued,
    /// Still being written (or locked by someone else); retried on the next scan.
    NotReady,
    /// Already enqueued and waiting for a drain.
    InFlight,
    /// Not a request file (wrong extension, dot-file, directory, or gone).
    Ignored,
}

/// Counts for one sweep of the queue directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub enqueued: usize,
    pub not_ready: usize,
    pub in_flight: usize,
}

struct Inner<H> {
    queue_dir: PathBuf,
    dispatch: DispatchHandle<H>,
    archive: Archive,
    responses: ResponseStore,
    executor: BatchExecutor,
    in_flight: Mutex<HashSet<PathBuf>>,
}

/// Cloneable; the watcher thread and the runtime share one ingestor.
pub struct QueueIngestor<H> {
    inner: Arc<Inner<H>>,
    incomplete_grace: Duration,
}

impl<H> Clone for QueueIngestor<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            incomplete_grace: self.incomplete_grace,
        }
    }
}

/// Candidate request files: `*.json`, not dot-prefixed.
pub fn is_candidate(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return false;
    };
    !name.starts_with('.') && name.ends_with(".json")
}

/// Non-blocking readiness probe: the file opens and takes an exclusive lock.
pub fn probe_ready(path: &Path) -> Result<bool, QueueError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => {
            FileExt::unlock(&file)?;
            Ok(true)
        }
        Err(e)
            if e.kind() == ErrorKind::WouldBlock
                || e.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
        {
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Correlation id embedded in a client-written name: `<timestampMs>-<projectId>-<id>.json`.
fn correlation_from_file_name(path: &Path) -> Option<CorrelationId> {
    let stem = path.file_stem()?.to_str()?;
    let mut parts = stem.splitn(3, '-');
    let timestamp = parts.next()?;
    let _project = parts.next()?;
    let id = parts.next()?;
    if timestamp.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit()) || id.is_empty() {
        return None;
    }
    Some(CorrelationId::from(id.to_string()))
}

impl<H: HostOperations + 'static> QueueIngestor<H> {
    pub fn new(
        queue_dir: impl Into<PathBuf>,
        dispatch: DispatchHandle<H>,
        archive: Archive,
        responses: ResponseStore,
        executor: BatchExecutor,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue_dir: queue_dir.into(),
                dispatch,
                archive,
                responses,
                executor,
                in_flight: Mutex::new(HashSet::new()),
            }),
            incomplete_grace: HostConfig::default().incomplete_grace(),
        }
    }

    /// Age after which a truncated request file stops counting as "still being written".
    pub fn with_incomplete_grace(mut self, grace: Duration) -> Self {
        self.incomplete_grace = grace;
        self
    }

    pub fn queue_dir(&self) -> &Path {
        &self.inner.queue_dir
    }

    /// Number of files enqueued but not yet processed.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    /// Offer every candidate in the queue directory, in lexical file-name order.
    pub fn sweep(&self) -> Result<SweepReport, QueueError> {
        let mut report = SweepReport::default();
        if !self.inner.queue_dir.exists() {
            return Ok(report);
        }

        let mut candidates = Vec::new();
        for entry in WalkDir::new(&self.inner.queue_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                QueueError::IoError(std::io::Error::new(ErrorKind::Other, e.to_string()))
            })?;
            if entry.file_type().is_file() && is_candidate(entry.path()) {
                candidates.push(entry.into_path());
            }
        }

        for path in candidates {
            match self.handle_file(&path)? {
                Ingest::Enqueued => report.enqueued += 1,
                Ingest::NotReady => report.not_ready += 1,
                Ingest::InFlight => report.in_flight += 1,
                Ingest::Ignored => {}
            }
        }
        if report.enqueued > 0 || report.not_ready > 0 {
            debug!(
                enqueued = report.enqueued,
                not_ready = report.not_ready,
                in_flight = report.in_flight,
                "Queue sweep"
            );
        }
        Ok(report)
    }

    /// Per-file handler shared by the sweep and the watcher.
    pub fn handle_file(&self, path: &Path) -> Result<Ingest, QueueError> {
        if !is_candidate(path) || !path.is_file() {
            return Ok(Ingest::Ignored);
        }
        if self.inner.in_flight.lock().contains(path) {
            return Ok(Ingest::InFlight);
        }
        if !probe_ready(path)? {
            debug!(path = ?path, "Request file not ready; will retry on next scan");
            return Ok(Ingest::NotReady);
        }

        // Claim before enqueueing so a concurrent scan cannot double-enqueue.
        if !self.inner.in_flight.lock().insert(path.to_path_buf()) {
            return Ok(Ingest::InFlight);
        }

        let ingestor = self.clone();
        let owned = path.to_path_buf();
        let label = owned
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let enqueued = self
            .inner
            .dispatch
            .enqueue(label, move |host: &mut H| ingestor.process(host, &owned));
        if let Err(e) = enqueued {
            self.inner.in_flight.lock().remove(path);
            return Err(e.into());
        }
        Ok(Ingest::Enqueued)
    }

    /// Affinity-thread half: parse, execute, archive, publish.
    fn process(&self, host: &mut H, path: &Path) -> Result<(), DispatchError> {
        let result = self.process_inner(host, path);
        self.inner.in_flight.lock().remove(path);
        result
    }

    fn process_inner(&self, host: &mut H, path: &Path) -> Result<(), DispatchError> {
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string());
        let policy = self.inner.executor.policy();

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = ?path, "Request file vanished before processing");
                return Ok(());
            }
            Err(e) => {
                return Err(DispatchError::ItemFailed(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let mut transcript = match Request::parse(&bytes) {
            Ok(mut request) => {
                if request.correlation_id.is_none() {
                    request.correlation_id = correlation_from_file_name(path);
                }
                self.inner.executor.execute(host, &request, source)
            }
            // Advisory locks do not stop a writer that never locks: a body that ends
            // early is treated as not ready until it has sat unchanged for the grace.
            Err(e) if e.is_eof() && !self.past_incomplete_grace(path) => {
                debug!(path = ?path, "Request file incomplete; will retry on next scan");
                return Ok(());
            }
            Err(e) => {
                let malformed = QueueError::MalformedRequest {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                };
                warn!(error = %malformed, "Malformed request; archiving without execution");
                BatchTranscript::rejected(source, policy, malformed.to_string())
            }
        };
        if transcript.correlation_id.is_none() {
            transcript.correlation_id = correlation_from_file_name(path);
        }

        info!(
            correlation_id = transcript.correlation_id.as_ref().map(|c| c.as_str()).unwrap_or("-"),
            succeeded = transcript.succeeded,
            failed = transcript.failed,
            skipped = transcript.skipped,
            saved = transcript.saved,
            "Request processed"
        );

        let archived = match self.inner.archive.move_in(path) {
            Ok(archived) => archived,
            Err(e) => {
                // Left in place; the next sweep retries it.
                error!(error = %e, "Failed to archive request; file left in queue");
                return Err(DispatchError::ItemFailed(e.to_string()));
            }
        };

        if let Err(e) = self.inner.archive.write_transcript(&archived, &transcript) {
            warn!(error = %e, archived = ?archived, "Failed to write transcript");
        }
        if let Some(correlation_id) = transcript.correlation_id.as_ref() {
            if let Err(e) = self.inner.responses.write(correlation_id, &transcript) {
                warn!(error = %e, correlation_id = %correlation_id, "Failed to write response");
            }
        }
        Ok(())
    }

    fn past_incomplete_grace(&self, path: &Path) -> bool {
        if self.incomplete_grace.is_zero() {
            return true;
        }
        std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .map(|age| age >= self.incomplete_grace)
            .unwrap_or(false)
    }
}
