//! External Client Protocol
//!
//! Runs in a separate process from the host. One invocation: resolve the project id,
//! write a request file into the queue (temp file, then rename), nudge the host, then
//! poll the ledger until a terminal record answers this call or the budget runs out.

mod project;
mod report;
mod tracker;
mod waker;

pub use project::load_or_create as load_or_create_project_id;
pub use report::{ClientReport, Verdict};
pub use tracker::{PollDecision, PollTracker};
pub use waker::{from_config as waker_from_config, CommandWaker, HostWaker, NoopWaker};

use crate::archive::ResponseStore;
use crate::config::{ClientConfig, FerryConfig, ResolvedPaths};
use crate::error::ClientError;
use crate::executor::BatchTranscript;
use crate::ledger::{FsLockProvider, LedgerObservation, LedgerReader, LedgerRecord, LockProvider};
use crate::request::{RawCommand, Request};
use crate::types::{now_millis, CorrelationId};
use serde_json::Map;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-invocation knobs, usually taken from [`ClientConfig`] plus CLI overrides.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub grace: Duration,
    pub nudge_retries: u32,
    pub include_warnings: bool,
}

impl From<&ClientConfig> for ClientOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            grace: Duration::from_millis(config.grace_ms),
            nudge_retries: config.nudge_retries,
            include_warnings: false,
        }
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

/// A request that has been published into the queue.
#[derive(Debug, Clone)]
pub struct Submission {
    pub correlation_id: CorrelationId,
    pub submitted_at_ms: u64,
    pub path: PathBuf,
}

pub struct ExternalClient {
    workspace_root: PathBuf,
    paths: ResolvedPaths,
    reader: LedgerReader,
    responses: ResponseStore,
    waker: Box<dyn HostWaker>,
    options: ClientOptions,
}

impl ExternalClient {
    pub fn new(workspace_root: impl Into<PathBuf>, config: &FerryConfig) -> Self {
        Self::with_lock_provider(workspace_root, config, Arc::new(FsLockProvider))
    }

    pub fn with_lock_provider(
        workspace_root: impl Into<PathBuf>,
        config: &FerryConfig,
        provider: Arc<dyn LockProvider>,
    ) -> Self {
        let workspace_root = workspace_root.into();
        let paths = config.paths.resolve(&workspace_root);
        Self {
            reader: LedgerReader::new(paths.ledger_file.clone(), provider),
            responses: ResponseStore::new(paths.responses_dir.clone()),
            waker: waker_from_config(config.client.wake_command.as_deref()),
            options: ClientOptions::from(&config.client),
            workspace_root,
            paths,
        }
    }

    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_waker(mut self, waker: Box<dyn HostWaker>) -> Self {
        self.waker = waker;
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn paths(&self) -> &ResolvedPaths {
        &self.paths
    }

    /// Current ledger state, for `ferry ledger`.
    pub fn observe_ledger(&self) -> LedgerObservation {
        self.reader.observe()
    }

    /// Publish a request into the queue. Missing envelope fields are filled in.
    pub fn submit(&self, mut request: Request) -> Result<Submission, ClientError> {
        let project_id =
            project::load_or_create(&self.paths.project_id_file, &self.workspace_root)?;
        let correlation_id = request
            .correlation_id
            .get_or_insert_with(CorrelationId::generate)
            .clone();
        let submitted_at_ms = *request.timestamp_ms.get_or_insert_with(now_millis);
        if request.project_id.is_none() {
            request.project_id = Some(project_id.clone());
        }

        fs::create_dir_all(&self.paths.queue_dir)?;
        let name = format!("{}-{}-{}.json", submitted_at_ms, project_id, correlation_id);
        let temp = self.paths.queue_dir.join(format!(".{}.tmp", name));
        let path = self.paths.queue_dir.join(&name);
        fs::write(&temp, serde_json::to_vec_pretty(&request)?)?;
        fs::rename(&temp, &path)?;

        debug!(path = ?path, correlation_id = %correlation_id, "Request submitted");
        Ok(Submission {
            correlation_id,
            submitted_at_ms,
            path,
        })
    }

    /// Read a request file written by hand and submit it.
    pub fn submit_file(&self, file: &Path) -> Result<Submission, ClientError> {
        let bytes = fs::read(file)?;
        let request = Request::parse(&bytes).map_err(|e| ClientError::InvalidRequest {
            path: file.to_path_buf(),
            message: e.to_string(),
        })?;
        if request.commands.is_empty() && request.context.is_none() {
            return Err(ClientError::InvalidRequest {
                path: file.to_path_buf(),
                message: "request has no commands".to_string(),
            });
        }
        self.submit(request)
    }

    /// Trigger a compile and wait for its verdict.
    pub async fn compile(&self) -> Result<ClientReport, ClientError> {
        let submission = self.submit(Request::new(vec![RawCommand::new("compile", Map::new())]))?;
        info!(correlation_id = %submission.correlation_id, "Compile requested");
        self.nudge();

        let mut tracker = PollTracker::new(submission.submitted_at_ms, self.options.grace);
        let polled = tokio::time::timeout(
            self.options.timeout,
            self.poll_until_terminal(&mut tracker, &submission.path),
        )
        .await;

        match polled {
            Ok(record) => {
                let mut report = ClientReport::from_record(&record, self.options.include_warnings);
                if tracker.accepted_stale() {
                    report.details.push(
                        "no compile observed for this request; reporting the last completed compile"
                            .to_string(),
                    );
                }
                Ok(report)
            }
            Err(_) => Ok(self.timeout_report(&tracker, &submission)),
        }
    }

    async fn poll_until_terminal(&self, tracker: &mut PollTracker, request_path: &Path) -> LedgerRecord {
        let windows = self.options.nudge_retries.saturating_add(1);
        let window = self.options.timeout / windows;
        let mut nudges_left = self.options.nudge_retries;
        let mut window_start = Instant::now();

        loop {
            let observation = self.reader.observe();
            if let PollDecision::Done(record) = tracker.observe(&observation, Instant::now()) {
                return record;
            }

            let activity = tracker.seen_compiling() || !request_path.exists();
            if !activity && nudges_left > 0 && window_start.elapsed() >= window {
                nudges_left -= 1;
                window_start = Instant::now();
                info!(remaining = nudges_left, "No host activity yet; nudging again");
                self.nudge();
            }

            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    fn nudge(&self) {
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "Wake nudge failed");
        }
    }

    fn timeout_report(&self, tracker: &PollTracker, submission: &Submission) -> ClientReport {
        let budget = self.options.timeout.as_secs_f64();
        let mut details = Vec::new();
        match self.reader.observe() {
            LedgerObservation::Record { locked: true, .. } => details.push(format!(
                "could not confirm: ledger still locked by a compile after {:.1}s",
                budget
            )),
            _ if tracker.seen_compiling() => details.push(format!(
                "could not confirm: compile started but no terminal record within {:.1}s",
                budget
            )),
            _ if submission.path.exists() => details.push(format!(
                "request not picked up within {:.1}s; is the host running?",
                budget
            )),
            _ => details.push(format!(
                "request consumed but no compile observed within {:.1}s",
                budget
            )),
        }
        details.push(format!("correlation id: {}", submission.correlation_id));
        ClientReport::timeout(details)
    }

    /// Poll for the response artifact of one request.
    pub async fn wait_for_response(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Option<BatchTranscript>, ClientError> {
        let deadline = Instant::now() + self.options.timeout;
        loop {
            match self.responses.read::<BatchTranscript>(correlation_id) {
                Ok(Some(transcript)) => return Ok(Some(transcript)),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Response not readable yet"),
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }
}
