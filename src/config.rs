//! Configuration System
//!
//! Layered configuration for host and client: built-in defaults, the global config
//! file, workspace files under `.ferry/`, then `FERRY__*` environment variables.
//! Well-known queue/archive/ledger paths are part of the host/client contract and live
//! here rather than in code.

use crate::error::FerryError;
use crate::executor::FailurePolicy;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod facade;
mod merge {
    pub mod merge_policy;
}
mod sources {
    pub mod global_file;
    pub mod workspace_file;
}

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FerryConfig {
    /// Well-known locations shared by host and client
    #[serde(default)]
    pub paths: PathsConfig,

    /// Host loop settings
    #[serde(default)]
    pub host: HostConfig,

    /// External client settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Queue, archive, response, and ledger locations, relative to the workspace root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_queue_dir")]
    pub queue_dir: PathBuf,
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
    #[serde(default = "default_responses_dir")]
    pub responses_dir: PathBuf,
    #[serde(default = "default_ledger_file")]
    pub ledger_file: PathBuf,
    #[serde(default = "default_project_id_file")]
    pub project_id_file: PathBuf,
}

fn default_queue_dir() -> PathBuf {
    PathBuf::from(".ferry/queue")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from(".ferry/archive")
}

fn default_responses_dir() -> PathBuf {
    PathBuf::from(".ferry/responses")
}

fn default_ledger_file() -> PathBuf {
    PathBuf::from(".ferry/compile-status.json")
}

fn default_project_id_file() -> PathBuf {
    PathBuf::from(".ferry/project-id")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            queue_dir: default_queue_dir(),
            archive_dir: default_archive_dir(),
            responses_dir: default_responses_dir(),
            ledger_file: default_ledger_file(),
            project_id_file: default_project_id_file(),
        }
    }
}

/// Absolute locations after joining with a workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub queue_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub responses_dir: PathBuf,
    pub ledger_file: PathBuf,
    pub project_id_file: PathBuf,
}

impl PathsConfig {
    /// Resolve relative entries against the workspace root; absolute entries are kept.
    pub fn resolve(&self, workspace_root: &Path) -> ResolvedPaths {
        let join = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                workspace_root.join(p)
            }
        };
        ResolvedPaths {
            queue_dir: join(&self.queue_dir),
            archive_dir: join(&self.archive_dir),
            responses_dir: join(&self.responses_dir),
            ledger_file: join(&self.ledger_file),
            project_id_file: join(&self.project_id_file),
        }
    }
}

/// Host loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Interval between host ticks (dispatcher drain + compile probe)
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Interval between queue re-sweeps, so skipped files get retried
    #[serde(default = "default_rescan_interval_ms")]
    pub rescan_interval_ms: u64,

    /// Whether one failed command aborts the rest of its batch
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// How long a truncated request file is treated as still being written before it
    /// is archived as malformed
    #[serde(default = "default_incomplete_grace_ms")]
    pub incomplete_grace_ms: u64,
}

fn default_tick_ms() -> u64 {
    100
}

fn default_rescan_interval_ms() -> u64 {
    1000
}

fn default_incomplete_grace_ms() -> u64 {
    30_000
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            rescan_interval_ms: default_rescan_interval_ms(),
            failure_policy: FailurePolicy::default(),
            incomplete_grace_ms: default_incomplete_grace_ms(),
        }
    }
}

impl HostConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn rescan_interval(&self) -> Duration {
        Duration::from_millis(self.rescan_interval_ms)
    }

    pub fn incomplete_grace(&self) -> Duration {
        Duration::from_millis(self.incomplete_grace_ms)
    }
}

/// External client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Overall budget for one invocation
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Ledger poll interval
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a `complete` seen without a prior `compiling` waits before acceptance
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,

    /// Extra wake nudges when a window passes with no observed activity
    #[serde(default = "default_nudge_retries")]
    pub nudge_retries: u32,

    /// Shell command that brings the host to the foreground
    #[serde(default)]
    pub wake_command: Option<String>,
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_grace_ms() -> u64 {
    3000
}

fn default_nudge_retries() -> u32 {
    2
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            grace_ms: default_grace_ms(),
            nudge_retries: default_nudge_retries(),
            wake_command: None,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Paths(String),
    Host(String),
    Client(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Paths(msg) => write!(f, "Paths: {}", msg),
            ValidationError::Host(msg) => write!(f, "Host: {}", msg),
            ValidationError::Client(msg) => write!(f, "Client: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl FerryConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let paths = &self.paths;
        for (name, path) in [
            ("queue_dir", &paths.queue_dir),
            ("archive_dir", &paths.archive_dir),
            ("responses_dir", &paths.responses_dir),
            ("ledger_file", &paths.ledger_file),
            ("project_id_file", &paths.project_id_file),
        ] {
            if path.as_os_str().is_empty() {
                errors.push(ValidationError::Paths(format!("{} cannot be empty", name)));
            }
        }
        if paths.queue_dir == paths.archive_dir {
            errors.push(ValidationError::Paths(
                "archive_dir must differ from queue_dir".to_string(),
            ));
        }

        if self.host.tick_ms == 0 {
            errors.push(ValidationError::Host("tick_ms must be positive".to_string()));
        }
        if self.host.rescan_interval_ms == 0 {
            errors.push(ValidationError::Host(
                "rescan_interval_ms must be positive".to_string(),
            ));
        }

        if self.client.timeout_secs == 0 {
            errors.push(ValidationError::Client(
                "timeout_secs must be positive".to_string(),
            ));
        }
        if self.client.poll_interval_ms == 0 {
            errors.push(ValidationError::Client(
                "poll_interval_ms must be positive".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold all problems into one error.
    pub fn validated(self) -> Result<Self, FerryError> {
        self.validate().map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            FerryError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                msgs.join("\n")
            ))
        })?;
        Ok(self)
    }
}
