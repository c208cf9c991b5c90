//! Error types for the Ferry command bus.

use std::path::PathBuf;
use thiserror::Error;

/// Affinity dispatcher errors
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Dispatcher is closed; work item rejected")]
    Closed,

    #[error("Work item failed: {0}")]
    ItemFailed(String),

    #[error("Work item panicked: {0}")]
    ItemPanicked(String),
}

/// Host domain operation errors
#[derive(Debug, Error)]
pub enum HostError {
    #[error("{kind} '{name}' not found; available: {}", format_available(.available))]
    NotFound {
        kind: &'static str,
        name: String,
        available: Vec<String>,
    },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("No active context; open or create one first")]
    NoActiveContext,

    #[error("Host rejected operation: {0}")]
    Rejected(String),
}

fn format_available(available: &[String]) -> String {
    if available.is_empty() {
        "(none)".to_string()
    } else {
        available.join(", ")
    }
}

/// Per-command errors, isolated to a single command in a batch
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Unknown action '{action}'; known actions: {}", .known.join(", "))]
    UnknownAction { action: String, known: Vec<String> },

    #[error("Command is missing the 'action' tag")]
    MissingAction,

    #[error("Invalid fields for '{action}': {message}")]
    InvalidFields { action: String, message: String },

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Request queue and archive errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Malformed request {path:?}: {message}")]
    MalformedRequest { path: PathBuf, message: String },

    #[error("Failed to archive {path:?}: {source}")]
    ArchiveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to watch queue directory {path:?}: {message}")]
    WatchFailed { path: PathBuf, message: String },

    #[error("Queue I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Compilation ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger {0:?} is locked by another holder")]
    Locked(PathBuf),

    #[error("Ledger record is invalid: {0}")]
    InvalidRecord(String),

    #[error("Ledger I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// External client errors (usage/internal; exit code 3)
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid request file {path:?}: {message}")]
    InvalidRequest { path: PathBuf, message: String },

    #[error("Failed to wake host: {0}")]
    WakeFailed(String),

    #[error("Client I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Crate-level error, surfaced by the runtime and the CLI
#[derive(Debug, Error)]
pub enum FerryError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<config::ConfigError> for FerryError {
    fn from(err: config::ConfigError) -> Self {
        FerryError::ConfigError(err.to_string())
    }
}
