//! Shared types: timestamps, correlation tokens, project identifiers.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as milliseconds since Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// RFC 3339 timestamp with millisecond precision for the given epoch milliseconds.
pub fn rfc3339_from_millis(ms: u64) -> String {
    match Utc.timestamp_millis_opt(ms as i64).single() {
        Some(ts) => ts.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

/// Compact, lexically sortable timestamp used to qualify archive names.
pub fn archive_stamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%S%.3fZ").to_string()
}

/// Identifier tying one external invocation to its request and response artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh random correlation token.
    pub fn generate() -> Self {
        CorrelationId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        CorrelationId(value)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable project identifier derived from the workspace location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    const LEN: usize = 16;

    /// Derive an identifier from a workspace path (BLAKE3 of the canonical path).
    pub fn derive(workspace_root: &Path) -> Self {
        let canonical = dunce::canonicalize(workspace_root)
            .unwrap_or_else(|_| workspace_root.to_path_buf());
        let digest = blake3::hash(canonical.to_string_lossy().as_bytes());
        let mut id = hex::encode(digest.as_bytes());
        id.truncate(Self::LEN);
        ProjectId(id)
    }

    /// Parse an identifier previously written to disk.
    ///
    /// `-` is rejected: it separates the fields of a request file name.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let valid = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        valid.then(|| ProjectId(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
