//! Archive and response artifacts.
//!
//! Processed request files are renamed into the archive with a timestamp-qualified name.
//! The rename is the single-consumer guarantee: a file can only be moved out of the
//! queue once. Archive entries and their transcripts are written once and never
//! touched again.

use crate::error::QueueError;
use crate::types::{archive_stamp, CorrelationId};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

const TRANSCRIPT_SUFFIX: &str = ".transcript.json";
const MAX_COLLISION_SUFFIX: u32 = 1000;

#[derive(Debug, Clone)]
pub struct Archive {
    dir: PathBuf,
}

impl Archive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Archive name for `original` at `ts`: `<stamp>-<original>`.
    pub fn archived_name(original: &str, ts: DateTime<Utc>) -> String {
        format!("{}-{}", archive_stamp(ts), original)
    }

    /// Move a request file into the archive. Fails if the source is already gone.
    pub fn move_in(&self, path: &Path) -> Result<PathBuf, QueueError> {
        let archive_failed = |source| QueueError::ArchiveFailed {
            path: path.to_path_buf(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(archive_failed)?;

        let original = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "request.json".to_string());
        let target = self.free_target(&original, Utc::now());
        fs::rename(path, &target).map_err(archive_failed)?;
        debug!(from = ?path, to = ?target, "Request archived");
        Ok(target)
    }

    fn free_target(&self, original: &str, ts: DateTime<Utc>) -> PathBuf {
        let stamp = archive_stamp(ts);
        let first = self.dir.join(format!("{stamp}-{original}"));
        if !first.exists() {
            return first;
        }
        (1..MAX_COLLISION_SUFFIX)
            .map(|n| self.dir.join(format!("{stamp}-{n}-{original}")))
            .find(|candidate| !candidate.exists())
            .unwrap_or(first)
    }

    /// Companion transcript path for an archived request.
    pub fn transcript_path(archived: &Path) -> PathBuf {
        let mut name = archived.as_os_str().to_owned();
        name.push(TRANSCRIPT_SUFFIX);
        PathBuf::from(name)
    }

    /// Write the transcript next to an archived request. Never overwrites.
    pub fn write_transcript<T: Serialize>(
        &self,
        archived: &Path,
        transcript: &T,
    ) -> Result<PathBuf, QueueError> {
        let path = Self::transcript_path(archived);
        let bytes = serde_json::to_vec_pretty(transcript)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(path)
    }

    /// Archived request files (transcripts excluded), sorted by name.
    pub fn entries(&self) -> Result<Vec<PathBuf>, QueueError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_transcript = path
                .file_name()
                .map(|n| n.to_string_lossy().ends_with(TRANSCRIPT_SUFFIX))
                .unwrap_or(true);
            if path.is_file() && !is_transcript {
                entries.push(path);
            }
        }
        entries.sort();
        Ok(entries)
    }
}

/// Per-correlation response artifacts written by the host after a batch.
#[derive(Debug, Clone)]
pub struct ResponseStore {
    dir: PathBuf,
}

impl ResponseStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, correlation_id: &CorrelationId) -> PathBuf {
        self.dir.join(format!("{}.json", correlation_id.as_str()))
    }

    /// Publish a response atomically (temp file then rename).
    pub fn write<T: Serialize>(
        &self,
        correlation_id: &CorrelationId,
        response: &T,
    ) -> Result<PathBuf, QueueError> {
        fs::create_dir_all(&self.dir)?;
        let target = self.path_for(correlation_id);
        let temp = self.dir.join(format!(".{}.tmp", correlation_id.as_str()));
        fs::write(&temp, serde_json::to_vec_pretty(response)?)?;
        fs::rename(&temp, &target)?;
        Ok(target)
    }

    /// Read a response if it has been published.
    pub fn read<T: DeserializeOwned>(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Option<T>, QueueError> {
        let path = self.path_for(correlation_id);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
