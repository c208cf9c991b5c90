//! Stable project identifier, persisted next to the queue.

use crate::error::ClientError;
use crate::types::ProjectId;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

/// Read the stored project id, or derive one from the workspace path and store it.
pub fn load_or_create(path: &Path, workspace_root: &Path) -> Result<ProjectId, ClientError> {
    match fs::read_to_string(path) {
        Ok(raw) => match ProjectId::parse(&raw) {
            Some(id) => return Ok(id),
            None => warn!(path = ?path, "Stored project id is invalid; deriving a new one"),
        },
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let id = ProjectId::derive(workspace_root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("{}\n", id))?;
    debug!(project_id = %id, "Project id stored");
    Ok(id)
}
