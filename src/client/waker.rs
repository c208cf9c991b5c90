//! Out-of-band nudges that bring the host to the foreground so its tick loop runs.

use crate::error::ClientError;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use tracing::{debug, warn};

pub trait HostWaker: Send + Sync {
    fn wake(&self) -> Result<(), ClientError>;
}

/// Used when no wake command is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWaker;

impl HostWaker for NoopWaker {
    fn wake(&self) -> Result<(), ClientError> {
        Ok(())
    }
}

/// Spawns a shell command and does not wait for it.
#[derive(Debug, Clone)]
pub struct CommandWaker {
    command: String,
}

impl CommandWaker {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl CommandWaker {
    /// Spawn the command and wait for it on a background thread so it is reaped.
    fn spawn_reaped(&self) -> Result<JoinHandle<Option<ExitStatus>>, ClientError> {
        let mut shell = if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C");
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c");
            cmd
        };
        let mut child = shell
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ClientError::WakeFailed(format!("{}: {}", self.command, e)))?;
        debug!(pid = child.id(), command = %self.command, "Wake command spawned");

        std::thread::Builder::new()
            .name("ferry-wake-reaper".to_string())
            .spawn(move || match child.wait() {
                Ok(status) => {
                    debug!(%status, "Wake command exited");
                    Some(status)
                }
                Err(e) => {
                    warn!(error = %e, "Failed to wait for wake command");
                    None
                }
            })
            .map_err(|e| ClientError::WakeFailed(format!("reaper thread: {}", e)))
    }
}

impl HostWaker for CommandWaker {
    fn wake(&self) -> Result<(), ClientError> {
        self.spawn_reaped().map(|_| ())
    }
}

/// Waker for an optional configured command.
pub fn from_config(command: Option<&str>) -> Box<dyn HostWaker> {
    match command.map(str::trim).filter(|c| !c.is_empty()) {
        Some(command) => Box::new(CommandWaker::new(command)),
        None => Box::new(NoopWaker),
    }
}
