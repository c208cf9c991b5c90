//! Batch Executor
//!
//! Applies one request's ordered command list against the host. A failing command is
//! isolated under the default policy; only an unusable target context is fatal for the
//! whole request. Context changes are saved once at the end of a successful batch, so a
//! crash mid-batch loses the uncommitted effects.

use crate::error::CommandError;
use crate::host::HostOperations;
use crate::request::{Command, RawCommand, Request};
use crate::types::{now_millis, rfc3339_from_millis, CorrelationId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What to do with the remaining commands after one fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Continue,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// Per-command transcript line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome {
    pub index: usize,
    pub action: String,
    pub status: CommandStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignored_fields: Vec<String>,
    pub duration_ms: u64,
    pub input: Value,
}

/// Full record of one executed request, written next to the archived file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTranscript {
    #[serde(default)]
    pub correlation_id: Option<CorrelationId>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    pub policy: FailurePolicy,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
    /// Set when the request could not run at all.
    #[serde(default)]
    pub fatal: Option<String>,
    pub saved: bool,
    #[serde(default)]
    pub save_error: Option<String>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub commands: Vec<CommandOutcome>,
}

impl BatchTranscript {
    /// Transcript for a request that was rejected before execution.
    pub fn rejected(source: Option<String>, policy: FailurePolicy, reason: String) -> Self {
        let now = now_millis();
        Self {
            correlation_id: None,
            source,
            context: None,
            policy,
            started_at: rfc3339_from_millis(now),
            ended_at: rfc3339_from_millis(now),
            duration_ms: 0,
            fatal: Some(reason),
            saved: false,
            save_error: None,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            commands: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.commands.len()
    }

    /// True when nothing fatal happened and every command succeeded.
    pub fn is_clean(&self) -> bool {
        self.fatal.is_none() && self.save_error.is_none() && self.failed == 0 && self.skipped == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchExecutor {
    policy: FailurePolicy,
}

impl BatchExecutor {
    pub fn new(policy: FailurePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Run a request to completion against the host. Never panics on bad input.
    pub fn execute<H: HostOperations + ?Sized>(
        &self,
        host: &mut H,
        request: &Request,
        source: Option<String>,
    ) -> BatchTranscript {
        let started_ms = now_millis();
        let clock = Instant::now();
        let mut transcript = BatchTranscript {
            correlation_id: request.correlation_id.clone(),
            source,
            context: request.context.clone(),
            policy: self.policy,
            started_at: rfc3339_from_millis(started_ms),
            ended_at: String::new(),
            duration_ms: 0,
            fatal: None,
            saved: false,
            save_error: None,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            commands: Vec::with_capacity(request.commands.len()),
        };

        if let Some(context) = request.context.as_deref() {
            if let Err(reason) = prepare_context(host, context) {
                warn!(context, error = %reason, "Target context unavailable; request abandoned");
                transcript.fatal = Some(reason);
                return finish(transcript, started_ms, clock);
            }
        }

        let mut aborted = false;
        for (index, raw) in request.commands.iter().enumerate() {
            if aborted {
                transcript.skipped += 1;
                transcript.commands.push(CommandOutcome {
                    index,
                    action: raw.action().unwrap_or("?").to_string(),
                    status: CommandStatus::Skipped,
                    message: "skipped after earlier failure".to_string(),
                    ignored_fields: Vec::new(),
                    duration_ms: 0,
                    input: Value::Object(raw.0.clone()),
                });
                continue;
            }

            let outcome = run_command(host, index, raw);
            match outcome.status {
                CommandStatus::Succeeded => transcript.succeeded += 1,
                _ => {
                    transcript.failed += 1;
                    warn!(index, action = %outcome.action, error = %outcome.message, "Command failed");
                    if self.policy == FailurePolicy::Abort {
                        aborted = true;
                    }
                }
            }
            transcript.commands.push(outcome);
        }

        if aborted {
            info!("Batch aborted; pending changes left unsaved");
        } else {
            match host.save() {
                Ok(()) => transcript.saved = true,
                Err(e) => {
                    warn!(error = %e, "Save after batch failed");
                    transcript.save_error = Some(e.to_string());
                }
            }
        }

        finish(transcript, started_ms, clock)
    }
}

fn prepare_context<H: HostOperations + ?Sized>(host: &mut H, context: &str) -> Result<(), String> {
    if host.context_exists(context) {
        host.open_context(context)
            .map_err(|e| format!("cannot open context '{context}': {e}"))
    } else {
        host.create_context(context)
            .map_err(|e| format!("cannot create context '{context}': {e}"))
    }
}

fn run_command<H: HostOperations + ?Sized>(
    host: &mut H,
    index: usize,
    raw: &RawCommand,
) -> CommandOutcome {
    let clock = Instant::now();
    let input = Value::Object(raw.0.clone());
    let (action, ignored_fields, result) = match raw.decode() {
        Ok(decoded) => {
            let action = decoded.command.action().to_string();
            if !decoded.ignored_fields.is_empty() {
                debug!(index, action = %action, ignored = ?decoded.ignored_fields, "Ignoring unrelated fields");
            }
            let result = apply(host, &decoded.command);
            (action, decoded.ignored_fields, result)
        }
        Err(e) => (
            raw.action().unwrap_or("?").to_string(),
            Vec::new(),
            Err(e),
        ),
    };

    let (status, message) = match result {
        Ok(message) => (CommandStatus::Succeeded, message),
        Err(e) => (CommandStatus::Failed, e.to_string()),
    };
    CommandOutcome {
        index,
        action,
        status,
        message,
        ignored_fields,
        duration_ms: clock.elapsed().as_millis() as u64,
        input,
    }
}

fn apply<H: HostOperations + ?Sized>(host: &mut H, command: &Command) -> Result<String, CommandError> {
    match command {
        Command::CreateContext { name } => {
            host.create_context(name)?;
            Ok(format!("created context '{name}'"))
        }
        Command::OpenContext { name } => {
            host.open_context(name)?;
            Ok(format!("opened context '{name}'"))
        }
        Command::AddWidget { name, kind, parent } => {
            let parent = host.add_widget(name, kind, parent.as_deref())?;
            Ok(format!("added {kind} '{name}' under '{parent}'"))
        }
        Command::RemoveWidget { name } => {
            host.remove_widget(name)?;
            Ok(format!("removed '{name}'"))
        }
        Command::RenameWidget { name, new_name } => {
            host.rename_widget(name, new_name)?;
            Ok(format!("renamed '{name}' to '{new_name}'"))
        }
        Command::SetProperty {
            target,
            property,
            value,
        } => {
            host.set_property(target, property, value)?;
            Ok(format!("set {target}.{property}"))
        }
        Command::Compile => {
            host.request_compile()?;
            Ok("compile requested".to_string())
        }
    }
}

fn finish(mut transcript: BatchTranscript, started_ms: u64, clock: Instant) -> BatchTranscript {
    let elapsed = clock.elapsed().as_millis() as u64;
    transcript.ended_at = rfc3339_from_millis(started_ms + elapsed);
    transcript.duration_ms = elapsed;
    info!(
        succeeded = transcript.succeeded,
        failed = transcript.failed,
        skipped = transcript.skipped,
        saved = transcript.saved,
        "Batch finished"
    );
    transcript
}
