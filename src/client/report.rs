//! The stdout block and exit code: the only stable client contract.

use crate::executor::{BatchTranscript, CommandStatus};
use crate::host::Severity;
use crate::ledger::LedgerRecord;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Failure,
    Timeout,
    Error,
}

impl Verdict {
    pub fn exit_code(self) -> i32 {
        match self {
            Verdict::Success => 0,
            Verdict::Failure => 1,
            Verdict::Timeout => 2,
            Verdict::Error => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Verdict::Success => "SUCCESS",
            Verdict::Failure => "FAILURE",
            Verdict::Timeout => "TIMEOUT",
            Verdict::Error => "ERROR",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientReport {
    pub verdict: Verdict,
    pub errors: usize,
    pub warnings: usize,
    pub details: Vec<String>,
}

impl ClientReport {
    /// Verdict from a terminal ledger record: success iff zero errors.
    pub fn from_record(record: &LedgerRecord, include_warnings: bool) -> Self {
        let errors = record.errors.unwrap_or(0);
        let details = record
            .messages
            .iter()
            .filter(|d| match d.severity {
                Severity::Error => true,
                Severity::Warning => include_warnings,
                Severity::Info => false,
            })
            .map(|d| {
                let tag = match d.severity {
                    Severity::Error => "error",
                    Severity::Warning => "warning",
                    Severity::Info => "info",
                };
                format!("{}: {}", tag, d.message)
            })
            .collect();
        Self {
            verdict: if errors > 0 {
                Verdict::Failure
            } else {
                Verdict::Success
            },
            errors,
            warnings: record.warnings.unwrap_or(0),
            details,
        }
    }

    /// Verdict for one submitted batch from its response artifact.
    pub fn from_transcript(transcript: &BatchTranscript, include_warnings: bool) -> Self {
        let mut details = Vec::new();
        if let Some(fatal) = &transcript.fatal {
            details.push(format!("fatal: {}", fatal));
        }
        for outcome in &transcript.commands {
            match outcome.status {
                CommandStatus::Failed => details.push(format!(
                    "#{} {} failed: {}",
                    outcome.index, outcome.action, outcome.message
                )),
                CommandStatus::Skipped => {
                    details.push(format!("#{} {} skipped", outcome.index, outcome.action))
                }
                CommandStatus::Succeeded if include_warnings && !outcome.ignored_fields.is_empty() => {
                    details.push(format!(
                        "#{} {} ignored fields: {}",
                        outcome.index,
                        outcome.action,
                        outcome.ignored_fields.join(", ")
                    ))
                }
                CommandStatus::Succeeded => {}
            }
        }
        if let Some(save_error) = &transcript.save_error {
            details.push(format!("save failed: {}", save_error));
        }

        let errors = transcript.failed
            + usize::from(transcript.fatal.is_some())
            + usize::from(transcript.save_error.is_some());
        let warnings = transcript
            .commands
            .iter()
            .filter(|c| !c.ignored_fields.is_empty())
            .count();
        Self {
            verdict: if transcript.is_clean() {
                Verdict::Success
            } else {
                Verdict::Failure
            },
            errors,
            warnings,
            details,
        }
    }

    pub fn timeout(details: Vec<String>) -> Self {
        Self {
            verdict: Verdict::Timeout,
            errors: 0,
            warnings: 0,
            details,
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Error,
            errors: 0,
            warnings: 0,
            details: vec![message.into()],
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.verdict.exit_code()
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "STATUS: {}\nERRORS: {}\nWARNINGS: {}\n",
            self.verdict, self.errors, self.warnings
        );
        if !self.details.is_empty() {
            out.push_str("DETAILS:\n");
            for line in &self.details {
                out.push_str("  ");
                out.push_str(line);
                out.push('\n');
            }
        }
        out.push_str(&format!("SCRIPT_VERSION: {}\n", env!("CARGO_PKG_VERSION")));
        out
    }
}
