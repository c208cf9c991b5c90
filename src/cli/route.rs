//! CLI route: single route table and run context. Dispatches to the runtime and client.

use crate::cli::parse::{Commands, LedgerFormat};
use crate::client::{ClientOptions, ClientReport, ExternalClient};
use crate::config::{ConfigLoader, FerryConfig};
use crate::error::FerryError;
use crate::host::MemoryHost;
use crate::ledger::{LedgerObservation, LedgerStatus};
use crate::runtime::HostRuntime;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info_span};

/// What a command printed and how the process should exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub exit_code: i32,
}

impl CommandOutput {
    fn ok(stdout: String) -> Self {
        Self {
            stdout,
            exit_code: 0,
        }
    }

    fn report(report: &ClientReport) -> Self {
        Self {
            stdout: report.render(),
            exit_code: report.exit_code(),
        }
    }
}

/// Runtime context for CLI execution: workspace and loaded configuration.
pub struct RunContext {
    workspace_root: PathBuf,
    config: FerryConfig,
}

impl RunContext {
    /// Create run context from workspace root and optional config path.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, FerryError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        Ok(Self::with_config(workspace_root, config))
    }

    pub fn with_config(workspace_root: PathBuf, config: FerryConfig) -> Self {
        let workspace_root = dunce::canonicalize(&workspace_root).unwrap_or(workspace_root);
        Self {
            workspace_root,
            config,
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn config(&self) -> &FerryConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<CommandOutput, FerryError> {
        let span = info_span!("command", name = crate::cli::command_name(command));
        let _entered = span.enter();
        debug!(workspace = %self.workspace_root.display(), "Executing command");

        match command {
            Commands::Compile {
                include_warnings,
                timeout,
            } => self.handle_compile(*include_warnings, *timeout),
            Commands::Submit {
                file,
                wait,
                include_warnings,
                timeout,
            } => self.handle_submit(file, *wait, *include_warnings, *timeout),
            Commands::Host {
                max_ticks,
                compile_ticks,
                poll,
            } => self.handle_host(*max_ticks, *compile_ticks, *poll),
            Commands::Ledger { format } => Ok(self.handle_ledger(*format)),
        }
    }

    fn client(&self, include_warnings: bool, timeout: Option<u64>) -> ExternalClient {
        let mut options = ClientOptions::from(&self.config.client);
        options.include_warnings = include_warnings;
        if let Some(secs) = timeout {
            options.timeout = Duration::from_secs(secs);
        }
        ExternalClient::new(&self.workspace_root, &self.config).with_options(options)
    }

    fn block_on<F: std::future::Future>(future: F) -> Result<F::Output, FerryError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        Ok(runtime.block_on(future))
    }

    fn handle_compile(
        &self,
        include_warnings: bool,
        timeout: Option<u64>,
    ) -> Result<CommandOutput, FerryError> {
        let client = self.client(include_warnings, timeout);
        let report = match Self::block_on(client.compile())? {
            Ok(report) => report,
            Err(e) => ClientReport::internal_error(e.to_string()),
        };
        Ok(CommandOutput::report(&report))
    }

    fn handle_submit(
        &self,
        file: &Path,
        wait: bool,
        include_warnings: bool,
        timeout: Option<u64>,
    ) -> Result<CommandOutput, FerryError> {
        let client = self.client(include_warnings, timeout);
        let submission = client.submit_file(file)?;
        if !wait {
            return Ok(CommandOutput::ok(format!(
                "Submitted {}\nCorrelation: {}",
                submission.path.display(),
                submission.correlation_id
            )));
        }

        let report = match Self::block_on(client.wait_for_response(&submission.correlation_id))? {
            Ok(Some(transcript)) => ClientReport::from_transcript(&transcript, include_warnings),
            Ok(None) => ClientReport::timeout(vec![
                format!(
                    "no response within {:.1}s",
                    client.options().timeout.as_secs_f64()
                ),
                format!("correlation id: {}", submission.correlation_id),
            ]),
            Err(e) => ClientReport::internal_error(e.to_string()),
        };
        Ok(CommandOutput::report(&report))
    }

    fn handle_host(
        &self,
        max_ticks: Option<u64>,
        compile_ticks: u32,
        poll: bool,
    ) -> Result<CommandOutput, FerryError> {
        let host = MemoryHost::new().with_compile_ticks(compile_ticks);
        let mut runtime = HostRuntime::new(&self.workspace_root, &self.config, host);
        if poll {
            runtime = runtime.without_watcher();
        }

        let ran = runtime.run(max_ticks);
        let stopped = runtime.stop();
        let ticks = ran?;
        stopped?;

        let host = runtime.host();
        Ok(CommandOutput::ok(format!(
            "Host stopped after {} ticks\nContexts: {}\nSaves: {}\nCompiles: {}",
            ticks,
            host.context_names().join(", "),
            host.save_count(),
            host.compile_count()
        )))
    }

    fn handle_ledger(&self, format: LedgerFormat) -> CommandOutput {
        let observation = self.client(false, None).observe_ledger();
        let stdout = match format {
            LedgerFormat::Json => {
                let value = match &observation {
                    LedgerObservation::Missing => json!({ "state": "missing" }),
                    LedgerObservation::Unreadable(reason) => {
                        json!({ "state": "unreadable", "reason": reason })
                    }
                    LedgerObservation::Record { record, locked } => {
                        json!({ "state": "record", "locked": locked, "record": record })
                    }
                };
                serde_json::to_string_pretty(&value).unwrap_or_else(|e| e.to_string())
            }
            LedgerFormat::Text => match &observation {
                LedgerObservation::Missing => "Ledger: missing (host never started here)".to_string(),
                LedgerObservation::Unreadable(reason) => format!("Ledger: unreadable ({})", reason),
                LedgerObservation::Record { record, locked } => {
                    let mut lines = vec![
                        format!(
                            "Status: {}",
                            match record.status {
                                LedgerStatus::Idle => "idle",
                                LedgerStatus::Compiling => "compiling",
                                LedgerStatus::Complete => "complete",
                            }
                        ),
                        format!("Locked: {}", locked),
                    ];
                    if let Some(started) = &record.started_at {
                        lines.push(format!("Started: {}", started));
                    }
                    if let Some(ended) = &record.ended_at {
                        lines.push(format!("Ended: {}", ended));
                    }
                    if let Some(duration) = record.duration_ms {
                        lines.push(format!("Duration: {}ms", duration));
                    }
                    if let (Some(errors), Some(warnings)) = (record.errors, record.warnings) {
                        lines.push(format!("Errors: {}  Warnings: {}", errors, warnings));
                    }
                    lines.join("\n")
                }
            },
        };
        CommandOutput::ok(stdout)
    }
}
