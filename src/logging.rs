//! Logging System
//!
//! Structured logging using the `tracing` crate. Configurable level, format, and
//! destination. Logs default to stderr: stdout belongs to the client's report block.

use crate::error::FerryError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Master switch; `--quiet` turns this off
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, stderr, file, file+stderr
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path (relative paths resolve against the workspace)
    #[serde(default = "default_log_file")]
    pub file: PathBuf,

    /// Enable colored output (text format, terminal destinations only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Module-specific log levels
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_log_file() -> PathBuf {
    PathBuf::from(".ferry/ferry.log")
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: default_log_file(),
            color: default_true(),
            modules: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Anchor a relative log file path at the workspace root.
    pub fn resolve(mut self, workspace_root: &Path) -> Self {
        if self.file.is_relative() {
            self.file = workspace_root.join(&self.file);
        }
        self
    }

    /// Overlay FERRY_LOG, FERRY_LOG_FORMAT, FERRY_LOG_OUTPUT and FERRY_LOG_MODULES from
    /// the process environment.
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay the FERRY_LOG* variables returned by `lookup`.
    ///
    /// `FERRY_LOG` may be a bare level or a full filter directive. `FERRY_LOG_MODULES`
    /// is a comma-separated `module=level` list; malformed pairs are skipped. An
    /// unknown `FERRY_LOG_FORMAT` is ignored.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("FERRY_LOG").filter(|v| !v.trim().is_empty()) {
            self.level = level.trim().to_string();
        }
        if let Some(format) = lookup("FERRY_LOG_FORMAT") {
            if format == "json" || format == "text" {
                self.format = format;
            }
        }
        if let Some(output) = lookup("FERRY_LOG_OUTPUT").filter(|v| !v.trim().is_empty()) {
            self.output = output.trim().to_string();
        }
        if let Some(modules) = lookup("FERRY_LOG_MODULES") {
            for module_spec in modules.split(',') {
                if let Some((module, level)) = module_spec.split_once('=') {
                    let (module, level) = (module.trim(), level.trim());
                    if !module.is_empty() && !level.is_empty() && !level.contains('=') {
                        self.modules.insert(module.to_string(), level.to_string());
                    }
                }
            }
        }
        self
    }
}

/// Initialize the logging system from a fully resolved config.
///
/// The environment is not consulted here. Callers fold sources in priority order
/// (highest to lowest):
/// 1. CLI arguments
/// 2. Environment variables, via [`LoggingConfig::apply_env`]
/// 3. Configuration file
/// 4. Defaults
///
/// Initializing twice is an error, not a panic.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), FerryError> {
    if config.map(|c| !c.enabled).unwrap_or(false) {
        return Ok(());
    }

    let filter = build_env_filter(config)?;
    let format = determine_format(config)?;
    let output = determine_output(config)?;
    let use_color = config.map(|c| c.color).unwrap_or(true) && !output.file;

    let writer = match (output.terminal, output.file) {
        (Terminal::Stdout, false) => BoxMakeWriter::new(std::io::stdout),
        (Terminal::Stderr, false) => BoxMakeWriter::new(std::io::stderr),
        (Terminal::None, true) => BoxMakeWriter::new(Arc::new(open_log_file(config)?)),
        (Terminal::Stderr, true) => {
            BoxMakeWriter::new(std::io::stderr.and(Arc::new(open_log_file(config)?)))
        }
        (Terminal::Stdout, true) => {
            BoxMakeWriter::new(std::io::stdout.and(Arc::new(open_log_file(config)?)))
        }
        (Terminal::None, false) => return Ok(()),
    };

    let base_subscriber = Registry::default().with(filter);
    let result = if format == "json" {
        base_subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .try_init()
    } else {
        base_subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(use_color)
                    .with_writer(writer),
            )
            .try_init()
    };

    result.map_err(|e| FerryError::ConfigError(format!("Failed to initialize logging: {}", e)))
}

fn open_log_file(config: Option<&LoggingConfig>) -> Result<std::fs::File, FerryError> {
    let log_file = config
        .map(|c| c.file.clone())
        .unwrap_or_else(default_log_file);

    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            FerryError::ConfigError(format!("Failed to create log directory: {}", e))
        })?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .map_err(|e| FerryError::ConfigError(format!("Failed to open log file {:?}: {}", log_file, e)))
}

/// Build the filter from the configured level and per-module overrides.
fn build_env_filter(config: Option<&LoggingConfig>) -> Result<EnvFilter, FerryError> {
    let level = config.map(|c| c.level.as_str()).unwrap_or("info");
    if level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let mut filter = EnvFilter::new(level);

    if let Some(config) = config {
        for (module, module_level) in &config.modules {
            let directive = format!("{}={}", module, module_level);
            filter = filter.add_directive(
                directive
                    .parse()
                    .map_err(|e| FerryError::ConfigError(format!("Invalid log directive: {}", e)))?,
            );
        }
    }

    Ok(filter)
}

fn determine_format(config: Option<&LoggingConfig>) -> Result<String, FerryError> {
    let format = config.map(|c| c.format.as_str()).unwrap_or("text");
    if format != "json" && format != "text" {
        return Err(FerryError::ConfigError(format!(
            "Invalid log format: {} (must be 'json' or 'text')",
            format
        )));
    }

    Ok(format.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminal {
    None,
    Stdout,
    Stderr,
}

/// Output destinations
#[derive(Debug, PartialEq, Eq)]
struct OutputDestinations {
    terminal: Terminal,
    file: bool,
}

fn determine_output(config: Option<&LoggingConfig>) -> Result<OutputDestinations, FerryError> {
    let output = config.map(|c| c.output.as_str()).unwrap_or("stderr");
    parse_output_destinations(output)
}

fn parse_output_destinations(output: &str) -> Result<OutputDestinations, FerryError> {
    let (terminal, file) = match output {
        "stdout" => (Terminal::Stdout, false),
        "stderr" => (Terminal::Stderr, false),
        "file" => (Terminal::None, true),
        "file+stderr" | "both" => (Terminal::Stderr, true),
        "file+stdout" => (Terminal::Stdout, true),
        _ => {
            return Err(FerryError::ConfigError(format!(
                "Invalid log output: {} (must be 'stdout', 'stderr', 'file', or 'file+stderr')",
                output
            )))
        }
    };
    Ok(OutputDestinations { terminal, file })
}
