//! CLI parse: clap types for Ferry. No behavior; definitions only.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Ferry CLI - drive and monitor a host application through the filesystem
#[derive(Parser, Debug)]
#[command(name = "ferry", version)]
#[command(about = "Filesystem command bus for single-affinity host applications")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, global = true, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, global = true, default_value = "false", conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask the host to compile and wait for the verdict
    Compile {
        /// List warnings in DETAILS as well as errors
        #[arg(long)]
        include_warnings: bool,
        /// Overall budget in seconds (default from config)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Submit a request file to the queue
    Submit {
        /// Request file (batch or single-command form)
        file: PathBuf,
        /// Wait for the host's response and report it
        #[arg(long)]
        wait: bool,
        /// Report ignored fields as well as failures
        #[arg(long)]
        include_warnings: bool,
        /// Wait budget in seconds (default from config)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Run the in-memory reference host loop
    Host {
        /// Stop after this many ticks (default: run until stopped)
        #[arg(long)]
        max_ticks: Option<u64>,
        /// Ticks a simulated compile stays busy
        #[arg(long, default_value = "10")]
        compile_ticks: u32,
        /// Sweep the queue every tick instead of watching it
        #[arg(long)]
        poll: bool,
    },
    /// Show the current compilation ledger state
    Ledger {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: LedgerFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LedgerFormat {
    Text,
    Json,
}
