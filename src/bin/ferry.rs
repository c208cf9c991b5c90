//! Ferry CLI Binary
//!
//! Command-line entry point for both sides of the bus: the host loop and the external
//! client. Stdout carries only command output; logs go to stderr or a file.

use clap::Parser;
use ferry::cli::{Cli, RunContext};
use ferry::config::ConfigLoader;
use ferry::logging::{init_logging, LoggingConfig};
use std::process;
use tracing::{error, info};

const USAGE_EXIT_CODE: i32 = 3;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            process::exit(if e.use_stderr() { USAGE_EXIT_CODE } else { 0 });
        }
    };

    let logging_config = build_logging_config(&cli);
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(USAGE_EXIT_CODE);
    }

    info!("Ferry CLI starting");

    let context = match RunContext::new(cli.workspace.clone(), cli.config.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Error loading configuration: {}", e);
            print!("{}", ferry::cli::error_report(&e));
            process::exit(ferry::cli::error_exit_code(&e));
        }
    };

    match context.execute(&cli.command) {
        Ok(output) => {
            info!(exit_code = output.exit_code, "Command completed");
            if output.stdout.ends_with('\n') {
                print!("{}", output.stdout);
            } else {
                println!("{}", output.stdout);
            }
            process::exit(output.exit_code);
        }
        Err(e) => {
            error!("Command failed: {}", e);
            print!("{}", ferry::cli::error_report(&e));
            process::exit(ferry::cli::error_exit_code(&e));
        }
    }
}

/// Build logging configuration from CLI args, environment, and config file.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let file_config = if let Some(ref config_path) = cli.config {
        ConfigLoader::load_from_file(config_path)
            .ok()
            .map(|c| c.logging)
            .unwrap_or_default()
    } else {
        ConfigLoader::load(&cli.workspace)
            .ok()
            .map(|c| c.logging)
            .unwrap_or_default()
    };
    resolve_logging_config(cli, file_config, |key| std::env::var(key).ok())
}

/// Precedence: CLI flags override FERRY_LOG* env vars override the config file.
fn resolve_logging_config<F>(cli: &Cli, file_config: LoggingConfig, env: F) -> LoggingConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = file_config.apply_env_from(env);

    if cli.quiet {
        config.enabled = false;
    }
    if cli.verbose {
        config.level = "debug".to_string();
        // Keep verbose output visible in the terminal even when logging to a file.
        if config.output == "file" {
            config.output = "file+stderr".to_string();
        }
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = file.clone();
    }

    config.resolve(&cli.workspace)
}
