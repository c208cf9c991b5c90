//! CLI command-name contract used for log spans.

use crate::cli::parse::Commands;

/// Command name string for logging (e.g. "compile", "host").
pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Compile { .. } => "compile",
        Commands::Submit { .. } => "submit",
        Commands::Host { .. } => "host",
        Commands::Ledger { .. } => "ledger",
    }
}
