//! CLI domain: parse, route, help, and output only.
//! No domain orchestration; a single route table dispatches to the runtime and client.

mod help;
mod output;
mod parse;
mod route;

pub use help::command_name;
pub use output::{error_exit_code, error_report, map_error};
pub use parse::{Cli, Commands, LedgerFormat};
pub use route::{CommandOutput, RunContext};
