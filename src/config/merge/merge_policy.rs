//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("paths.queue_dir", ".ferry/queue")?
        .set_default("paths.archive_dir", ".ferry/archive")?
        .set_default("paths.responses_dir", ".ferry/responses")?
        .set_default("paths.ledger_file", ".ferry/compile-status.json")?
        .set_default("paths.project_id_file", ".ferry/project-id")
}

/// Environment overrides (`FERRY__HOST__TICK_MS=50`) applied last.
pub fn environment_source() -> Environment {
    Environment::with_prefix("FERRY")
        .separator("__")
        .try_parsing(true)
}
