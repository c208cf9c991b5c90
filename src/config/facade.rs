//! Loader entry points over the layered sources.

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::FerryConfig;
use crate::error::FerryError;
use config::{Config, File};
use std::path::Path;
use tracing::debug;

/// Configuration loader
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Precedence (lowest to highest): defaults, global file, `.ferry/config.toml`,
    /// `.ferry/{FERRY_ENV}.toml`, `FERRY__*` environment variables.
    pub fn load(workspace_root: &Path) -> Result<FerryConfig, FerryError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let config = builder
            .add_source(merge_policy::environment_source())
            .build()?;

        let loaded: FerryConfig = config.try_deserialize()?;
        debug!(workspace = %workspace_root.display(), "Configuration loaded");
        loaded.validated()
    }

    /// Load configuration from one explicit file (`--config`), ignoring other layers
    /// except environment overrides.
    pub fn load_from_file(path: &Path) -> Result<FerryConfig, FerryError> {
        if !path.exists() {
            return Err(FerryError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let config = Config::builder()
            .add_source(File::from(path.to_path_buf()).required(true))
            .add_source(merge_policy::environment_source())
            .build()?;
        let loaded: FerryConfig = config.try_deserialize()?;
        loaded.validated()
    }
}
