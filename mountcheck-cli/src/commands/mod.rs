//! Command handlers -- one module per binary

pub mod harness;
pub mod vm;

use std::path::Path;

use mountcheck_core::MountcheckConfig;

use crate::cli::DEFAULT_CONFIG_FILE;
use crate::error::CliError;

/// Load the configuration for either binary.
///
/// An explicit `path` must exist. Without one, `mountcheck.toml` in the
/// current directory is used when present, otherwise the defaults.
/// `MOUNTCHECK_*` environment variables are applied in both cases, then the
/// `--log-level` override.
pub fn load_config(
    path: Option<&Path>,
    log_level: Option<&str>,
) -> Result<MountcheckConfig, CliError> {
    let mut config = match path {
        Some(path) => MountcheckConfig::load(path)?,
        None => MountcheckConfig::load_or_default(DEFAULT_CONFIG_FILE)?,
    };
    if let Some(level) = log_level {
        config.general.log_level = level.to_owned();
        config.validate()?;
    }
    Ok(config)
}
