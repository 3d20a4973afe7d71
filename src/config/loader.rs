// Configuration loader
// Resolves the config file from --config, $ADAPTGEN_CONFIG or ~/.adaptgen/config.toml

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::constants::*;
use super::settings::GateConfig;

/// Load configuration, preferring an explicit path over the environment
/// variable over the default location. A missing file is fatal.
pub fn load_config(explicit: Option<&Path>) -> Result<GateConfig> {
    let path = resolve_config_path(explicit)?;

    if !path.exists() {
        bail!(
            "No configuration found at {}.\n\n\
             Create it with at least one [categories.<name>] table, or point to \
             another file with --config or {}.",
            path.display(),
            CONFIG_ENV_VAR
        );
    }

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = GateConfig::from_toml_str(&contents)
        .with_context(|| format!("Configuration validation failed for {}", path.display()))?;

    // Relative database paths are relative to the config file, not the cwd.
    if config.storage.database_path.is_relative() {
        if let Some(dir) = path.parent() {
            config.storage.database_path = dir.join(&config.storage.database_path);
        }
    }

    tracing::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_FILE))
}
