// Configuration structs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::category::{CategoryDescriptor, CategoryRegistry};
use super::constants::*;
use crate::errors::{GateError, GateResult};

/// Deployment environment. Gating bypass is refused in production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Production,
}

/// Attempt log location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database holding the attempt log
    pub database_path: PathBuf,
}

/// Settings for the external generation + scoring collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// HTTP endpoint for `HttpGenerator` (required only when it is used)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bounded timeout for a single generation call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Transient failures tolerated per quality attempt
    #[serde(default = "default_transient_retries")]
    pub transient_retries: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Name of the environment variable holding the bearer token, if any
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_GENERATION_TIMEOUT_SECS
}

fn default_transient_retries() -> u32 {
    DEFAULT_TRANSIENT_RETRIES
}

fn default_retry_base_delay_ms() -> u64 {
    DEFAULT_RETRY_BASE_DELAY_MS
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: DEFAULT_GENERATION_TIMEOUT_SECS,
            transient_retries: DEFAULT_TRANSIENT_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            api_key_env: None,
        }
    }
}

impl GeneratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// Immutable configuration shared by every component (wrap in `Arc`).
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub environment: Environment,

    /// Development-only override that accepts the first attempt regardless of
    /// score. Never on by default.
    pub bypass_gating: bool,

    pub storage: StorageConfig,

    pub generator: GeneratorConfig,

    pub categories: CategoryRegistry,
}

/// On-disk shape of the config file
#[derive(Deserialize)]
struct ConfigFile {
    environment: Environment,
    #[serde(default)]
    bypass_gating: bool,
    storage: StorageConfig,
    #[serde(default)]
    generator: GeneratorConfig,
    categories: BTreeMap<String, CategoryDescriptor>,
}

impl GateConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> GateResult<Self> {
        let file: ConfigFile = toml::from_str(contents)
            .map_err(|e| GateError::Config(format!("invalid config file: {}", e)))?;

        let config = Self {
            environment: file.environment,
            bypass_gating: file.bypass_gating,
            storage: file.storage,
            generator: file.generator,
            categories: CategoryRegistry::new(file.categories),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration. Any failure aborts startup.
    pub fn validate(&self) -> GateResult<()> {
        if self.categories.is_empty() {
            return Err(GateError::Config(
                "no categories configured; add at least one [categories.<name>] table".into(),
            ));
        }

        for descriptor in self.categories.iter() {
            descriptor.validate()?;
        }

        if self.generator.timeout_secs == 0 {
            return Err(GateError::Config(
                "generator.timeout_secs must be greater than 0".into(),
            ));
        }

        if self.storage.database_path.as_os_str().is_empty() {
            return Err(GateError::Config("storage.database_path is empty".into()));
        }

        if self.bypass_gating && self.environment == Environment::Production {
            return Err(GateError::BypassInProduction);
        }

        Ok(())
    }
}
