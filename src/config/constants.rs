// Project-wide constants
//
// Centralised here so defaults for optional configuration keys have one
// source of truth. Import via `use crate::config::constants::*;`.

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV_VAR: &str = "ADAPTGEN_CONFIG";

/// Directory under `$HOME` holding the default config file.
pub const DEFAULT_CONFIG_DIR: &str = ".adaptgen";

/// Default config file name inside [`DEFAULT_CONFIG_DIR`].
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Multiplier applied to the empirical percentile when deriving a base threshold.
pub const DEFAULT_SAFETY_FACTOR: f64 = 0.95;

/// Percentile of successful gate scores used as the empirical boundary.
pub const DEFAULT_PERCENTILE: f64 = 75.0;

/// Share of attempts (by composite score) treated as top performers.
pub const DEFAULT_TOP_PERCENT: f64 = 25.0;

/// Sample count at which derived records are reported with `high` confidence.
pub const DEFAULT_HIGH_CONFIDENCE_SAMPLES: usize = 30;

/// Bounded timeout for a single generation call.
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 60;

/// Transient failures tolerated per quality attempt before the run fails.
pub const DEFAULT_TRANSIENT_RETRIES: u32 = 3;

/// Base delay for exponential backoff between transient retries.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;

/// Parameter key written by the diversifier when a structural variant is chosen.
pub const STRUCTURAL_VARIANT_PARAM: &str = "structural_variant";

/// Realism oracle scale (scores are reported in `[0, REALISM_SCALE]`).
pub const REALISM_SCALE: f64 = 10.0;
