// Error taxonomy
//
// Every variant here is fatal to the run that raised it. Quality-gate misses are
// not errors: they surface as `RunOutcome::Exhausted` from the orchestrator.

use std::time::Duration;

/// Failures of the attempt log. Losing the log breaks learning, so none of
/// these are retried.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("feedback store unavailable at {path}: {reason}")]
    Unavailable { path: String, reason: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to (de)serialize attempt data: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt attempt record {id}: {reason}")]
    CorruptRecord { id: i64, reason: String },

    #[error("attempt log is append-only: {0}")]
    AppendOnlyViolation(String),

    #[error("timestamp {0} cannot be stored")]
    InvalidTimestamp(String),
}

/// Failures reported by the external generation + scoring collaborator.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("transient generation failure: {0}")]
    Transient(String),

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("generation failed: {0}")]
    Fatal(String),

    #[error("oracle returned out-of-range scores (ai_likeness={ai_likeness}, realism={realism})")]
    InvalidScores { ai_likeness: f64, realism: f64 },
}

impl GenerationError {
    /// Transient failures are retried without consuming a quality attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}

/// Top-level error surfaced to callers of the gated generation loop.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown content category '{0}'")]
    UnknownCategory(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("generation still failing after {attempts} transient retries: {last_error}")]
    TransientRetriesExhausted {
        attempts: u32,
        last_error: GenerationError,
    },

    #[error("bypass_gating is enabled in a production environment; refusing to generate")]
    BypassInProduction,
}

impl From<rusqlite::Error> for GateError {
    fn from(e: rusqlite::Error) -> Self {
        GateError::Storage(StorageError::Sqlite(e))
    }
}

pub type GateResult<T> = std::result::Result<T, GateError>;
