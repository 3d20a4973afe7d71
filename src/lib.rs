// adaptgen - quality-gated content generation
// Library exports

// Core modules
pub mod cli;
pub mod config;
pub mod errors;
pub mod feedback;
pub mod generators;
pub mod learning;
pub mod logging;
pub mod orchestrator;

pub use errors::{GateError, GateResult, GenerationError, StorageError};
