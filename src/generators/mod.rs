// Generation collaborator interface
//
// The call that produces content and scores it against both oracles is external.
// The gated loop only sees this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::GenerationError;
use crate::feedback::ParameterSet;

pub mod http;

pub use http::HttpGenerator;

/// Produces content for a subject and scores it
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate and score one candidate.
    ///
    /// Transient failures (`Transient`, `Timeout`) are retried by the caller
    /// without consuming a quality attempt; anything else ends the run.
    async fn generate(&self, request: &GenerationRequest)
        -> Result<GenerationOutput, GenerationError>;

    /// Generator name for logging
    fn name(&self) -> &str;
}

/// The entity being described, with whatever facts the prompt needs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectContext {
    pub subject_id: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl SubjectContext {
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Everything the collaborator receives for one attempt
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub category: String,
    pub subject_id: String,
    pub context: BTreeMap<String, String>,
    pub parameters: ParameterSet,
    pub attempt_number: u32,
}

/// Content plus raw oracle scores
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerationOutput {
    pub content: String,
    /// `[0, 1]`, higher is more machine-like
    pub ai_likeness_score: f64,
    /// `[0, 10]`
    pub realism_score: f64,
}
