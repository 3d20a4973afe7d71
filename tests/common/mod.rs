// Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use uuid::Uuid;

use adaptgen::config::GateConfig;
use adaptgen::errors::GenerationError;
use adaptgen::feedback::{Attempt, ParamValue, ParameterSet, Scores, SelectionTier};
use adaptgen::generators::{GenerationOutput, GenerationRequest, Generator};

pub const CONFIG: &str = r#"
environment = "development"

[storage]
database_path = "attempts.db"

[generator]
timeout_secs = 5
transient_retries = 2
retry_base_delay_ms = 5

[categories.caption]
max_attempts = 5
default_threshold = 0.7
min_bound = 0.6
max_bound = 0.9
relaxation_floor = 0.45
min_samples = 10
correlation_exclusion = -0.3

[categories.caption.weights]
ai_inverse = 0.5
realism = 0.5

[categories.caption.defaults]
temperature = 0.8
max_tokens = 300
"#;

pub fn config() -> GateConfig {
    GateConfig::from_toml_str(CONFIG).unwrap()
}

pub fn config_with(extra_caption_keys: &str) -> GateConfig {
    let toml = CONFIG.replace(
        "correlation_exclusion = -0.3\n",
        &format!("correlation_exclusion = -0.3\n{}\n", extra_caption_keys),
    );
    GateConfig::from_toml_str(&toml).unwrap()
}

/// Oracle scores whose composite equals `composite` under any weights
pub fn scores(composite: f64) -> Scores {
    Scores {
        ai_likeness: 1.0 - composite,
        human_likeness: composite,
        realism: composite * 10.0,
        composite,
    }
}

pub fn output(composite: f64) -> GenerationOutput {
    GenerationOutput {
        content: format!("content scoring {:.2}", composite),
        ai_likeness_score: 1.0 - composite,
        realism_score: composite * 10.0,
    }
}

pub fn params(temperature: f64, max_tokens: i64) -> ParameterSet {
    let mut p = ParameterSet::new();
    p.insert("temperature".into(), ParamValue::Float(temperature));
    p.insert("max_tokens".into(), ParamValue::Integer(max_tokens));
    p
}

/// A historical attempt, `seq` seconds after a fixed epoch
pub fn attempt(
    subject_id: &str,
    seq: i64,
    parameters: ParameterSet,
    composite: f64,
    accepted: bool,
) -> Attempt {
    Attempt {
        id: None,
        run_id: Uuid::new_v4(),
        category: "caption".into(),
        subject_id: subject_id.into(),
        attempt_number: 1,
        parameters,
        scores: scores(composite),
        selection_tier: SelectionTier::StaticDefault,
        diversified: false,
        applied_threshold: 0.7,
        accepted,
        content_hash: format!("{:064x}", seq),
        content_length: 42,
        timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(seq),
    }
}

/// Replays a fixed script of results, then repeats `fallback`.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<GenerationOutput, GenerationError>>>,
    fallback: GenerationOutput,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<GenerationOutput, GenerationError>>) -> Self {
        Self::with_fallback(script, output(0.95))
    }

    pub fn with_fallback(
        script: Vec<Result<GenerationOutput, GenerationError>>,
        fallback: GenerationOutput,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(fallback: GenerationOutput) -> Self {
        Self::with_fallback(Vec::new(), fallback)
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(self.fallback.clone()),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
