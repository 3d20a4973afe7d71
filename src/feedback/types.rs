// Attempt log data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::config::constants::REALISM_SCALE;
use crate::config::{CompositeWeights, GateMetric};
use crate::errors::GenerationError;

/// One tunable knob value. Untagged so config files and the JSON parameter
/// snapshot read naturally (`temperature = 0.8`, `voice = "plain"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Numeric view used for ranges and correlation. Text and flags have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_f64().is_some()
    }

    /// Rebuild a value of the same kind from a sampled number.
    pub fn with_numeric(&self, value: f64) -> Self {
        match self {
            Self::Integer(_) => Self::Integer(value.round() as i64),
            _ => Self::Float(value),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{:.4}", v),
            Self::Text(v) => write!(f, "{}", v),
        }
    }
}

/// Flat parameter snapshot, ordered by name so serialized snapshots are stable.
pub type ParameterSet = BTreeMap<String, ParamValue>;

/// Row id of a logged attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttemptId(pub i64);

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which parameter-selection strategy produced an attempt's parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionTier {
    ExactReplay,
    SweetSpot,
    StaticDefault,
}

impl SelectionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactReplay => "exact_replay",
            Self::SweetSpot => "sweet_spot",
            Self::StaticDefault => "static_default",
        }
    }
}

impl fmt::Display for SelectionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact_replay" => Ok(Self::ExactReplay),
            "sweet_spot" => Ok(Self::SweetSpot),
            "static_default" => Ok(Self::StaticDefault),
            other => Err(format!("unknown selection tier '{}'", other)),
        }
    }
}

/// Raw oracle outputs plus the derived composite
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    /// Detector output in `[0, 1]`, higher means more machine-like
    pub ai_likeness: f64,
    /// `1 - ai_likeness`
    pub human_likeness: f64,
    /// Subjective realism in `[0, 10]`
    pub realism: f64,
    /// Weighted combination in `[0, 1]`
    pub composite: f64,
}

impl Scores {
    /// Validate oracle ranges and derive the composite. Out-of-range or
    /// non-finite scores are rejected rather than clamped.
    pub fn from_oracles(
        ai_likeness: f64,
        realism: f64,
        weights: &CompositeWeights,
    ) -> Result<Self, GenerationError> {
        let valid = ai_likeness.is_finite()
            && realism.is_finite()
            && (0.0..=1.0).contains(&ai_likeness)
            && (0.0..=REALISM_SCALE).contains(&realism);
        if !valid {
            return Err(GenerationError::InvalidScores {
                ai_likeness,
                realism,
            });
        }

        Ok(Self {
            ai_likeness,
            human_likeness: 1.0 - ai_likeness,
            realism,
            composite: weights.composite(ai_likeness, realism),
        })
    }

    /// The value compared against the acceptance threshold
    pub fn gate_value(&self, metric: GateMetric) -> f64 {
        match metric {
            GateMetric::Composite => self.composite,
            GateMetric::HumanLikeness => self.human_likeness,
        }
    }
}

/// One generation try. Immutable once logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    /// Assigned by the store; `None` until appended
    pub id: Option<AttemptId>,
    pub run_id: Uuid,
    pub category: String,
    pub subject_id: String,
    /// 1-indexed within the run
    pub attempt_number: u32,
    pub parameters: ParameterSet,
    pub scores: Scores,
    pub selection_tier: SelectionTier,
    /// Parameters were varied by the diversifier on a retry
    pub diversified: bool,
    pub applied_threshold: f64,
    /// True only if every active gate was cleared
    pub accepted: bool,
    /// SHA-256 of the generated content
    pub content_hash: String,
    pub content_length: usize,
    pub timestamp: DateTime<Utc>,
}

/// Attempt selection for [`FeedbackStore::query`](super::FeedbackStore::query).
/// Empty filter matches every attempt in the category.
#[derive(Debug, Clone, Default)]
pub struct AttemptFilter {
    pub accepted: Option<bool>,
    pub subject_id: Option<String>,
    pub run_id: Option<Uuid>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl AttemptFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn accepted_only() -> Self {
        Self {
            accepted: Some(true),
            ..Self::default()
        }
    }

    pub fn for_subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    pub fn in_run(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }
}

/// How much data backs a derived record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Insufficient,
    Medium,
    High,
}

impl Confidence {
    pub fn from_samples(samples: usize, min_samples: usize, high_samples: usize) -> Self {
        if samples < min_samples {
            Self::Insufficient
        } else if samples < high_samples {
            Self::Medium
        } else {
            Self::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insufficient => "insufficient",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn is_trusted(&self) -> bool {
        !matches!(self, Self::Insufficient)
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insufficient" => Ok(Self::Insufficient),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown confidence tier '{}'", other)),
        }
    }
}

/// Learned acceptance boundary for a category (before per-attempt relaxation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRecord {
    pub category: String,
    /// Base threshold: learned, or the static default
    pub value: f64,
    /// Successful attempts the value was derived from
    pub sample_count: usize,
    pub confidence: Confidence,
    /// False when the static default was used
    pub learned: bool,
    pub computed_at: DateTime<Utc>,
}

/// Aggregate view of one category's attempt log
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategorySummary {
    pub total_attempts: usize,
    pub accepted: usize,
    pub acceptance_rate: f64,
    pub mean_composite: f64,
    pub best_composite: f64,
    pub subjects: usize,
    pub tier_counts: BTreeMap<String, usize>,
}
