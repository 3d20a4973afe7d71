// Per-category descriptors and the registry that resolves them
//
// Every component looks up its knobs here by category name. Nothing else in the
// crate branches on which category it is handling.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::constants::*;
use crate::errors::{GateError, GateResult};
use crate::feedback::ParameterSet;

/// Which score the learned threshold is derived from and applied to.
///
/// Both options are higher-is-better, so relaxing the threshold lowers the bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GateMetric {
    /// Weighted combination of the two oracles
    #[default]
    Composite,
    /// Detector-only gating: `1 - ai_likeness`
    HumanLikeness,
}

impl fmt::Display for GateMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Composite => write!(f, "composite"),
            Self::HumanLikeness => write!(f, "human_likeness"),
        }
    }
}

/// Weights for the composite score. Normalised on use, so `0.4 / 0.6` and
/// `2 / 3` describe the same mix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeWeights {
    /// Weight of `1 - ai_likeness`
    pub ai_inverse: f64,
    /// Weight of `realism / 10`
    pub realism: f64,
}

impl CompositeWeights {
    /// Combine raw oracle outputs into a composite score in `[0, 1]`.
    pub fn composite(&self, ai_likeness: f64, realism: f64) -> f64 {
        let total = self.ai_inverse + self.realism;
        let value = (self.ai_inverse * (1.0 - ai_likeness)
            + self.realism * (realism / REALISM_SCALE))
            / total;
        value.clamp(0.0, 1.0)
    }
}

/// Static description of one content category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDescriptor {
    /// Filled from the `[categories.<name>]` key
    #[serde(skip)]
    pub name: String,

    /// Quality attempts per subject before the run is exhausted
    pub max_attempts: u32,

    /// Threshold used until enough successes exist to learn one
    pub default_threshold: f64,

    /// Learned base thresholds are clamped into `[min_bound, max_bound]`
    pub min_bound: f64,
    pub max_bound: f64,

    /// Absolute quality floor; the final attempt's threshold lands here
    pub relaxation_floor: f64,

    /// Minimum successful attempts before a threshold is learned, and minimum
    /// attempts before sweet spots are reported
    pub min_samples: usize,

    /// Parameters correlating with the composite score below this value are
    /// excluded from sweet-spot recommendations
    pub correlation_exclusion: f64,

    pub weights: CompositeWeights,

    /// Tier 3 parameter set; also fills knobs a sweet spot does not cover
    pub defaults: ParameterSet,

    #[serde(default = "default_safety_factor")]
    pub safety_factor: f64,

    #[serde(default = "default_percentile")]
    pub percentile: f64,

    #[serde(default = "default_top_percent")]
    pub top_percent: f64,

    #[serde(default = "default_high_confidence_samples")]
    pub high_confidence_samples: usize,

    /// Total attempts required before sweet-spot data is trusted at all.
    /// Falls back to `min_samples` when unset.
    #[serde(default)]
    pub exploration_min_samples: Option<usize>,

    #[serde(default)]
    pub gate_metric: GateMetric,

    /// Optional secondary gate on the raw realism score (0-10)
    #[serde(default)]
    pub min_realism: Option<f64>,

    /// Structural variations the diversifier rotates through on retries
    #[serde(default)]
    pub structural_variants: Vec<String>,

    #[serde(default = "default_true")]
    pub diversify: bool,
}

fn default_safety_factor() -> f64 {
    DEFAULT_SAFETY_FACTOR
}

fn default_percentile() -> f64 {
    DEFAULT_PERCENTILE
}

fn default_top_percent() -> f64 {
    DEFAULT_TOP_PERCENT
}

fn default_high_confidence_samples() -> usize {
    DEFAULT_HIGH_CONFIDENCE_SAMPLES
}

fn default_true() -> bool {
    true
}

impl CategoryDescriptor {
    pub fn exploration_min_samples(&self) -> usize {
        self.exploration_min_samples.unwrap_or(self.min_samples)
    }

    /// Validate bounds and weights. Every failure is a fatal config error.
    pub fn validate(&self) -> GateResult<()> {
        let fail = |msg: String| Err(GateError::Config(format!("category '{}': {}", self.name, msg)));

        if self.max_attempts == 0 {
            return fail("max_attempts must be at least 1".into());
        }
        if self.min_samples == 0 {
            return fail("min_samples must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.relaxation_floor)
            || !(0.0..=1.0).contains(&self.min_bound)
            || !(0.0..=1.0).contains(&self.max_bound)
        {
            return fail("thresholds and bounds must lie in [0, 1]".into());
        }
        if !(self.relaxation_floor <= self.min_bound && self.min_bound <= self.max_bound) {
            return fail(format!(
                "expected relaxation_floor <= min_bound <= max_bound, got {} / {} / {}",
                self.relaxation_floor, self.min_bound, self.max_bound
            ));
        }
        if !(self.relaxation_floor..=1.0).contains(&self.default_threshold) {
            return fail(format!(
                "default_threshold {} must lie in [relaxation_floor, 1]",
                self.default_threshold
            ));
        }
        if !(-1.0..=0.0).contains(&self.correlation_exclusion) {
            return fail("correlation_exclusion must lie in [-1, 0]".into());
        }
        if self.weights.ai_inverse < 0.0
            || self.weights.realism < 0.0
            || self.weights.ai_inverse + self.weights.realism <= 0.0
        {
            return fail("weights must be non-negative with a positive sum".into());
        }
        if !(self.percentile > 0.0 && self.percentile <= 100.0) {
            return fail("percentile must lie in (0, 100]".into());
        }
        if !(self.top_percent > 0.0 && self.top_percent <= 100.0) {
            return fail("top_percent must lie in (0, 100]".into());
        }
        if !(self.safety_factor > 0.0 && self.safety_factor <= 1.0) {
            return fail("safety_factor must lie in (0, 1]".into());
        }
        if self.defaults.is_empty() {
            return fail("defaults must define at least one parameter".into());
        }
        if let Some(min_realism) = self.min_realism {
            if !(0.0..=REALISM_SCALE).contains(&min_realism) {
                return fail("min_realism must lie in [0, 10]".into());
            }
        }
        Ok(())
    }
}

/// Maps category names to their descriptors.
#[derive(Debug, Clone, Default)]
pub struct CategoryRegistry {
    categories: BTreeMap<String, CategoryDescriptor>,
}

impl CategoryRegistry {
    pub fn new(categories: BTreeMap<String, CategoryDescriptor>) -> Self {
        let categories = categories
            .into_iter()
            .map(|(name, mut descriptor)| {
                descriptor.name = name.clone();
                (name, descriptor)
            })
            .collect();
        Self { categories }
    }

    pub fn get(&self, category: &str) -> GateResult<&CategoryDescriptor> {
        self.categories
            .get(category)
            .ok_or_else(|| GateError::UnknownCategory(category.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryDescriptor> {
        self.categories.values()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}
