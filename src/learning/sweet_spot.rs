// Sweet-spot analysis
//
// Parameter ranges come from the top slice of attempts by composite score.
// Correlation with the composite is measured over the whole category so that a
// knob which only rides along with good attempts (confounded by other knobs)
// is caught and excluded instead of being learned into future selections.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::stats::{median, pearson};
use crate::config::{CategoryDescriptor, GateConfig};
use crate::errors::GateResult;
use crate::feedback::{Attempt, AttemptFilter, Confidence, FeedbackStore, ParamValue};

/// Recommended range for one numeric parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweetSpotRecommendation {
    pub category: String,
    pub parameter: String,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    /// Pearson correlation with the composite score over the full sample
    pub correlation: f64,
    /// Attempts carrying this parameter
    pub sample_count: usize,
    pub confidence: Confidence,
    /// Every observed value was an integer
    pub integral: bool,
}

impl SweetSpotRecommendation {
    /// Value of the same kind as the observations
    pub fn value_at(&self, value: f64) -> ParamValue {
        if self.integral {
            ParamValue::Integer(value.round() as i64)
        } else {
            ParamValue::Float(value)
        }
    }
}

/// A parameter dropped by the correlation filter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExcludedParameter {
    pub parameter: String,
    pub correlation: f64,
    pub sample_count: usize,
}

/// Full analysis result, including what was filtered out
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweetSpotReport {
    pub recommendations: BTreeMap<String, SweetSpotRecommendation>,
    pub excluded: Vec<ExcludedParameter>,
    /// Attempts considered
    pub sample_count: usize,
    /// Attempts in the top slice
    pub top_count: usize,
}

pub struct SweetSpotAnalyzer {
    config: Arc<GateConfig>,
    store: Arc<FeedbackStore>,
}

impl SweetSpotAnalyzer {
    pub fn new(config: Arc<GateConfig>, store: Arc<FeedbackStore>) -> Self {
        Self { config, store }
    }

    /// Parameter name -> recommendation. Empty while the category has fewer
    /// than `min_samples` attempts.
    pub async fn recommend(
        &self,
        category: &str,
    ) -> GateResult<BTreeMap<String, SweetSpotRecommendation>> {
        Ok(self.analyze(category).await?.recommendations)
    }

    pub async fn analyze(&self, category: &str) -> GateResult<SweetSpotReport> {
        let descriptor = self.config.categories.get(category)?;
        let attempts = self.store.query(category, &AttemptFilter::all()).await?;
        Ok(analyze_attempts(descriptor, &attempts))
    }
}

/// Pure analysis over an attempt sample.
pub fn analyze_attempts(descriptor: &CategoryDescriptor, attempts: &[Attempt]) -> SweetSpotReport {
    let n = attempts.len();
    if n < descriptor.min_samples {
        tracing::debug!(
            "Not enough attempts for sweet spots in {} ({} < {})",
            descriptor.name,
            n,
            descriptor.min_samples
        );
        return SweetSpotReport {
            sample_count: n,
            ..SweetSpotReport::default()
        };
    }

    let mut ranked: Vec<&Attempt> = attempts.iter().collect();
    ranked.sort_by(|a, b| b.scores.composite.total_cmp(&a.scores.composite));
    let top_count = ((n as f64 * descriptor.top_percent / 100.0).ceil() as usize).clamp(1, n);
    let top = &ranked[..top_count];

    let parameters: BTreeSet<&str> = top
        .iter()
        .flat_map(|a| a.parameters.iter())
        .filter(|(_, value)| value.is_numeric())
        .map(|(name, _)| name.as_str())
        .collect();

    let mut report = SweetSpotReport {
        sample_count: n,
        top_count,
        ..SweetSpotReport::default()
    };

    for parameter in parameters {
        let top_values: Vec<f64> = top
            .iter()
            .filter_map(|a| a.parameters.get(parameter).and_then(ParamValue::as_f64))
            .collect();

        let pairs: Vec<(f64, f64)> = attempts
            .iter()
            .filter_map(|a| {
                a.parameters
                    .get(parameter)
                    .and_then(ParamValue::as_f64)
                    .map(|v| (v, a.scores.composite))
            })
            .collect();

        // Undefined correlation (constant knob) carries no evidence of harm.
        let correlation = pearson(&pairs).unwrap_or(0.0);

        if correlation < descriptor.correlation_exclusion {
            tracing::warn!(
                "Excluding '{}' from {} sweet spots: correlation {:.3} with composite score \
                 over {} samples is below {:.2}",
                parameter,
                descriptor.name,
                correlation,
                pairs.len(),
                descriptor.correlation_exclusion
            );
            report.excluded.push(ExcludedParameter {
                parameter: parameter.to_string(),
                correlation,
                sample_count: pairs.len(),
            });
            continue;
        }

        let Some(mid) = median(&top_values) else {
            continue;
        };
        let min = top_values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = top_values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let integral = attempts
            .iter()
            .filter_map(|a| a.parameters.get(parameter))
            .all(|v| matches!(v, ParamValue::Integer(_)));

        report.recommendations.insert(
            parameter.to_string(),
            SweetSpotRecommendation {
                category: descriptor.name.clone(),
                parameter: parameter.to_string(),
                min,
                max,
                median: mid,
                correlation,
                sample_count: pairs.len(),
                confidence: Confidence::from_samples(
                    pairs.len(),
                    descriptor.min_samples,
                    descriptor.high_confidence_samples,
                ),
                integral,
            },
        );
    }

    report
}
