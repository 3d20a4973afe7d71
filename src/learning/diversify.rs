// Retry diversification
//
// Retries of one subject should not collapse onto the same "safe" output. On
// attempt > 1 the diversifier re-samples sweet-spot knobs inside their learned
// range and rotates the structural variant. The RNG is seeded from
// (category, subject, attempt) so a rerun reproduces the same parameters, and
// whatever it picks is logged with the attempt like any other parameter.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use super::selector::Selection;
use crate::config::constants::STRUCTURAL_VARIANT_PARAM;
use crate::config::CategoryDescriptor;
use crate::feedback::{ParamValue, ParameterSet, SelectionTier};

pub struct Diversifier;

impl Diversifier {
    /// Parameters for `attempt_number`, plus whether anything was varied.
    pub fn apply(
        descriptor: &CategoryDescriptor,
        subject_id: &str,
        attempt_number: u32,
        selection: &Selection,
    ) -> (ParameterSet, bool) {
        let mut parameters = selection.parameters.clone();
        if attempt_number <= 1 || !descriptor.diversify {
            return (parameters, false);
        }

        let mut rng = SmallRng::seed_from_u64(seed(&descriptor.name, subject_id, attempt_number));
        let mut diversified = false;

        if selection.tier == SelectionTier::SweetSpot {
            for (name, rec) in &selection.recommendations {
                let sampled = if rec.max > rec.min {
                    rng.gen_range(rec.min..=rec.max)
                } else {
                    rec.min
                };
                let value = match parameters.get(name) {
                    Some(current) if rec.integral && current.is_numeric() => {
                        current.with_numeric(sampled)
                    }
                    _ => rec.value_at(sampled),
                };
                parameters.insert(name.clone(), value);
                diversified = true;
            }
        }

        if !descriptor.structural_variants.is_empty() {
            let idx = rng.gen_range(0..descriptor.structural_variants.len());
            parameters.insert(
                STRUCTURAL_VARIANT_PARAM.to_string(),
                ParamValue::Text(descriptor.structural_variants[idx].clone()),
            );
            diversified = true;
        }

        (parameters, diversified)
    }
}

fn seed(category: &str, subject_id: &str, attempt_number: u32) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(category.as_bytes());
    hasher.update([0u8]);
    hasher.update(subject_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(attempt_number.to_le_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompositeWeights, GateMetric};
    use crate::feedback::Confidence;
    use crate::learning::SweetSpotRecommendation;
    use std::collections::BTreeMap;

    fn descriptor(variants: &[&str]) -> CategoryDescriptor {
        let mut defaults = ParameterSet::new();
        defaults.insert("temperature".into(), ParamValue::Float(0.8));
        defaults.insert("max_tokens".into(), ParamValue::Integer(300));
        CategoryDescriptor {
            name: "caption".into(),
            max_attempts: 5,
            default_threshold: 0.7,
            min_bound: 0.6,
            max_bound: 0.9,
            relaxation_floor: 0.45,
            min_samples: 10,
            correlation_exclusion: -0.3,
            weights: CompositeWeights {
                ai_inverse: 0.4,
                realism: 0.6,
            },
            defaults,
            safety_factor: 0.95,
            percentile: 75.0,
            top_percent: 25.0,
            high_confidence_samples: 30,
            exploration_min_samples: None,
            gate_metric: GateMetric::Composite,
            min_realism: None,
            structural_variants: variants.iter().map(|v| v.to_string()).collect(),
            diversify: true,
        }
    }

    fn rec(parameter: &str, min: f64, max: f64, integral: bool) -> SweetSpotRecommendation {
        SweetSpotRecommendation {
            category: "caption".into(),
            parameter: parameter.into(),
            min,
            max,
            median: (min + max) / 2.0,
            correlation: 0.4,
            sample_count: 30,
            confidence: Confidence::High,
            integral,
        }
    }

    fn sweet_spot_selection(d: &CategoryDescriptor) -> Selection {
        let mut recommendations = BTreeMap::new();
        recommendations.insert("temperature".to_string(), rec("temperature", 0.6, 0.9, false));
        recommendations.insert("max_tokens".to_string(), rec("max_tokens", 220.0, 280.0, true));
        Selection {
            tier: SelectionTier::SweetSpot,
            parameters: d.defaults.clone(),
            source_attempt: None,
            recommendations,
        }
    }

    #[test]
    fn test_first_attempt_untouched() {
        let d = descriptor(&["question_lead"]);
        let selection = sweet_spot_selection(&d);
        let (params, diversified) = Diversifier::apply(&d, "beam-7", 1, &selection);
        assert!(!diversified);
        assert_eq!(params, selection.parameters);
    }

    #[test]
    fn test_retry_resamples_within_range() {
        let d = descriptor(&[]);
        let selection = sweet_spot_selection(&d);
        for attempt in 2..=6 {
            let (params, diversified) = Diversifier::apply(&d, "beam-7", attempt, &selection);
            assert!(diversified);
            let t = params["temperature"].as_f64().unwrap();
            assert!((0.6..=0.9).contains(&t));
            match params["max_tokens"] {
                ParamValue::Integer(v) => assert!((220..=280).contains(&v)),
                ref other => panic!("max_tokens lost its integer kind: {:?}", other),
            }
        }
    }

    #[test]
    fn test_reproducible_per_subject_and_attempt() {
        let d = descriptor(&["question_lead", "anecdote", "statistic"]);
        let selection = sweet_spot_selection(&d);
        let a = Diversifier::apply(&d, "beam-7", 3, &selection);
        let b = Diversifier::apply(&d, "beam-7", 3, &selection);
        assert_eq!(a, b);
        assert!(a.0.contains_key(STRUCTURAL_VARIANT_PARAM));
    }

    #[test]
    fn test_static_selection_only_varies_structure() {
        let d = descriptor(&["question_lead"]);
        let selection = Selection {
            tier: SelectionTier::StaticDefault,
            parameters: d.defaults.clone(),
            source_attempt: None,
            recommendations: BTreeMap::new(),
        };
        let (params, diversified) = Diversifier::apply(&d, "beam-7", 2, &selection);
        assert!(diversified);
        assert_eq!(params["temperature"], ParamValue::Float(0.8));
        assert_eq!(
            params[STRUCTURAL_VARIANT_PARAM],
            ParamValue::Text("question_lead".into())
        );
    }

    #[test]
    fn test_disabled_diversification() {
        let mut d = descriptor(&["question_lead"]);
        d.diversify = false;
        let selection = sweet_spot_selection(&d);
        let (params, diversified) = Diversifier::apply(&d, "beam-7", 4, &selection);
        assert!(!diversified);
        assert_eq!(params, selection.parameters);
    }

    #[test]
    fn test_fractional_range_survives_integer_default() {
        // `temperature = 1` in TOML parses as an integer
        let mut d = descriptor(&[]);
        d.defaults.insert("temperature".into(), ParamValue::Integer(1));
        let selection = sweet_spot_selection(&d);

        for attempt in 2..=6 {
            let (params, _) = Diversifier::apply(&d, "beam-7", attempt, &selection);
            match params["temperature"] {
                ParamValue::Float(t) => assert!((0.6..=0.9).contains(&t), "{}", t),
                ref other => panic!("temperature rounded to {:?}", other),
            }
            assert!(matches!(params["max_tokens"], ParamValue::Integer(_)));
        }
    }
}
