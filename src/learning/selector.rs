// Three-tier parameter selection
//
//   1. exact replay    - best successful snapshot for this (category, subject)
//   2. sweet spot      - medians of trusted, correlation-filtered ranges
//   3. static default  - the category's configured parameter set
//
// The first tier that produces a result is used on its own.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::sweet_spot::{SweetSpotAnalyzer, SweetSpotRecommendation};
use crate::config::GateConfig;
use crate::errors::GateResult;
use crate::feedback::{AttemptFilter, AttemptId, FeedbackStore, ParameterSet, SelectionTier};

/// Parameters chosen for one attempt, and where they came from
#[derive(Debug, Clone)]
pub struct Selection {
    pub tier: SelectionTier,
    pub parameters: ParameterSet,
    /// Attempt replayed by tier 1
    pub source_attempt: Option<AttemptId>,
    /// Ranges backing a tier 2 selection (empty otherwise)
    pub recommendations: BTreeMap<String, SweetSpotRecommendation>,
}

pub struct ParameterSelector {
    config: Arc<GateConfig>,
    store: Arc<FeedbackStore>,
    analyzer: SweetSpotAnalyzer,
}

impl ParameterSelector {
    pub fn new(config: Arc<GateConfig>, store: Arc<FeedbackStore>) -> Self {
        let analyzer = SweetSpotAnalyzer::new(config.clone(), store.clone());
        Self {
            config,
            store,
            analyzer,
        }
    }

    pub async fn select(&self, category: &str, subject_id: &str) -> GateResult<Selection> {
        let selection = match self.exact_replay(category, subject_id).await? {
            Some(selection) => selection,
            None => match self.sweet_spot(category).await? {
                Some(selection) => selection,
                None => self.static_default(category)?,
            },
        };

        tracing::debug!(
            "Selected {} parameters for {}/{}: {:?}",
            selection.tier,
            category,
            subject_id,
            selection.parameters
        );
        Ok(selection)
    }

    /// Tier 1. Highest composite wins; ties go to the most recent attempt.
    async fn exact_replay(&self, category: &str, subject_id: &str) -> GateResult<Option<Selection>> {
        let successes = self
            .store
            .query(category, &AttemptFilter::accepted_only().for_subject(subject_id))
            .await?;

        let best = successes.into_iter().reduce(|best, candidate| {
            if candidate.scores.composite >= best.scores.composite {
                candidate
            } else {
                best
            }
        });

        Ok(best.map(|attempt| Selection {
            tier: SelectionTier::ExactReplay,
            parameters: attempt.parameters,
            source_attempt: attempt.id,
            recommendations: BTreeMap::new(),
        }))
    }

    /// Tier 2. Requires trusted recommendations and enough exploration data.
    async fn sweet_spot(&self, category: &str) -> GateResult<Option<Selection>> {
        let descriptor = self.config.categories.get(category)?;

        let total = self.store.count(category, &AttemptFilter::all()).await?;
        if total < descriptor.exploration_min_samples() {
            tracing::debug!(
                "Still exploring {}: {} attempts < {} required for sweet spots",
                category,
                total,
                descriptor.exploration_min_samples()
            );
            return Ok(None);
        }

        let recommendations = self.analyzer.recommend(category).await?;
        if recommendations.is_empty()
            || !recommendations.values().all(|r| r.confidence.is_trusted())
        {
            return Ok(None);
        }

        // Knobs without a recommendation keep their configured default.
        // Fractional observations stay fractional even under an integer default.
        let mut parameters = descriptor.defaults.clone();
        for (name, rec) in &recommendations {
            let value = match descriptor.defaults.get(name) {
                Some(default) if rec.integral && default.is_numeric() => {
                    default.with_numeric(rec.median)
                }
                _ => rec.value_at(rec.median),
            };
            parameters.insert(name.clone(), value);
        }

        Ok(Some(Selection {
            tier: SelectionTier::SweetSpot,
            parameters,
            source_attempt: None,
            recommendations,
        }))
    }

    /// Tier 3
    fn static_default(&self, category: &str) -> GateResult<Selection> {
        let descriptor = self.config.categories.get(category)?;
        Ok(Selection {
            tier: SelectionTier::StaticDefault,
            parameters: descriptor.defaults.clone(),
            source_attempt: None,
            recommendations: BTreeMap::new(),
        })
    }
}
