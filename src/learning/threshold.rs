// Adaptive acceptance threshold
//
// Base threshold: 75th percentile of successful gate scores x safety factor,
// clamped into the category bounds. Falls back to the static default until the
// category has `min_samples` successes.
//
// Applied threshold: relaxes linearly from the base (attempt 1) to the quality
// floor (final attempt).

use chrono::Utc;
use std::sync::Arc;

use super::stats::percentile;
use crate::config::{CategoryDescriptor, GateConfig};
use crate::errors::GateResult;
use crate::feedback::{AttemptFilter, Confidence, FeedbackStore, ThresholdRecord};

/// Threshold in force for one attempt
#[derive(Debug, Clone)]
pub struct AppliedThreshold {
    pub value: f64,
    pub base: ThresholdRecord,
    pub floor: f64,
    pub attempt_number: u32,
    pub max_attempts: u32,
}

/// Derives acceptance thresholds from the attempt log. Holds no state of its own.
pub struct ThresholdManager {
    config: Arc<GateConfig>,
    store: Arc<FeedbackStore>,
}

impl ThresholdManager {
    pub fn new(config: Arc<GateConfig>, store: Arc<FeedbackStore>) -> Self {
        Self { config, store }
    }

    /// Threshold to apply on `attempt_number` (1-indexed) of `max_attempts`.
    ///
    /// With `use_learned == false` the static default is returned unconditionally.
    pub async fn get_threshold(
        &self,
        category: &str,
        attempt_number: u32,
        max_attempts: u32,
        use_learned: bool,
    ) -> GateResult<f64> {
        Ok(self
            .applied(category, attempt_number, max_attempts, use_learned)
            .await?
            .value)
    }

    /// Like [`get_threshold`](Self::get_threshold), with the base record attached.
    pub async fn applied(
        &self,
        category: &str,
        attempt_number: u32,
        max_attempts: u32,
        use_learned: bool,
    ) -> GateResult<AppliedThreshold> {
        let base = if use_learned {
            self.base_record(category).await?
        } else {
            static_record(self.config.categories.get(category)?, 0)
        };
        self.applied_from(&base, attempt_number, max_attempts)
    }

    /// Threshold for `attempt_number` derived from a fixed base record.
    ///
    /// A run takes its base once and schedules every attempt from it, so
    /// successes logged by concurrent runs cannot raise the bar mid-run.
    pub fn applied_from(
        &self,
        base: &ThresholdRecord,
        attempt_number: u32,
        max_attempts: u32,
    ) -> GateResult<AppliedThreshold> {
        let descriptor = self.config.categories.get(&base.category)?;

        // Relaxation only runs on learned thresholds; the static default is
        // returned exactly as configured.
        let value = if base.learned {
            relaxed_threshold(
                base.value,
                descriptor.relaxation_floor,
                attempt_number,
                max_attempts,
            )
        } else {
            base.value
        };

        tracing::debug!(
            "Threshold for {} attempt {}/{}: {:.4} (base {:.4}, {} confidence, n={})",
            base.category,
            attempt_number,
            max_attempts,
            value,
            base.value,
            base.confidence,
            base.sample_count
        );

        Ok(AppliedThreshold {
            value,
            floor: descriptor.relaxation_floor,
            base: base.clone(),
            attempt_number,
            max_attempts,
        })
    }

    /// Base record a run gates on. Learned bases are recorded in the audit
    /// trail; the static override is not.
    pub async fn base_for_run(
        &self,
        category: &str,
        use_learned: bool,
    ) -> GateResult<ThresholdRecord> {
        if use_learned {
            self.refresh(category).await
        } else {
            Ok(static_record(self.config.categories.get(category)?, 0))
        }
    }

    /// Compute the base threshold record for `category` from the log.
    pub async fn base_record(&self, category: &str) -> GateResult<ThresholdRecord> {
        let descriptor = self.config.categories.get(category)?;
        let successes = self
            .store
            .query(category, &AttemptFilter::accepted_only())
            .await?;

        let scores: Vec<f64> = successes
            .iter()
            .map(|a| a.scores.gate_value(descriptor.gate_metric))
            .collect();

        Ok(learned_record(descriptor, &scores))
    }

    /// Recompute the base record and append it to the audit trail.
    pub async fn refresh(&self, category: &str) -> GateResult<ThresholdRecord> {
        let record = self.base_record(category).await?;
        self.store.record_threshold(&record).await?;
        tracing::info!(
            "Threshold for {}: {:.4} ({}, {} samples{})",
            category,
            record.value,
            record.confidence,
            record.sample_count,
            if record.learned { "" } else { ", static default" }
        );
        Ok(record)
    }
}

fn static_record(descriptor: &CategoryDescriptor, sample_count: usize) -> ThresholdRecord {
    ThresholdRecord {
        category: descriptor.name.clone(),
        value: descriptor.default_threshold,
        sample_count,
        confidence: Confidence::Insufficient,
        learned: false,
        computed_at: Utc::now(),
    }
}

/// Base record from the gate scores of successful attempts.
pub fn learned_record(descriptor: &CategoryDescriptor, success_scores: &[f64]) -> ThresholdRecord {
    let n = success_scores.len();
    if n < descriptor.min_samples {
        return static_record(descriptor, n);
    }

    let Some(empirical) = percentile(success_scores, descriptor.percentile) else {
        return static_record(descriptor, n);
    };

    let value = (empirical * descriptor.safety_factor).clamp(descriptor.min_bound, descriptor.max_bound);

    ThresholdRecord {
        category: descriptor.name.clone(),
        value,
        sample_count: n,
        confidence: Confidence::from_samples(
            n,
            descriptor.min_samples,
            descriptor.high_confidence_samples,
        ),
        learned: true,
        computed_at: Utc::now(),
    }
}

/// Linear relaxation from `base` on attempt 1 to `floor` on the last attempt.
///
/// Never returns less than `floor`, and never more than `base`.
pub fn relaxed_threshold(base: f64, floor: f64, attempt_number: u32, max_attempts: u32) -> f64 {
    let floor = floor.min(base);
    if max_attempts <= 1 || attempt_number <= 1 {
        return base;
    }
    if attempt_number >= max_attempts {
        return floor;
    }

    let progress = (attempt_number - 1) as f64 / (max_attempts - 1) as f64;
    (base - (base - floor) * progress).clamp(floor, base)
}
