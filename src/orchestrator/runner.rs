// Quality-gated generation loop
//
// One `run` drives a subject through at most `max_attempts` quality attempts.
// Every scored attempt is logged before it is judged. Transient generator
// failures are retried inside an attempt and never logged.

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::retry::{with_transient_retry, TransientRetryPolicy};
use super::state::{AttemptState, GateVerdict, GeneratedAttempt, LoggedAttempt, PreparedAttempt};
use crate::config::{Environment, GateConfig};
use crate::errors::{GateError, GateResult};
use crate::feedback::{Attempt, FeedbackStore, Scores};
use crate::generators::{GenerationRequest, Generator, SubjectContext};
use crate::learning::{Diversifier, ParameterSelector, ThresholdManager};

/// Result of one gated run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Accepted {
        run_id: Uuid,
        attempts_used: u32,
        /// Accepted only because gating was bypassed
        bypassed: bool,
        result: LoggedAttempt,
    },
    /// Every attempt missed the gate; carries the highest-composite attempt
    Exhausted {
        run_id: Uuid,
        attempts_used: u32,
        best: LoggedAttempt,
    },
}

impl RunOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn run_id(&self) -> Uuid {
        match self {
            Self::Accepted { run_id, .. } | Self::Exhausted { run_id, .. } => *run_id,
        }
    }

    pub fn attempts_used(&self) -> u32 {
        match self {
            Self::Accepted { attempts_used, .. } | Self::Exhausted { attempts_used, .. } => {
                *attempts_used
            }
        }
    }

    /// The accepted attempt, or the best rejected one
    pub fn final_attempt(&self) -> &LoggedAttempt {
        match self {
            Self::Accepted { result, .. } => result,
            Self::Exhausted { best, .. } => best,
        }
    }

    pub fn content(&self) -> &str {
        &self.final_attempt().content
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted {
                attempts_used,
                bypassed: true,
                ..
            } => write!(f, "accepted without gating after {} attempt(s)", attempts_used),
            Self::Accepted { attempts_used, .. } => {
                write!(f, "accepted after {} attempt(s)", attempts_used)
            }
            Self::Exhausted {
                attempts_used,
                best,
                ..
            } => write!(
                f,
                "did not meet quality threshold after {} attempt(s) (best composite {:.3})",
                attempts_used,
                best.composite()
            ),
        }
    }
}

pub struct RetryOrchestrator {
    config: Arc<GateConfig>,
    store: Arc<FeedbackStore>,
    generator: Arc<dyn Generator>,
    selector: ParameterSelector,
    thresholds: ThresholdManager,
    retry_policy: TransientRetryPolicy,
    use_learned_thresholds: bool,
}

impl RetryOrchestrator {
    pub fn new(
        config: Arc<GateConfig>,
        store: Arc<FeedbackStore>,
        generator: Arc<dyn Generator>,
    ) -> GateResult<Self> {
        if config.bypass_gating && config.environment == Environment::Production {
            return Err(GateError::BypassInProduction);
        }

        Ok(Self {
            selector: ParameterSelector::new(config.clone(), store.clone()),
            thresholds: ThresholdManager::new(config.clone(), store.clone()),
            retry_policy: TransientRetryPolicy::from_config(&config.generator),
            use_learned_thresholds: true,
            config,
            store,
            generator,
        })
    }

    /// Gate on each category's static default instead of the learned threshold.
    pub fn with_static_thresholds(mut self) -> Self {
        self.use_learned_thresholds = false;
        self
    }

    pub fn with_retry_policy(mut self, policy: TransientRetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn store(&self) -> &Arc<FeedbackStore> {
        &self.store
    }

    pub async fn run(&self, category: &str, subject: &SubjectContext) -> GateResult<RunOutcome> {
        let descriptor = self.config.categories.get(category)?;
        let max_attempts = descriptor.max_attempts;
        let subject_id = subject.subject_id.as_str();
        let run_id = Uuid::new_v4();

        if self.config.bypass_gating {
            tracing::warn!("==================================================");
            tracing::warn!("QUALITY GATING BYPASSED for {}/{}", category, subject_id);
            tracing::warn!("The first generated attempt will be accepted as-is");
            tracing::warn!("==================================================");
        }

        let base = self
            .thresholds
            .base_for_run(category, self.use_learned_thresholds)
            .await?;

        tracing::info!(
            "Run {} started for {}/{} (max {} attempts, generator {})",
            run_id,
            category,
            subject_id,
            max_attempts,
            self.generator.name()
        );

        let mut attempt_number = 1;
        let mut best: Option<LoggedAttempt> = None;
        let mut state = AttemptState::SelectParams;

        loop {
            tracing::debug!("{}/{} attempt {}: {}", category, subject_id, attempt_number, state.name());

            state = match state {
                AttemptState::SelectParams => {
                    let selection = self.selector.select(category, subject_id).await?;
                    let (parameters, diversified) =
                        Diversifier::apply(descriptor, subject_id, attempt_number, &selection);
                    AttemptState::Generate(PreparedAttempt {
                        tier: selection.tier,
                        parameters,
                        diversified,
                    })
                }

                AttemptState::Generate(prepared) => {
                    let request = GenerationRequest {
                        category: category.to_string(),
                        subject_id: subject_id.to_string(),
                        context: subject.fields.clone(),
                        parameters: prepared.parameters.clone(),
                        attempt_number,
                    };
                    let output =
                        with_transient_retry(&self.retry_policy, || self.generator.generate(&request))
                            .await?;
                    AttemptState::Log(GeneratedAttempt { prepared, output })
                }

                AttemptState::Log(generated) => {
                    let GeneratedAttempt { prepared, output } = generated;
                    let scores = Scores::from_oracles(
                        output.ai_likeness_score,
                        output.realism_score,
                        &descriptor.weights,
                    )?;

                    let applied = self
                        .thresholds
                        .applied_from(&base, attempt_number, max_attempts)?;
                    let verdict = GateVerdict::evaluate(descriptor, &scores, applied.value);

                    let mut attempt = Attempt {
                        id: None,
                        run_id,
                        category: category.to_string(),
                        subject_id: subject_id.to_string(),
                        attempt_number,
                        parameters: prepared.parameters,
                        scores,
                        selection_tier: prepared.tier,
                        diversified: prepared.diversified,
                        applied_threshold: applied.value,
                        accepted: verdict.passed(),
                        content_hash: content_hash(&output.content),
                        content_length: output.content.chars().count(),
                        timestamp: Utc::now(),
                    };
                    attempt.id = Some(self.store.append(&attempt).await?);

                    AttemptState::Evaluate(LoggedAttempt {
                        attempt,
                        content: output.content,
                        verdict,
                    })
                }

                AttemptState::Evaluate(logged) => {
                    tracing::info!(
                        "{}/{} attempt {}/{}: {} {:.3} vs threshold {:.3}, realism {:.1} [{}]",
                        category,
                        subject_id,
                        attempt_number,
                        max_attempts,
                        descriptor.gate_metric,
                        logged.verdict.gate_value,
                        logged.verdict.threshold,
                        logged.attempt.scores.realism,
                        if logged.verdict.passed() { "pass" } else { "fail" }
                    );

                    if logged.verdict.passed() || self.config.bypass_gating {
                        AttemptState::Accept(logged)
                    } else {
                        let best_so_far = match best.take() {
                            Some(prev) if prev.composite() >= logged.composite() => prev,
                            _ => logged,
                        };
                        if attempt_number >= max_attempts {
                            AttemptState::Exhausted(best_so_far)
                        } else {
                            best = Some(best_so_far);
                            AttemptState::Retry
                        }
                    }
                }

                AttemptState::Retry => {
                    attempt_number += 1;
                    AttemptState::SelectParams
                }

                AttemptState::Accept(result) => {
                    let bypassed = !result.verdict.passed();
                    tracing::info!(
                        "Run {} accepted {}/{} on attempt {}{}",
                        run_id,
                        category,
                        subject_id,
                        attempt_number,
                        if bypassed { " (gating bypassed)" } else { "" }
                    );
                    return Ok(RunOutcome::Accepted {
                        run_id,
                        attempts_used: attempt_number,
                        bypassed,
                        result,
                    });
                }

                AttemptState::Exhausted(best_attempt) => {
                    tracing::warn!(
                        "Run {} for {}/{} did not meet quality threshold after {} attempts (best composite {:.3})",
                        run_id,
                        category,
                        subject_id,
                        attempt_number,
                        best_attempt.composite()
                    );
                    return Ok(RunOutcome::Exhausted {
                        run_id,
                        attempts_used: attempt_number,
                        best: best_attempt,
                    });
                }
            };
        }
    }
}

/// Hex SHA-256 of generated content; the log keeps the hash, not the text.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
