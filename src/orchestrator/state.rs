// Attempt state machine
//
//   SelectParams -> Generate -> Log -> Evaluate -> Accept
//                                         |-----> Retry -> SelectParams
//                                         '-----> Exhausted
//
// Log always precedes Evaluate: an attempt is durable before the loop decides
// what to do with it.

use serde::Serialize;

use crate::config::CategoryDescriptor;
use crate::feedback::{Attempt, ParameterSet, Scores, SelectionTier};
use crate::generators::GenerationOutput;

/// Parameters ready to send for one attempt
#[derive(Debug, Clone)]
pub struct PreparedAttempt {
    pub tier: SelectionTier,
    pub parameters: ParameterSet,
    pub diversified: bool,
}

/// Generator output not yet written to the log
#[derive(Debug, Clone)]
pub struct GeneratedAttempt {
    pub prepared: PreparedAttempt,
    pub output: GenerationOutput,
}

/// Gate checks for one attempt
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GateVerdict {
    pub threshold: f64,
    pub gate_value: f64,
    pub threshold_passed: bool,
    /// `true` when the category has no realism floor
    pub realism_passed: bool,
}

impl GateVerdict {
    pub fn evaluate(descriptor: &CategoryDescriptor, scores: &Scores, threshold: f64) -> Self {
        let gate_value = scores.gate_value(descriptor.gate_metric);
        Self {
            threshold,
            gate_value,
            threshold_passed: gate_value >= threshold,
            realism_passed: descriptor
                .min_realism
                .map_or(true, |floor| scores.realism >= floor),
        }
    }

    pub fn passed(&self) -> bool {
        self.threshold_passed && self.realism_passed
    }
}

/// A logged attempt together with its content
#[derive(Debug, Clone, Serialize)]
pub struct LoggedAttempt {
    pub attempt: Attempt,
    pub content: String,
    pub verdict: GateVerdict,
}

impl LoggedAttempt {
    pub fn composite(&self) -> f64 {
        self.attempt.scores.composite
    }
}

#[derive(Debug)]
pub enum AttemptState {
    SelectParams,
    Generate(PreparedAttempt),
    Log(GeneratedAttempt),
    Evaluate(LoggedAttempt),
    Retry,
    Accept(LoggedAttempt),
    Exhausted(LoggedAttempt),
}

impl AttemptState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SelectParams => "select_params",
            Self::Generate(_) => "generate",
            Self::Log(_) => "log",
            Self::Evaluate(_) => "evaluate",
            Self::Retry => "retry",
            Self::Accept(_) => "accept",
            Self::Exhausted(_) => "exhausted",
        }
    }
}
