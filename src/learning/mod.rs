// Learning module
//
// Stateless readers over the attempt log:
// - ThresholdManager: learned acceptance threshold + per-attempt relaxation
// - SweetSpotAnalyzer: correlation-filtered parameter ranges from top performers
// - ParameterSelector: exact replay -> sweet spot -> static default
// - Diversifier: seeded variation of retries

mod diversify;
mod selector;
pub mod stats;
mod sweet_spot;
mod threshold;

pub use diversify::Diversifier;
pub use selector::{ParameterSelector, Selection};
pub use sweet_spot::{
    analyze_attempts, ExcludedParameter, SweetSpotAnalyzer, SweetSpotRecommendation,
    SweetSpotReport,
};
pub use threshold::{learned_record, relaxed_threshold, AppliedThreshold, ThresholdManager};
