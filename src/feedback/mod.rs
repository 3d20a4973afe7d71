// Feedback module
//
// The append-only attempt log every learning decision is derived from.
// - `FeedbackStore` owns the log (SQLite, durable appends, serialized writers)
// - Threshold and sweet-spot records are recomputed from it on demand

mod store;
mod types;

pub use store::FeedbackStore;
pub use types::{
    Attempt, AttemptFilter, AttemptId, CategorySummary, Confidence, ParamValue, ParameterSet,
    Scores, SelectionTier, ThresholdRecord,
};
