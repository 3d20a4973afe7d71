// Orchestrator module
//
// Drives the select -> generate -> log -> evaluate loop for one subject, and
// fans it out across many subjects.

mod batch;
pub mod retry;
mod runner;
mod state;

pub use batch::{subjects_from_csv, BatchRunner, BatchSummary, SubjectResult};
pub use retry::{with_transient_retry, TransientRetryPolicy};
pub use runner::{content_hash, RetryOrchestrator, RunOutcome};
pub use state::{AttemptState, GateVerdict, GeneratedAttempt, LoggedAttempt, PreparedAttempt};
