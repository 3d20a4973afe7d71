// Batch runs over many subjects
//
// Subjects are independent, so their runs overlap up to `concurrency` at a time.
// A failure on one subject is reported with that subject and does not stop the
// rest.

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use super::runner::{RetryOrchestrator, RunOutcome};
use crate::errors::GateResult;
use crate::generators::SubjectContext;

const SUBJECT_ID_COLUMN: &str = "subject_id";

pub struct SubjectResult {
    pub subject_id: String,
    pub outcome: GateResult<RunOutcome>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub accepted: usize,
    pub exhausted: usize,
    pub failed: usize,
    pub bypassed: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[SubjectResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };
        for result in results {
            match &result.outcome {
                Ok(RunOutcome::Accepted { bypassed, .. }) => {
                    summary.accepted += 1;
                    if *bypassed {
                        summary.bypassed += 1;
                    }
                }
                Ok(RunOutcome::Exhausted { .. }) => summary.exhausted += 1,
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }
}

pub struct BatchRunner {
    orchestrator: Arc<RetryOrchestrator>,
    concurrency: usize,
}

impl BatchRunner {
    pub fn new(orchestrator: Arc<RetryOrchestrator>, concurrency: usize) -> Self {
        Self {
            orchestrator,
            concurrency: concurrency.max(1),
        }
    }

    /// Run every subject; results come back in completion order.
    pub async fn run(&self, category: &str, subjects: Vec<SubjectContext>) -> Vec<SubjectResult> {
        tracing::info!(
            "Batch of {} subjects for {} (concurrency {})",
            subjects.len(),
            category,
            self.concurrency
        );

        stream::iter(subjects)
            .map(|subject| {
                let orchestrator = self.orchestrator.clone();
                async move {
                    let outcome = orchestrator.run(category, &subject).await;
                    if let Err(e) = &outcome {
                        tracing::error!("Subject {} failed: {}", subject.subject_id, e);
                    }
                    SubjectResult {
                        subject_id: subject.subject_id,
                        outcome,
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}

/// Read subjects from CSV with a header row. `subject_id` is required; every
/// other non-empty column becomes a context field.
pub fn subjects_from_csv<R: Read>(reader: R) -> Result<Vec<SubjectContext>> {
    let mut csv = csv::Reader::from_reader(reader);
    let headers = csv.headers().context("Failed to read CSV header")?.clone();

    let id_index = headers
        .iter()
        .position(|h| h.trim() == SUBJECT_ID_COLUMN)
        .with_context(|| format!("CSV is missing a '{}' column", SUBJECT_ID_COLUMN))?;

    let mut subjects = Vec::new();
    for (line, record) in csv.records().enumerate() {
        let record = record.with_context(|| format!("Malformed CSV record {}", line + 1))?;

        let subject_id = record.get(id_index).unwrap_or_default().trim();
        if subject_id.is_empty() {
            anyhow::bail!("CSV record {} has an empty {}", line + 1, SUBJECT_ID_COLUMN);
        }

        let fields: BTreeMap<String, String> = headers
            .iter()
            .zip(record.iter())
            .enumerate()
            .filter(|(i, (_, value))| *i != id_index && !value.trim().is_empty())
            .map(|(_, (key, value))| (key.trim().to_string(), value.trim().to_string()))
            .collect();

        subjects.push(SubjectContext {
            subject_id: subject_id.to_string(),
            fields,
        });
    }

    Ok(subjects)
}
