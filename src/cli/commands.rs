// Command handlers
//
// Each handler returns the text to print on stdout.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs::File;
use std::sync::Arc;

use super::{Command, GateArgs};
use crate::config::GateConfig;
use crate::feedback::{Attempt, AttemptFilter, FeedbackStore};
use crate::generators::{Generator, HttpGenerator, SubjectContext};
use crate::learning::{relaxed_threshold, SweetSpotAnalyzer, ThresholdManager};
use crate::orchestrator::{subjects_from_csv, BatchRunner, BatchSummary, RetryOrchestrator, RunOutcome};

/// Shared handles for command handlers
pub struct CommandContext {
    pub config: Arc<GateConfig>,
    pub store: Arc<FeedbackStore>,
    /// Overrides the configured HTTP generator
    pub generator: Option<Arc<dyn Generator>>,
}

impl CommandContext {
    pub fn new(config: Arc<GateConfig>, store: Arc<FeedbackStore>) -> Self {
        Self {
            config,
            store,
            generator: None,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    fn orchestrator(&self, gate: GateArgs) -> Result<RetryOrchestrator> {
        let generator: Arc<dyn Generator> = match &self.generator {
            Some(generator) => generator.clone(),
            None => Arc::new(HttpGenerator::from_config(&self.config.generator)?),
        };
        let orchestrator =
            RetryOrchestrator::new(self.config.clone(), self.store.clone(), generator)?;
        Ok(if gate.static_threshold {
            orchestrator.with_static_thresholds()
        } else {
            orchestrator
        })
    }
}

pub async fn handle_command(command: Command, ctx: &CommandContext) -> Result<String> {
    match command {
        Command::Run {
            category,
            subject,
            fields,
            gate,
        } => {
            let subject = fields
                .into_iter()
                .fold(SubjectContext::new(subject), |s, (k, v)| s.with_field(k, v));
            run_one(ctx, &category, &subject, gate).await
        }
        Command::Batch {
            category,
            subjects,
            concurrency,
            gate,
        } => {
            let file = File::open(&subjects)
                .with_context(|| format!("Failed to open subjects file {}", subjects.display()))?;
            let subjects = subjects_from_csv(file)?;
            run_batch(ctx, &category, subjects, concurrency, gate).await
        }
        Command::Threshold { category, record } => format_threshold(ctx, &category, record).await,
        Command::SweetSpots { category } => format_sweet_spots(ctx, &category).await,
        Command::History {
            category,
            subject,
            accepted,
            run,
            since,
            until,
            limit,
        } => {
            let mut filter = if accepted {
                AttemptFilter::accepted_only()
            } else {
                AttemptFilter::all()
            };
            filter.subject_id = subject;
            filter.run_id = run;
            filter.since = since;
            filter.until = until;
            format_history(ctx, &category, &filter, limit).await
        }
        Command::Stats { category } => format_stats(ctx, category.as_deref()).await,
        Command::ThresholdsHistory { category } => format_threshold_history(ctx, &category).await,
    }
}

async fn run_one(
    ctx: &CommandContext,
    category: &str,
    subject: &SubjectContext,
    gate: GateArgs,
) -> Result<String> {
    let orchestrator = ctx.orchestrator(gate)?;
    let outcome = orchestrator.run(category, subject).await?;

    if gate.json {
        return Ok(serde_json::to_string_pretty(&outcome)?);
    }
    Ok(format_outcome(&subject.subject_id, &outcome))
}

async fn run_batch(
    ctx: &CommandContext,
    category: &str,
    subjects: Vec<SubjectContext>,
    concurrency: usize,
    gate: GateArgs,
) -> Result<String> {
    // Fail before fanning out if the category is wrong.
    ctx.config.categories.get(category)?;

    let runner = BatchRunner::new(Arc::new(ctx.orchestrator(gate)?), concurrency);
    let mut results = runner.run(category, subjects).await;
    results.sort_by(|a, b| a.subject_id.cmp(&b.subject_id));
    let summary = BatchSummary::from_results(&results);

    if gate.json {
        let entries: Vec<serde_json::Value> = results
            .iter()
            .map(|r| match &r.outcome {
                Ok(outcome) => serde_json::json!({ "subject_id": r.subject_id, "outcome": outcome }),
                Err(e) => serde_json::json!({ "subject_id": r.subject_id, "error": e.to_string() }),
            })
            .collect();
        return Ok(serde_json::to_string_pretty(&serde_json::json!({
            "summary": summary,
            "results": entries,
        }))?);
    }

    let mut output = String::new();
    for result in &results {
        match &result.outcome {
            Ok(outcome) => output.push_str(&format_outcome(&result.subject_id, outcome)),
            Err(e) => writeln!(output, "{}: error: {}", result.subject_id, e)?,
        }
    }
    writeln!(
        output,
        "\n{} subjects: {} accepted ({} bypassed), {} exhausted, {} failed",
        summary.total, summary.accepted, summary.bypassed, summary.exhausted, summary.failed
    )?;
    Ok(output)
}

fn format_outcome(subject_id: &str, outcome: &RunOutcome) -> String {
    let logged = outcome.final_attempt();
    let scores = &logged.attempt.scores;
    format!(
        "{}: {}\n  run {} | composite {:.3} | ai-likeness {:.3} | realism {:.1} | threshold {:.3} | {}\n  {}\n",
        subject_id,
        outcome,
        outcome.run_id(),
        scores.composite,
        scores.ai_likeness,
        scores.realism,
        logged.verdict.threshold,
        logged.attempt.selection_tier,
        logged.content
    )
}

async fn format_threshold(ctx: &CommandContext, category: &str, record: bool) -> Result<String> {
    let descriptor = ctx.config.categories.get(category)?;
    let manager = ThresholdManager::new(ctx.config.clone(), ctx.store.clone());
    let base = if record {
        manager.refresh(category).await?
    } else {
        manager.base_record(category).await?
    };

    let mut output = format!(
        "Threshold for {} ({} metric):\n  base {:.4} | {} | {} successes | {}\n",
        category,
        descriptor.gate_metric,
        base.value,
        if base.learned { "learned" } else { "static default" },
        base.sample_count,
        base.confidence
    );

    output.push_str("\nSchedule:\n");
    for attempt in 1..=descriptor.max_attempts {
        let value = if base.learned {
            relaxed_threshold(base.value, descriptor.relaxation_floor, attempt, descriptor.max_attempts)
        } else {
            base.value
        };
        writeln!(output, "  attempt {}: {:.4}", attempt, value)?;
    }
    Ok(output)
}

async fn format_sweet_spots(ctx: &CommandContext, category: &str) -> Result<String> {
    let analyzer = SweetSpotAnalyzer::new(ctx.config.clone(), ctx.store.clone());
    let report = analyzer.analyze(category).await?;

    let mut output = format!(
        "Sweet spots for {} (top {} of {} attempts):\n",
        category, report.top_count, report.sample_count
    );

    if report.recommendations.is_empty() {
        output.push_str("  (not enough data)\n");
    }
    for rec in report.recommendations.values() {
        writeln!(
            output,
            "  {:<20} [{:.4}, {:.4}] median {:.4} | r={:+.3} | {}",
            rec.parameter, rec.min, rec.max, rec.median, rec.correlation, rec.confidence
        )?;
    }

    if !report.excluded.is_empty() {
        output.push_str("\nExcluded (negatively correlated with quality):\n");
        for excluded in &report.excluded {
            writeln!(
                output,
                "  {:<20} r={:+.3} over {} attempts",
                excluded.parameter, excluded.correlation, excluded.sample_count
            )?;
        }
    }
    Ok(output)
}

async fn format_history(
    ctx: &CommandContext,
    category: &str,
    filter: &AttemptFilter,
    limit: Option<usize>,
) -> Result<String> {
    ctx.config.categories.get(category)?;
    let attempts = ctx.store.query(category, filter).await?;
    let skip = limit.map_or(0, |n| attempts.len().saturating_sub(n));

    let mut output = format!("{} attempts for {}:\n", attempts.len(), category);
    for attempt in attempts.iter().skip(skip) {
        output.push_str(&format_attempt(attempt));
    }
    Ok(output)
}

fn format_attempt(attempt: &Attempt) -> String {
    let params: Vec<String> = attempt
        .parameters
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    format!(
        "  {} {} {}/{} #{} {} composite {:.3} (threshold {:.3}) {}{} [{}]\n",
        attempt.id.map(|id| id.to_string()).unwrap_or_default(),
        attempt.timestamp.format("%Y-%m-%d %H:%M:%S"),
        attempt.category,
        attempt.subject_id,
        attempt.attempt_number,
        if attempt.accepted { "ACCEPT" } else { "reject" },
        attempt.scores.composite,
        attempt.applied_threshold,
        attempt.selection_tier,
        if attempt.diversified { "+diversified" } else { "" },
        params.join(", ")
    )
}

async fn format_stats(ctx: &CommandContext, category: Option<&str>) -> Result<String> {
    let categories: Vec<String> = match category {
        Some(name) => {
            ctx.config.categories.get(name)?;
            vec![name.to_string()]
        }
        // Logged categories that were since removed from the config still show up
        None => {
            let mut names: BTreeSet<String> =
                ctx.config.categories.names().map(str::to_string).collect();
            names.extend(ctx.store.categories().await?);
            names.into_iter().collect()
        }
    };

    let mut output = String::from("Category statistics:\n");
    for name in categories {
        let summary = ctx.store.summary(&name).await?;
        writeln!(
            output,
            "  {}: {} attempts over {} subjects, {} accepted ({:.1}%), mean composite {:.3}, best {:.3}",
            name,
            summary.total_attempts,
            summary.subjects,
            summary.accepted,
            summary.acceptance_rate * 100.0,
            summary.mean_composite,
            summary.best_composite
        )?;
        for (tier, count) in &summary.tier_counts {
            writeln!(output, "    {}: {}", tier, count)?;
        }
    }
    Ok(output)
}

async fn format_threshold_history(ctx: &CommandContext, category: &str) -> Result<String> {
    ctx.config.categories.get(category)?;
    let history = ctx.store.threshold_history(category).await?;

    let mut output = format!("Threshold history for {}:\n", category);
    if history.is_empty() {
        output.push_str("  (none recorded)\n");
    }
    for record in history {
        writeln!(
            output,
            "  {} {:.4} | {} | {} samples{}",
            record.computed_at.format("%Y-%m-%d %H:%M:%S"),
            record.value,
            record.confidence,
            record.sample_count,
            if record.learned { "" } else { " | static default" }
        )?;
    }
    Ok(output)
}

/// `key=value` context field
pub fn parse_field(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// RFC 3339 timestamp, or a bare date meaning midnight UTC
pub fn parse_since(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("expected RFC 3339 timestamp or YYYY-MM-DD, got '{}'", raw))
}
