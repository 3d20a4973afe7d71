// Append-only attempt log backed by SQLite
//
// - WAL journal with synchronous=FULL, so an append is durable once it returns
// - One connection behind an async mutex serializes writers from concurrent runs
// - Triggers in schema.sql reject UPDATE/DELETE; this type exposes neither

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::path::Path;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::types::{
    Attempt, AttemptFilter, AttemptId, CategorySummary, Confidence, Scores, ThresholdRecord,
};
use crate::errors::StorageError;

const ATTEMPT_COLUMNS: &str = "id, run_id, category, subject_id, attempt_number, parameters, \
     ai_likeness, human_likeness, realism, composite, selection_tier, diversified, \
     applied_threshold, accepted, content_hash, content_length, created_at";

/// Exclusive owner of the attempt log
pub struct FeedbackStore {
    db: Mutex<Connection>,
    location: String,
}

impl FeedbackStore {
    /// Open (or create) the attempt log at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let unavailable = |reason: String| StorageError::Unavailable {
            path: path.display().to_string(),
            reason,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| unavailable(e.to_string()))?;
            }
        }

        let conn = Connection::open(path).map_err(|e| unavailable(e.to_string()))?;
        Self::init(conn, path.display().to_string())
    }

    /// Volatile store for tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|e| StorageError::Unavailable {
            path: ":memory:".to_string(),
            reason: e.to_string(),
        })?;
        Self::init(conn, ":memory:".to_string())
    }

    fn init(conn: Connection, location: String) -> Result<Self, StorageError> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA synchronous=FULL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let schema = include_str!("schema.sql");
        conn.execute_batch(schema)?;

        tracing::info!("Feedback store initialized: {}", location);

        Ok(Self {
            db: Mutex::new(conn),
            location,
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Durably append one attempt and return its id.
    pub async fn append(&self, attempt: &Attempt) -> Result<AttemptId, StorageError> {
        let parameters = serde_json::to_string(&attempt.parameters)?;
        let created_at = nanos(&attempt.timestamp)?;

        let conn = self.db.lock().await;
        let result = conn.execute(
            "INSERT INTO attempts (run_id, category, subject_id, attempt_number, parameters,
                 ai_likeness, human_likeness, realism, composite, selection_tier, diversified,
                 applied_threshold, accepted, content_hash, content_length, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                attempt.run_id.to_string(),
                &attempt.category,
                &attempt.subject_id,
                attempt.attempt_number,
                parameters,
                attempt.scores.ai_likeness,
                attempt.scores.human_likeness,
                attempt.scores.realism,
                attempt.scores.composite,
                attempt.selection_tier.as_str(),
                attempt.diversified,
                attempt.applied_threshold,
                attempt.accepted,
                &attempt.content_hash,
                attempt.content_length as i64,
                created_at,
            ],
        );

        match result {
            Ok(_) => {
                let id = AttemptId(conn.last_insert_rowid());
                tracing::debug!(
                    "Logged attempt {} ({}/{} #{} accepted={})",
                    id,
                    attempt.category,
                    attempt.subject_id,
                    attempt.attempt_number,
                    attempt.accepted
                );
                Ok(id)
            }
            // Only the natural-key index means "already logged"; CHECK failures
            // are malformed rows and surface as plain SQLite errors.
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Err(StorageError::AppendOnlyViolation(format!(
                    "attempt {} for {}/{} in run {} is already logged",
                    attempt.attempt_number, attempt.category, attempt.subject_id, attempt.run_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Attempts in `category` matching `filter`, oldest first.
    pub async fn query(
        &self,
        category: &str,
        filter: &AttemptFilter,
    ) -> Result<Vec<Attempt>, StorageError> {
        let (clause, values) = where_clause(category, filter)?;
        let sql = format!(
            "SELECT {} FROM attempts WHERE {} ORDER BY created_at ASC, id ASC",
            ATTEMPT_COLUMNS, clause
        );

        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<AttemptRow> = stmt
            .query_map(params_from_iter(values.iter()), AttemptRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        rows.into_iter().map(AttemptRow::into_attempt).collect()
    }

    /// Number of attempts in `category` matching `filter`.
    pub async fn count(&self, category: &str, filter: &AttemptFilter) -> Result<usize, StorageError> {
        let (clause, values) = where_clause(category, filter)?;
        let sql = format!("SELECT COUNT(*) FROM attempts WHERE {}", clause);

        let conn = self.db.lock().await;
        let count: i64 = conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Categories that have at least one logged attempt.
    pub async fn categories(&self) -> Result<Vec<String>, StorageError> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare("SELECT DISTINCT category FROM attempts ORDER BY category")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Aggregate statistics for one category.
    pub async fn summary(&self, category: &str) -> Result<CategorySummary, StorageError> {
        let conn = self.db.lock().await;

        let (total, accepted, mean, best, subjects): (i64, i64, f64, f64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(accepted), 0), COALESCE(AVG(composite), 0.0),
                    COALESCE(MAX(composite), 0.0), COUNT(DISTINCT subject_id)
             FROM attempts WHERE category = ?1",
            [category],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )?;

        let mut stmt = conn.prepare(
            "SELECT selection_tier, COUNT(*) FROM attempts WHERE category = ?1
             GROUP BY selection_tier",
        )?;
        let tier_counts = stmt
            .query_map([category], |row| {
                let tier: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((tier, count as usize))
            })?
            .collect::<Result<_, _>>()?;

        let total = total as usize;
        let accepted = accepted as usize;
        Ok(CategorySummary {
            total_attempts: total,
            accepted,
            acceptance_rate: if total == 0 {
                0.0
            } else {
                accepted as f64 / total as f64
            },
            mean_composite: mean,
            best_composite: best,
            subjects: subjects as usize,
            tier_counts,
        })
    }

    /// Append a computed threshold to the audit trail.
    pub async fn record_threshold(&self, record: &ThresholdRecord) -> Result<i64, StorageError> {
        let computed_at = nanos(&record.computed_at)?;
        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO threshold_history (category, value, sample_count, confidence, learned, computed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &record.category,
                record.value,
                record.sample_count as i64,
                record.confidence.as_str(),
                record.learned,
                computed_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Every threshold ever recorded for `category`, oldest first.
    pub async fn threshold_history(
        &self,
        category: &str,
    ) -> Result<Vec<ThresholdRecord>, StorageError> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, category, value, sample_count, confidence, learned, computed_at
             FROM threshold_history WHERE category = ?1
             ORDER BY computed_at ASC, id ASC",
        )?;

        let rows: Vec<(i64, String, f64, i64, String, bool, i64)> = stmt
            .query_map([category], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            })?
            .collect::<Result<_, _>>()?;

        rows.into_iter()
            .map(|(id, category, value, samples, confidence, learned, computed_at)| {
                let confidence: Confidence = confidence
                    .parse()
                    .map_err(|reason| StorageError::CorruptRecord { id, reason })?;
                Ok(ThresholdRecord {
                    category,
                    value,
                    sample_count: samples as usize,
                    confidence,
                    learned,
                    computed_at: Utc.timestamp_nanos(computed_at),
                })
            })
            .collect()
    }
}

fn nanos(timestamp: &DateTime<Utc>) -> Result<i64, StorageError> {
    timestamp
        .timestamp_nanos_opt()
        .ok_or_else(|| StorageError::InvalidTimestamp(timestamp.to_rfc3339()))
}

fn where_clause(
    category: &str,
    filter: &AttemptFilter,
) -> Result<(String, Vec<Value>), StorageError> {
    let mut clauses = vec!["category = ?".to_string()];
    let mut values = vec![Value::Text(category.to_string())];

    if let Some(accepted) = filter.accepted {
        clauses.push("accepted = ?".into());
        values.push(Value::Integer(accepted as i64));
    }
    if let Some(subject_id) = &filter.subject_id {
        clauses.push("subject_id = ?".into());
        values.push(Value::Text(subject_id.clone()));
    }
    if let Some(run_id) = &filter.run_id {
        clauses.push("run_id = ?".into());
        values.push(Value::Text(run_id.to_string()));
    }
    if let Some(since) = &filter.since {
        clauses.push("created_at >= ?".into());
        values.push(Value::Integer(nanos(since)?));
    }
    if let Some(until) = &filter.until {
        clauses.push("created_at <= ?".into());
        values.push(Value::Integer(nanos(until)?));
    }

    Ok((clauses.join(" AND "), values))
}

/// Raw column values, converted outside the rusqlite closure so JSON and UUID
/// failures surface as `StorageError::CorruptRecord`.
struct AttemptRow {
    id: i64,
    run_id: String,
    category: String,
    subject_id: String,
    attempt_number: i64,
    parameters: String,
    ai_likeness: f64,
    human_likeness: f64,
    realism: f64,
    composite: f64,
    selection_tier: String,
    diversified: bool,
    applied_threshold: f64,
    accepted: bool,
    content_hash: String,
    content_length: i64,
    created_at: i64,
}

impl AttemptRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            run_id: row.get(1)?,
            category: row.get(2)?,
            subject_id: row.get(3)?,
            attempt_number: row.get(4)?,
            parameters: row.get(5)?,
            ai_likeness: row.get(6)?,
            human_likeness: row.get(7)?,
            realism: row.get(8)?,
            composite: row.get(9)?,
            selection_tier: row.get(10)?,
            diversified: row.get(11)?,
            applied_threshold: row.get(12)?,
            accepted: row.get(13)?,
            content_hash: row.get(14)?,
            content_length: row.get(15)?,
            created_at: row.get(16)?,
        })
    }

    fn into_attempt(self) -> Result<Attempt, StorageError> {
        let id = self.id;
        let corrupt = |reason: String| StorageError::CorruptRecord { id, reason };

        let run_id = Uuid::parse_str(&self.run_id).map_err(|e| corrupt(e.to_string()))?;
        let parameters =
            serde_json::from_str(&self.parameters).map_err(|e| corrupt(e.to_string()))?;
        let selection_tier = self.selection_tier.parse().map_err(corrupt)?;

        Ok(Attempt {
            id: Some(AttemptId(self.id)),
            run_id,
            category: self.category,
            subject_id: self.subject_id,
            attempt_number: self.attempt_number as u32,
            parameters,
            scores: Scores {
                ai_likeness: self.ai_likeness,
                human_likeness: self.human_likeness,
                realism: self.realism,
                composite: self.composite,
            },
            selection_tier,
            diversified: self.diversified,
            applied_threshold: self.applied_threshold,
            accepted: self.accepted,
            content_hash: self.content_hash,
            content_length: self.content_length as usize,
            timestamp: Utc.timestamp_nanos(self.created_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{ParamValue, ParameterSet, SelectionTier};
    use chrono::Duration;
    use tempfile::TempDir;

    fn attempt(subject: &str, number: u32, composite: f64, accepted: bool) -> Attempt {
        let mut parameters = ParameterSet::new();
        parameters.insert("temperature".into(), ParamValue::Float(0.7));
        Attempt {
            id: None,
            run_id: Uuid::new_v4(),
            category: "caption".into(),
            subject_id: subject.into(),
            attempt_number: number,
            parameters,
            scores: Scores {
                ai_likeness: 0.3,
                human_likeness: 0.7,
                realism: 7.0,
                composite,
            },
            selection_tier: SelectionTier::StaticDefault,
            diversified: false,
            applied_threshold: 0.7,
            accepted,
            content_hash: "ab".repeat(32),
            content_length: 120,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_and_query_roundtrip() {
        let store = FeedbackStore::open_in_memory().unwrap();
        let original = attempt("steel-beam", 1, 0.74, true);
        let id = store.append(&original).await.unwrap();

        let rows = store.query("caption", &AttemptFilter::all()).await.unwrap();
        assert_eq!(rows.len(), 1);
        let stored = &rows[0];
        assert_eq!(stored.id, Some(id));
        assert_eq!(stored.run_id, original.run_id);
        assert_eq!(stored.parameters, original.parameters);
        assert_eq!(stored.scores, original.scores);
        assert_eq!(stored.timestamp, original.timestamp);
        assert!(stored.accepted);
    }

    #[tokio::test]
    async fn test_filters() {
        let store = FeedbackStore::open_in_memory().unwrap();
        store.append(&attempt("a", 1, 0.5, false)).await.unwrap();
        store.append(&attempt("a", 2, 0.8, true)).await.unwrap();
        store.append(&attempt("b", 1, 0.9, true)).await.unwrap();

        let accepted = store
            .query("caption", &AttemptFilter::accepted_only())
            .await
            .unwrap();
        assert_eq!(accepted.len(), 2);

        let for_a = store
            .query("caption", &AttemptFilter::all().for_subject("a"))
            .await
            .unwrap();
        assert_eq!(for_a.len(), 2);
        assert_eq!(for_a[0].attempt_number, 1);

        let other = store.query("faq", &AttemptFilter::all()).await.unwrap();
        assert!(other.is_empty());

        assert_eq!(
            store
                .count("caption", &AttemptFilter::accepted_only().for_subject("a"))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_date_range_filter() {
        let store = FeedbackStore::open_in_memory().unwrap();
        let mut old = attempt("a", 1, 0.5, false);
        old.timestamp = Utc::now() - Duration::days(10);
        store.append(&old).await.unwrap();
        store.append(&attempt("a", 2, 0.6, false)).await.unwrap();

        let recent = store
            .query(
                "caption",
                &AttemptFilter::all().since(Utc::now() - Duration::days(1)),
            )
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].attempt_number, 2);
    }

    #[tokio::test]
    async fn test_results_ordered_by_timestamp() {
        let store = FeedbackStore::open_in_memory().unwrap();
        let mut later = attempt("a", 1, 0.5, false);
        later.timestamp = Utc::now();
        let mut earlier = attempt("b", 1, 0.5, false);
        earlier.timestamp = later.timestamp - Duration::seconds(30);

        store.append(&later).await.unwrap();
        store.append(&earlier).await.unwrap();

        let rows = store.query("caption", &AttemptFilter::all()).await.unwrap();
        assert_eq!(rows[0].subject_id, "b");
        assert_eq!(rows[1].subject_id, "a");
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected() {
        let store = FeedbackStore::open_in_memory().unwrap();
        let first = attempt("a", 1, 0.5, false);
        store.append(&first).await.unwrap();

        let err = store.append(&first).await.unwrap_err();
        assert!(matches!(err, StorageError::AppendOnlyViolation(_)));
    }

    #[tokio::test]
    async fn test_check_violation_is_not_a_duplicate() {
        let store = FeedbackStore::open_in_memory().unwrap();

        let err = store.append(&attempt("a", 0, 0.5, false)).await.unwrap_err();
        assert!(matches!(err, StorageError::Sqlite(_)), "{:?}", err);

        let mut out_of_range = attempt("a", 1, 0.5, false);
        out_of_range.scores.ai_likeness = 1.5;
        let err = store.append(&out_of_range).await.unwrap_err();
        assert!(matches!(err, StorageError::Sqlite(_)), "{:?}", err);

        assert_eq!(store.count("caption", &AttemptFilter::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_updates_and_deletes_rejected() {
        let store = FeedbackStore::open_in_memory().unwrap();
        store.append(&attempt("a", 1, 0.5, false)).await.unwrap();

        let conn = store.db.lock().await;
        assert!(conn
            .execute("UPDATE attempts SET accepted = 1", [])
            .is_err());
        assert!(conn.execute("DELETE FROM attempts", []).is_err());
    }

    #[tokio::test]
    async fn test_summary() {
        let store = FeedbackStore::open_in_memory().unwrap();
        store.append(&attempt("a", 1, 0.4, false)).await.unwrap();
        store.append(&attempt("a", 2, 0.8, true)).await.unwrap();
        let mut replay = attempt("b", 1, 0.6, true);
        replay.selection_tier = SelectionTier::ExactReplay;
        store.append(&replay).await.unwrap();

        let summary = store.summary("caption").await.unwrap();
        assert_eq!(summary.total_attempts, 3);
        assert_eq!(summary.accepted, 2);
        assert_eq!(summary.subjects, 2);
        assert!((summary.mean_composite - 0.6).abs() < 1e-9);
        assert_eq!(summary.best_composite, 0.8);
        assert_eq!(summary.tier_counts.get("static_default"), Some(&2));
        assert_eq!(summary.tier_counts.get("exact_replay"), Some(&1));

        let empty = store.summary("faq").await.unwrap();
        assert_eq!(empty.total_attempts, 0);
        assert_eq!(empty.acceptance_rate, 0.0);
    }

    #[tokio::test]
    async fn test_threshold_history() {
        let store = FeedbackStore::open_in_memory().unwrap();
        for (value, learned) in [(0.7, false), (0.779, true)] {
            store
                .record_threshold(&ThresholdRecord {
                    category: "caption".into(),
                    value,
                    sample_count: if learned { 12 } else { 3 },
                    confidence: if learned {
                        Confidence::Medium
                    } else {
                        Confidence::Insufficient
                    },
                    learned,
                    computed_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let history = store.threshold_history("caption").await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(!history[0].learned);
        assert_eq!(history[1].value, 0.779);
        assert_eq!(history[1].confidence, Confidence::Medium);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("attempts.db");

        {
            let store = FeedbackStore::open(&path).unwrap();
            store.append(&attempt("a", 1, 0.5, false)).await.unwrap();
        }

        let reopened = FeedbackStore::open(&path).unwrap();
        assert_eq!(
            reopened.count("caption", &AttemptFilter::all()).await.unwrap(),
            1
        );
        assert_eq!(reopened.categories().await.unwrap(), vec!["caption"]);
    }

    #[test]
    fn test_unavailable_path_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        // A regular file where a directory is expected
        let result = FeedbackStore::open(blocker.join("attempts.db"));
        assert!(matches!(result, Err(StorageError::Unavailable { .. })));
    }
}
