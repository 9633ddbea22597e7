//! Record of scored attempts.
//!
//! By the time an attempt reaches the ledger its session is consumed, so a
//! failed write cannot be retried by the learner. Callers log the failure
//! and still return the score.
//!
//! [`AttemptLedger::recent`] lists a learner's latest attempts in a course,
//! newest first.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex as StdMutex;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

pub use signum_core::violations::AssessmentKind as AttemptKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt_id: String,
    pub kind: AttemptKind,
    pub session_id: String,
    pub user_id: String,
    pub course_id: String,
    pub score: f64,
    pub passed: bool,
    pub recorded_at: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn new(
        kind: AttemptKind,
        session_id: &str,
        user_id: &str,
        course_id: &str,
        score: f64,
        passed: bool,
    ) -> Self {
        Self {
            attempt_id: Uuid::new_v4().to_string(),
            kind,
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            score,
            passed,
            recorded_at: Utc::now(),
        }
    }
}

/// Attempts listed by history queries.
pub const HISTORY_LIMIT: usize = 10;

/// Which attempts a history query returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptQuery {
    pub user_id: String,
    pub course_id: String,
    pub kind: Option<AttemptKind>,
    pub limit: usize,
}

impl AttemptQuery {
    fn matches(&self, attempt: &AttemptRecord) -> bool {
        attempt.user_id == self.user_id
            && attempt.course_id == self.course_id
            && self.kind.map_or(true, |k| k == attempt.kind)
    }

    /// Filter, order newest first, and cut to `limit`.
    fn select(&self, attempts: impl IntoIterator<Item = AttemptRecord>) -> Vec<AttemptRecord> {
        let mut hits: Vec<AttemptRecord> = attempts.into_iter().filter(|a| self.matches(a)).collect();
        hits.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        hits.truncate(self.limit);
        hits
    }
}

#[async_trait]
pub trait AttemptLedger: Send + Sync {
    async fn record(&self, attempt: AttemptRecord) -> Result<()>;

    async fn recent(&self, query: &AttemptQuery) -> Result<Vec<AttemptRecord>>;
}

/// Keeps attempts for the life of the process.
#[derive(Default)]
pub struct InMemoryLedger {
    attempts: StdMutex<Vec<AttemptRecord>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptLedger for InMemoryLedger {
    async fn record(&self, attempt: AttemptRecord) -> Result<()> {
        self.attempts
            .lock()
            .map_err(|_| anyhow::anyhow!("attempt ledger lock poisoned"))?
            .push(attempt);
        Ok(())
    }

    async fn recent(&self, query: &AttemptQuery) -> Result<Vec<AttemptRecord>> {
        let attempts = self
            .attempts
            .lock()
            .map_err(|_| anyhow::anyhow!("attempt ledger lock poisoned"))?
            .clone();
        Ok(query.select(attempts))
    }
}

/// Appends one JSON object per line.
pub struct JsonlLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlLedger {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AttemptLedger for JsonlLedger {
    async fn record(&self, attempt: AttemptRecord) -> Result<()> {
        let mut line = serde_json::to_string(&attempt)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open attempts log: {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn recent(&self, query: &AttemptQuery) -> Result<Vec<AttemptRecord>> {
        let _guard = self.lock.lock().await;
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read attempts log: {}", self.path.display())
                })
            }
        };
        let attempts = content.lines().filter(|l| !l.trim().is_empty()).filter_map(|line| {
            match serde_json::from_str::<AttemptRecord>(line) {
                Ok(a) => Some(a),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed attempts log line");
                    None
                }
            }
        });
        Ok(query.select(attempts))
    }
}

/// Record an attempt, logging rather than propagating a write failure.
pub async fn record_or_warn(ledger: &dyn AttemptLedger, attempt: AttemptRecord) {
    let session_id = attempt.session_id.clone();
    if let Err(e) = ledger.record(attempt).await {
        tracing::warn!(session_id = %session_id, error = %e, "failed to record attempt");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_jsonl_appends_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("logs/attempts.jsonl");
        let ledger = JsonlLedger::new(path.clone());

        ledger
            .record(AttemptRecord::new(AttemptKind::Quiz, "s1", "u1", "data-structures", 100.0, true))
            .await
            .unwrap();
        ledger
            .record(AttemptRecord::new(AttemptKind::Coding, "s2", "u1", "data-structures", 40.0, false))
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let records: Vec<AttemptRecord> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, AttemptKind::Quiz);
        assert_eq!(records[1].session_id, "s2");
        assert!(!records[1].passed);
    }

    fn attempt_at(kind: AttemptKind, user: &str, course: &str, minutes_ago: i64) -> AttemptRecord {
        let mut a = AttemptRecord::new(kind, &format!("s-{}", minutes_ago), user, course, 50.0, true);
        a.recorded_at = Utc::now() - chrono::Duration::minutes(minutes_ago);
        a
    }

    fn query(kind: Option<AttemptKind>, limit: usize) -> AttemptQuery {
        AttemptQuery {
            user_id: "u1".to_string(),
            course_id: "data-structures".to_string(),
            kind,
            limit,
        }
    }

    #[tokio::test]
    async fn test_recent_filters_and_orders_newest_first() {
        let tmp = TempDir::new().unwrap();
        let jsonl = JsonlLedger::new(tmp.path().join("attempts.jsonl"));
        let memory = InMemoryLedger::new();
        let ledgers: [&dyn AttemptLedger; 2] = [&jsonl, &memory];

        for ledger in ledgers {
            for minutes_ago in [30, 10, 20] {
                ledger
                    .record(attempt_at(AttemptKind::Quiz, "u1", "data-structures", minutes_ago))
                    .await
                    .unwrap();
            }
            ledger
                .record(attempt_at(AttemptKind::Coding, "u1", "data-structures", 5))
                .await
                .unwrap();
            ledger
                .record(attempt_at(AttemptKind::Quiz, "u2", "data-structures", 1))
                .await
                .unwrap();
            ledger
                .record(attempt_at(AttemptKind::Quiz, "u1", "algorithms", 1))
                .await
                .unwrap();

            let quizzes = ledger.recent(&query(Some(AttemptKind::Quiz), HISTORY_LIMIT)).await.unwrap();
            let ids: Vec<&str> = quizzes.iter().map(|a| a.session_id.as_str()).collect();
            assert_eq!(ids, vec!["s-10", "s-20", "s-30"]);

            let latest_two = ledger.recent(&query(None, 2)).await.unwrap();
            let ids: Vec<&str> = latest_two.iter().map(|a| a.session_id.as_str()).collect();
            assert_eq!(ids, vec!["s-5", "s-10"]);
        }
    }

    #[tokio::test]
    async fn test_recent_on_missing_log_is_empty() {
        let tmp = TempDir::new().unwrap();
        let ledger = JsonlLedger::new(tmp.path().join("never-written.jsonl"));
        assert!(ledger.recent(&query(None, HISTORY_LIMIT)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let tmp = TempDir::new().unwrap();
        // A directory cannot be opened for appending.
        let ledger = JsonlLedger::new(tmp.path().to_path_buf());
        let attempt = AttemptRecord::new(AttemptKind::Quiz, "s", "u", "c", 0.0, false);
        assert!(ledger.record(attempt.clone()).await.is_err());
        record_or_warn(&ledger, attempt).await;
    }
}
