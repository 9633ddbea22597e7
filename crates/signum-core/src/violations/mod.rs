//! Anti-cheat violation reports and progressive lockouts.
//!
//! Violations are counted per learner, course and assessment kind. Once the
//! count crosses a threshold the learner is blocked from that assessment for
//! a while, and every further report renews the block:
//!
//! | Violations | Block |
//! |------------|-------|
//! | 3-4 | 15 min |
//! | 5-6 | 30 min |
//! | 7+ | 60 min |
//!
//! Blocks are advisory: the frontend checks status before opening a new
//! attempt. Clearing drops both the violations and the block.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::AssessmentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentKind {
    Quiz,
    Coding,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViolationKey {
    pub user_id: String,
    pub course_id: String,
    pub kind: AssessmentKind,
}

impl ViolationKey {
    pub fn new(user_id: &str, course_id: &str, kind: AssessmentKind) -> Self {
        Self {
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub id: String,
    pub violation_type: String,
    /// Client-supplied time of the event, or the receive time.
    pub timestamp: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Block {
    pub violation_count: usize,
    pub blocked_at: DateTime<Utc>,
    pub block_end_time: DateTime<Utc>,
}

/// Storage for violation events and the current block per key.
#[async_trait]
pub trait ViolationLog: Send + Sync {
    /// Append a violation and return the new count for `key`.
    async fn record(&self, key: &ViolationKey, violation: Violation) -> Result<usize, AssessmentError>;

    async fn violations(&self, key: &ViolationKey) -> Result<Vec<Violation>, AssessmentError>;

    async fn set_block(&self, key: &ViolationKey, block: Block) -> Result<(), AssessmentError>;

    async fn block(&self, key: &ViolationKey) -> Result<Option<Block>, AssessmentError>;

    /// Remove violations and block. Returns how many violations were dropped.
    async fn clear(&self, key: &ViolationKey) -> Result<usize, AssessmentError>;

    fn now(&self) -> DateTime<Utc>;
}

/// Lockout length for a violation count, if any.
pub fn block_minutes(violation_count: usize) -> Option<i64> {
    match violation_count {
        n if n >= 7 => Some(60),
        n if n >= 5 => Some(30),
        n if n >= 3 => Some(15),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockNotice {
    pub block_end_time: DateTime<Utc>,
    pub block_duration_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViolationReceipt {
    pub violation: Violation,
    pub violation_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<BlockNotice>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AntiCheatStatus {
    pub violations: Vec<Violation>,
    pub violation_count: usize,
    pub is_blocked: bool,
    pub block_end_time: Option<DateTime<Utc>>,
    pub time_remaining_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClearReceipt {
    pub violations_cleared: usize,
    pub block_cleared: bool,
    pub timestamp: DateTime<Utc>,
}

pub struct AntiCheatMonitor {
    log: Arc<dyn ViolationLog>,
}

impl AntiCheatMonitor {
    pub fn new(log: Arc<dyn ViolationLog>) -> Self {
        Self { log }
    }

    pub async fn report(
        &self,
        key: &ViolationKey,
        violation_type: &str,
        timestamp: Option<&str>,
    ) -> Result<ViolationReceipt, AssessmentError> {
        let now = self.log.now();
        let violation = Violation {
            id: Uuid::new_v4().to_string(),
            violation_type: violation_type.to_string(),
            timestamp: timestamp
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| now.to_rfc3339()),
            recorded_at: now,
        };
        let violation_count = self.log.record(key, violation.clone()).await?;

        let block = match block_minutes(violation_count) {
            Some(minutes) => {
                let block_end_time = now + Duration::minutes(minutes);
                self.log
                    .set_block(
                        key,
                        Block {
                            violation_count,
                            blocked_at: now,
                            block_end_time,
                        },
                    )
                    .await?;
                tracing::info!(
                    user_id = %key.user_id,
                    course_id = %key.course_id,
                    violation_count,
                    minutes,
                    "assessment access blocked"
                );
                Some(BlockNotice {
                    block_end_time,
                    block_duration_minutes: minutes,
                })
            }
            None => None,
        };

        Ok(ViolationReceipt {
            violation,
            violation_count,
            block,
        })
    }

    pub async fn status(&self, key: &ViolationKey) -> Result<AntiCheatStatus, AssessmentError> {
        let violations = self.log.violations(key).await?;
        let now = self.log.now();
        let active = self
            .log
            .block(key)
            .await?
            .filter(|b| b.block_end_time > now);

        Ok(AntiCheatStatus {
            violation_count: violations.len(),
            violations,
            is_blocked: active.is_some(),
            block_end_time: active.map(|b| b.block_end_time),
            time_remaining_ms: active
                .map(|b| (b.block_end_time - now).num_milliseconds())
                .unwrap_or(0),
        })
    }

    pub async fn clear(&self, key: &ViolationKey) -> Result<ClearReceipt, AssessmentError> {
        let violations_cleared = self.log.clear(key).await?;
        Ok(ClearReceipt {
            violations_cleared,
            block_cleared: true,
            timestamp: self.log.now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryViolationLog;
    use super::*;
    use crate::session::ManualClock;

    fn monitor() -> (Arc<ManualClock>, AntiCheatMonitor) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let log = Arc::new(InMemoryViolationLog::with_clock(clock.clone()));
        (clock, AntiCheatMonitor::new(log))
    }

    fn key() -> ViolationKey {
        ViolationKey::new("u1", "data-structures", AssessmentKind::Quiz)
    }

    #[test]
    fn test_block_thresholds() {
        let expected = [None, None, None, Some(15), Some(15), Some(30), Some(30), Some(60), Some(60)];
        for (count, minutes) in expected.iter().enumerate() {
            assert_eq!(block_minutes(count), *minutes, "count {}", count);
        }
        assert_eq!(block_minutes(40), Some(60));
    }

    #[tokio::test]
    async fn test_third_violation_blocks_for_fifteen_minutes() {
        let (_, monitor) = monitor();
        for _ in 0..2 {
            let receipt = monitor.report(&key(), "tab_switch", None).await.unwrap();
            assert!(receipt.block.is_none());
        }
        let third = monitor.report(&key(), "tab_switch", None).await.unwrap();
        assert_eq!(third.violation_count, 3);
        assert_eq!(third.block.unwrap().block_duration_minutes, 15);

        let status = monitor.status(&key()).await.unwrap();
        assert!(status.is_blocked);
        assert_eq!(status.violation_count, 3);
        assert_eq!(status.time_remaining_ms, 15 * 60 * 1000);
    }

    #[tokio::test]
    async fn test_block_grows_with_more_violations() {
        let (_, monitor) = monitor();
        let mut minutes = Vec::new();
        for _ in 0..7 {
            let receipt = monitor.report(&key(), "paste", Some("2026-01-01T10:00:00Z")).await.unwrap();
            minutes.push(receipt.block.map(|b| b.block_duration_minutes));
        }
        assert_eq!(
            minutes,
            vec![None, None, Some(15), Some(15), Some(30), Some(30), Some(60)]
        );
    }

    #[tokio::test]
    async fn test_block_lapses_then_clear_resets() {
        let (clock, monitor) = monitor();
        for _ in 0..3 {
            monitor.report(&key(), "copy", None).await.unwrap();
        }
        clock.advance(Duration::minutes(16));
        let status = monitor.status(&key()).await.unwrap();
        assert!(!status.is_blocked);
        assert_eq!(status.block_end_time, None);
        assert_eq!(status.time_remaining_ms, 0);
        assert_eq!(status.violation_count, 3);

        let cleared = monitor.clear(&key()).await.unwrap();
        assert_eq!(cleared.violations_cleared, 3);
        let status = monitor.status(&key()).await.unwrap();
        assert_eq!(status.violation_count, 0);

        // Counting starts over after a clear.
        let receipt = monitor.report(&key(), "copy", None).await.unwrap();
        assert_eq!(receipt.violation_count, 1);
        assert!(receipt.block.is_none());
    }

    #[tokio::test]
    async fn test_counts_are_per_assessment_kind() {
        let (_, monitor) = monitor();
        for _ in 0..3 {
            monitor.report(&key(), "tab_switch", None).await.unwrap();
        }
        let coding = ViolationKey::new("u1", "data-structures", AssessmentKind::Coding);
        let status = monitor.status(&coding).await.unwrap();
        assert_eq!(status.violation_count, 0);
        assert!(!status.is_blocked);
    }

    #[tokio::test]
    async fn test_client_timestamp_is_kept() {
        let (_, monitor) = monitor();
        let receipt = monitor
            .report(&key(), "tab_switch", Some("2026-03-01T09:30:00Z"))
            .await
            .unwrap();
        assert_eq!(receipt.violation.timestamp, "2026-03-01T09:30:00Z");
        assert_eq!(receipt.violation.violation_type, "tab_switch");
    }
}
