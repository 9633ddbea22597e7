//! Time-boxed assessment sessions.
//!
//! A session binds a user to the questions (or problem) they were served,
//! together with the answer key, so the score is computed server-side from
//! what was actually issued. Sessions live in a [`SessionStore`], which also
//! owns the clock that expiry is measured against.
//!
//! Lifecycle: `start` → `put`; `submit` → `get`, ownership check, expiry
//! check, score, atomic `delete`. Whichever caller removes the record first
//! wins; any later caller sees [`AssessmentError::InvalidSession`]. Expired
//! sessions are removed lazily when touched. Nothing sweeps them in the
//! background.

pub mod memory;

use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

/// Extra seconds past `expires_at` during which a submission is accepted.
pub const DEFAULT_GRACE_SECS: i64 = 30;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|n| *n).unwrap_or_else(|p| *p.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Quiz,
    Coding,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Quiz => write!(f, "Quiz"),
            SessionKind::Coding => write!(f, "Coding"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AssessmentError {
    #[error("Invalid or expired session")]
    InvalidSession,
    #[error("Session does not belong to this user")]
    Forbidden,
    #[error("{0} session expired")]
    Expired(SessionKind),
    #[error("Unknown course: {0}")]
    UnknownCourse(String),
    #[error("Unknown problem: {0}")]
    UnknownProblem(String),
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("num_questions must be at least 1")]
    NoQuestions,
    #[error("Code evaluation failed: {0}")]
    Upstream(String),
    #[error("Session store failure: {0}")]
    Store(String),
}

impl AssessmentError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            AssessmentError::InvalidSession => "invalid_session",
            AssessmentError::Forbidden => "forbidden",
            AssessmentError::Expired(_) => "session_expired",
            AssessmentError::UnknownCourse(_) => "unknown_course",
            AssessmentError::UnknownProblem(_) => "unknown_problem",
            AssessmentError::UnsupportedLanguage(_) => "unsupported_language",
            AssessmentError::NoQuestions => "no_questions",
            AssessmentError::Upstream(_) => "upstream_failure",
            AssessmentError::Store(_) => "store_failure",
        }
    }
}

/// Storage for in-flight sessions, keyed by session id.
#[async_trait]
pub trait SessionStore<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    async fn put(&self, session_id: &str, session: T) -> Result<(), AssessmentError>;

    async fn get(&self, session_id: &str) -> Result<Option<T>, AssessmentError>;

    /// Remove the session if present, returning whether it existed.
    ///
    /// Must be atomic: of two concurrent calls for the same id, exactly one
    /// returns `true`.
    async fn delete(&self, session_id: &str) -> Result<bool, AssessmentError>;

    fn now(&self) -> DateTime<Utc>;
}

/// Start, expiry, and time limit of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionWindow {
    pub start_time: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub time_limit_seconds: i64,
}

impl SessionWindow {
    pub fn open(now: DateTime<Utc>, time_limit_seconds: i64) -> Self {
        Self {
            start_time: now,
            expires_at: now + Duration::seconds(time_limit_seconds),
            time_limit_seconds,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, grace_secs: i64) -> bool {
        now > self.expires_at + Duration::seconds(grace_secs)
    }

    /// Seconds since the session started.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        (now - self.start_time).num_milliseconds() as f64 / 1000.0
    }

    /// `time_limit - elapsed`; negative once the limit has passed.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> f64 {
        self.time_limit_seconds as f64 - self.elapsed_secs(now)
    }
}

/// Anything the shared lifecycle helpers can validate.
pub trait TimeBoxed {
    fn user_id(&self) -> &str;
    fn window(&self) -> &SessionWindow;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub valid: bool,
    pub time_remaining: i64,
}

/// Fetch a session for submission, enforcing ownership and expiry.
///
/// An expired session is deleted before the error is returned.
pub async fn load_for_submit<T, S>(
    store: &S,
    session_id: &str,
    user_id: &str,
    kind: SessionKind,
    grace_secs: i64,
) -> Result<T, AssessmentError>
where
    T: TimeBoxed + Clone + Send + Sync + 'static,
    S: SessionStore<T> + ?Sized,
{
    let session = store
        .get(session_id)
        .await?
        .ok_or(AssessmentError::InvalidSession)?;

    if session.user_id() != user_id {
        tracing::warn!(session_id, "session submitted by a different user");
        return Err(AssessmentError::Forbidden);
    }

    if session.window().is_expired(store.now(), grace_secs) {
        store.delete(session_id).await?;
        tracing::info!(session_id, kind = %kind, "session expired on submit");
        return Err(AssessmentError::Expired(kind));
    }

    Ok(session)
}

/// Consume a session after scoring. Losing the race is an invalid session.
pub async fn consume<T, S>(store: &S, session_id: &str) -> Result<(), AssessmentError>
where
    T: Clone + Send + Sync + 'static,
    S: SessionStore<T> + ?Sized,
{
    if store.delete(session_id).await? {
        Ok(())
    } else {
        Err(AssessmentError::InvalidSession)
    }
}

/// Report validity and whole seconds remaining, deleting expired sessions.
pub async fn status_of<T, S>(
    store: &S,
    session_id: &str,
    grace_secs: i64,
) -> Result<SessionStatus, AssessmentError>
where
    T: TimeBoxed + Clone + Send + Sync + 'static,
    S: SessionStore<T> + ?Sized,
{
    let invalid = SessionStatus {
        valid: false,
        time_remaining: 0,
    };
    let Some(session) = store.get(session_id).await? else {
        return Ok(invalid);
    };

    let now = store.now();
    if session.window().is_expired(now, grace_secs) {
        store.delete(session_id).await?;
        return Ok(invalid);
    }

    let remaining = (session.window().expires_at - now).num_seconds().max(0);
    Ok(SessionStatus {
        valid: true,
        time_remaining: remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_respects_grace() {
        let start = Utc::now();
        let w = SessionWindow::open(start, 900);
        assert!(!w.is_expired(start + Duration::seconds(900 + 29), 30));
        assert!(!w.is_expired(start + Duration::seconds(900 + 30), 30));
        assert!(w.is_expired(start + Duration::seconds(900 + 31), 30));
    }

    #[test]
    fn test_remaining_goes_negative() {
        let start = Utc::now();
        let w = SessionWindow::open(start, 60);
        assert_eq!(w.remaining_secs(start + Duration::seconds(15)), 45.0);
        assert_eq!(w.remaining_secs(start + Duration::seconds(75)), -15.0);
    }

    #[test]
    fn test_error_messages_and_codes() {
        assert_eq!(
            AssessmentError::Expired(SessionKind::Quiz).to_string(),
            "Quiz session expired"
        );
        assert_eq!(
            AssessmentError::Expired(SessionKind::Coding).to_string(),
            "Coding session expired"
        );
        assert_eq!(
            AssessmentError::InvalidSession.to_string(),
            "Invalid or expired session"
        );
        assert_eq!(AssessmentError::Forbidden.code(), "forbidden");
    }

    #[test]
    fn test_manual_clock_advances() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        clock.advance(Duration::seconds(5));
        assert_eq!(clock.now(), start + Duration::seconds(5));
    }
}
