//! Quiz session engine.
//!
//! `start` samples questions from the course bank and opens a time-boxed
//! session holding the answer key; `submit` validates and scores it exactly
//! once; `status` reports the time left.

pub mod bank;
pub mod scoring;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use uuid::Uuid;

use crate::anti_cheat::{self, AntiCheatCounters};
use crate::models::{PublicQuestion, QuestionBankEntry};
use crate::session::{
    consume, load_for_submit, status_of, AssessmentError, SessionKind, SessionStatus,
    SessionStore, SessionWindow, TimeBoxed, DEFAULT_GRACE_SECS,
};

use self::bank::QuestionBank;
use self::scoring::{score_quiz, QuestionResult, ScoreBreakdown, DEFAULT_QUIZ_PASS_SCORE};

pub const DEFAULT_QUIZ_TIME_LIMIT_SECS: i64 = 15 * 60;

#[derive(Debug, Clone, PartialEq)]
pub struct QuizSettings {
    pub time_limit_secs: i64,
    pub grace_secs: i64,
    pub pass_score: u32,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            time_limit_secs: DEFAULT_QUIZ_TIME_LIMIT_SECS,
            grace_secs: DEFAULT_GRACE_SECS,
            pass_score: DEFAULT_QUIZ_PASS_SCORE,
        }
    }
}

/// Server-side quiz session, including the answer key.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizSession {
    pub session_id: String,
    pub user_id: String,
    pub course_id: String,
    pub questions: Vec<QuestionBankEntry>,
    pub window: SessionWindow,
}

impl TimeBoxed for QuizSession {
    fn user_id(&self) -> &str {
        &self.user_id
    }
    fn window(&self) -> &SessionWindow {
        &self.window
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizStart {
    pub session_id: String,
    pub questions: Vec<PublicQuestion>,
    pub time_limit: i64,
    pub start_time: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizResult {
    pub session_id: String,
    pub user_id: String,
    pub course_id: String,
    pub score: u32,
    pub correct_answers: usize,
    pub total_questions: usize,
    pub results: Vec<QuestionResult>,
    pub breakdown: ScoreBreakdown,
    pub time_taken: i64,
    pub passed: bool,
    pub feedback: String,
}

/// Draw `min(n, bank.len())` distinct questions uniformly at random.
pub fn sample_questions<R: Rng + ?Sized>(
    bank: &[QuestionBankEntry],
    n: usize,
    rng: &mut R,
) -> Vec<QuestionBankEntry> {
    bank.choose_multiple(rng, n.min(bank.len()))
        .cloned()
        .collect()
}

pub struct QuizEngine {
    bank: Arc<QuestionBank>,
    store: Arc<dyn SessionStore<QuizSession>>,
    settings: QuizSettings,
    rng: Mutex<StdRng>,
}

impl QuizEngine {
    pub fn new(
        bank: Arc<QuestionBank>,
        store: Arc<dyn SessionStore<QuizSession>>,
        settings: QuizSettings,
    ) -> Self {
        Self::with_rng(bank, store, settings, StdRng::from_entropy())
    }

    /// Engine with a caller-supplied RNG, for reproducible sampling.
    pub fn with_rng(
        bank: Arc<QuestionBank>,
        store: Arc<dyn SessionStore<QuizSession>>,
        settings: QuizSettings,
        rng: StdRng,
    ) -> Self {
        Self {
            bank,
            store,
            settings,
            rng: Mutex::new(rng),
        }
    }

    pub fn settings(&self) -> &QuizSettings {
        &self.settings
    }

    pub async fn start(
        &self,
        user_id: &str,
        course_id: &str,
        num_questions: usize,
    ) -> Result<QuizStart, AssessmentError> {
        if num_questions == 0 {
            return Err(AssessmentError::NoQuestions);
        }
        let pool = self
            .bank
            .questions(course_id)
            .ok_or_else(|| AssessmentError::UnknownCourse(course_id.to_string()))?;

        let questions = {
            let mut rng = self
                .rng
                .lock()
                .map_err(|_| AssessmentError::Store("quiz rng lock poisoned".to_string()))?;
            sample_questions(pool, num_questions, &mut *rng)
        };

        let session_id = Uuid::new_v4().to_string();
        let window = SessionWindow::open(self.store.now(), self.settings.time_limit_secs);
        let public: Vec<PublicQuestion> = questions.iter().map(QuestionBankEntry::public_view).collect();

        let start = QuizStart {
            session_id: session_id.clone(),
            questions: public,
            time_limit: window.time_limit_seconds,
            start_time: window.start_time,
            expires_at: window.expires_at,
        };

        self.store
            .put(
                &session_id,
                QuizSession {
                    session_id: session_id.clone(),
                    user_id: user_id.to_string(),
                    course_id: course_id.to_string(),
                    questions,
                    window,
                },
            )
            .await?;

        tracing::info!(
            session_id = %session_id,
            user_id,
            course_id,
            questions = start.questions.len(),
            "quiz session started"
        );
        Ok(start)
    }

    pub async fn submit(
        &self,
        session_id: &str,
        user_id: &str,
        answers: &HashMap<String, usize>,
        counters: Option<&AntiCheatCounters>,
    ) -> Result<QuizResult, AssessmentError> {
        let session: QuizSession = load_for_submit(
            self.store.as_ref(),
            session_id,
            user_id,
            SessionKind::Quiz,
            self.settings.grace_secs,
        )
        .await?;

        let now = self.store.now();
        let penalty = anti_cheat::penalty(counters);
        let scored = score_quiz(
            &session.questions,
            answers,
            session.window.remaining_secs(now),
            penalty,
            self.settings.pass_score,
        );

        consume::<QuizSession, _>(self.store.as_ref(), session_id).await?;

        tracing::info!(
            session_id,
            user_id,
            score = scored.score,
            passed = scored.passed,
            penalty,
            "quiz session scored"
        );

        Ok(QuizResult {
            session_id: session.session_id,
            user_id: session.user_id,
            course_id: session.course_id,
            score: scored.score,
            correct_answers: scored.correct_answers,
            total_questions: scored.total_questions,
            results: scored.results,
            breakdown: scored.breakdown,
            time_taken: session.window.elapsed_secs(now).max(0.0).round() as i64,
            passed: scored.passed,
            feedback: scored.feedback,
        })
    }

    pub async fn status(&self, session_id: &str) -> Result<SessionStatus, AssessmentError> {
        status_of::<QuizSession, _>(self.store.as_ref(), session_id, self.settings.grace_secs).await
    }
}
