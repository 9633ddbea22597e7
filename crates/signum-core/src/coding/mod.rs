//! Coding challenge session engine.
//!
//! The engine owns the session lifecycle and the final score. Running code
//! is delegated:
//!
//! - [`CodeExecutor`] runs one program against one stdin (the app crate
//!   implements it over a remote sandbox).
//! - [`CodeEvaluator`] scores a submission against a problem's whole test
//!   suite. [`TestSuiteEvaluator`] implements it on top of any executor.
//!
//! `final = max(0, raw_test_score - anti_cheat_penalty)`, rounded to two
//! decimals, and a submission passes at 50 or above.

pub mod problems;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::anti_cheat::{self, AntiCheatCounters};
use crate::session::{
    consume, load_for_submit, status_of, AssessmentError, SessionKind, SessionStatus,
    SessionStore, SessionWindow, TimeBoxed, DEFAULT_GRACE_SECS,
};

use self::problems::{CodingProblem, ProblemRegistry, ProblemView};

pub const DEFAULT_CODING_TIME_LIMIT_SECS: i64 = 30 * 60;
pub const DEFAULT_CODING_PASS_SCORE: f64 = 50.0;

/// Outcome of running a program once.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionOutcome {
    pub output: String,
    pub execution_time: f64,
    /// Compile, runtime, or timeout error, if any.
    pub error: Option<String>,
}

#[async_trait]
pub trait CodeExecutor: Send + Sync {
    fn supports(&self, language: &str) -> bool;

    /// Run `code` with `stdin`. Program failures are reported in
    /// [`ExecutionOutcome::error`]; `Err` is reserved for the executor
    /// itself being unusable.
    async fn execute(&self, code: &str, language: &str, stdin: &str) -> Result<ExecutionOutcome>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestCaseResult {
    pub test_case: usize,
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
    pub passed: bool,
    pub execution_time: f64,
    pub error: Option<String>,
}

/// Raw result of running a submission against a test suite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    /// `passed / total * 100`, before any penalty.
    pub raw_score: f64,
    pub tests_passed: usize,
    pub tests_total: usize,
    pub test_results: Vec<TestCaseResult>,
}

#[async_trait]
pub trait CodeEvaluator: Send + Sync {
    fn supports(&self, language: &str) -> bool;

    async fn evaluate(&self, code: &str, language: &str, problem: &CodingProblem)
        -> Result<Evaluation>;

    /// Run against the first test case only, for the editor's "Run" button.
    async fn run(&self, code: &str, language: &str, problem: &CodingProblem)
        -> Result<ExecutionOutcome>;
}

/// Evaluates each test case through a [`CodeExecutor`], comparing trimmed
/// stdout with the expected output.
pub struct TestSuiteEvaluator<E> {
    executor: E,
}

impl<E: CodeExecutor> TestSuiteEvaluator<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl<E: CodeExecutor> CodeEvaluator for TestSuiteEvaluator<E> {
    fn supports(&self, language: &str) -> bool {
        self.executor.supports(language)
    }

    async fn evaluate(
        &self,
        code: &str,
        language: &str,
        problem: &CodingProblem,
    ) -> Result<Evaluation> {
        let mut test_results = Vec::with_capacity(problem.test_cases.len());
        for (i, case) in problem.test_cases.iter().enumerate() {
            let outcome = self.executor.execute(code, language, &case.input).await?;
            let expected = case.expected_output.trim().to_string();
            let actual = outcome.output.trim().to_string();
            test_results.push(TestCaseResult {
                test_case: i + 1,
                input: case.input.clone(),
                passed: outcome.error.is_none() && actual == expected,
                expected_output: expected,
                actual_output: actual,
                execution_time: outcome.execution_time,
                error: outcome.error,
            });
        }

        let tests_total = test_results.len();
        let tests_passed = test_results.iter().filter(|t| t.passed).count();
        let raw_score = if tests_total == 0 {
            0.0
        } else {
            tests_passed as f64 / tests_total as f64 * 100.0
        };

        Ok(Evaluation {
            raw_score,
            tests_passed,
            tests_total,
            test_results,
        })
    }

    async fn run(
        &self,
        code: &str,
        language: &str,
        problem: &CodingProblem,
    ) -> Result<ExecutionOutcome> {
        let stdin = problem.sample().map(|c| c.input.as_str()).unwrap_or("");
        self.executor.execute(code, language, stdin).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodingSettings {
    pub time_limit_secs: i64,
    pub grace_secs: i64,
    pub pass_score: f64,
}

impl Default for CodingSettings {
    fn default() -> Self {
        Self {
            time_limit_secs: DEFAULT_CODING_TIME_LIMIT_SECS,
            grace_secs: DEFAULT_GRACE_SECS,
            pass_score: DEFAULT_CODING_PASS_SCORE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodingSession {
    pub session_id: String,
    pub user_id: String,
    pub course_id: String,
    pub problem_id: String,
    pub window: SessionWindow,
}

impl TimeBoxed for CodingSession {
    fn user_id(&self) -> &str {
        &self.user_id
    }
    fn window(&self) -> &SessionWindow {
        &self.window
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodingStart {
    pub session_id: String,
    pub problem: ProblemView,
    pub time_limit: i64,
    pub start_time: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplexityInfo {
    pub expected_time: String,
    pub expected_space: String,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodingResult {
    pub session_id: String,
    pub user_id: String,
    pub course_id: String,
    pub problem_id: String,
    pub language: String,
    pub score: f64,
    /// `"passed/total"`.
    pub tests_passed: String,
    pub test_results: Vec<TestCaseResult>,
    pub time_complexity_analysis: ComplexityInfo,
    pub anti_cheat_penalty: f64,
    pub passed: bool,
    pub time_taken: i64,
    pub feedback: String,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Each test is worth `50 / total` points, scaled by two to a percentage.
pub fn render_feedback(eval: &Evaluation, complexity: &ComplexityInfo, penalty: f64, score: f64) -> String {
    let per_test = if eval.tests_total == 0 {
        0.0
    } else {
        50.0 / eval.tests_total as f64
    };
    let raw_points = round2(eval.tests_passed as f64 * per_test);
    let scaled = round2(raw_points * 2.0);
    let mut lines = vec![
        format!("Test Cases: {}/{} passed", eval.tests_passed, eval.tests_total),
        format!(
            "Raw Score: {} × {} = {} points (out of 50)",
            eval.tests_passed,
            round2(per_test),
            raw_points
        ),
        format!("Scaled Score: {} × 2 = {}%", raw_points, scaled),
        String::new(),
        format!("Expected Time Complexity: {}", complexity.expected_time),
        format!("Expected Space Complexity: {}", complexity.expected_space),
        "(Reference only - score based on test cases)".to_string(),
    ];
    if penalty > 0.0 {
        lines.push(String::new());
        lines.push(format!("⚠ Anti-cheat penalty: -{}%", penalty));
    }
    lines.push(String::new());
    lines.push(format!(
        "Final Score: {}% - {}% = {}%",
        scaled,
        penalty,
        score
    ));
    lines.push(
        if score >= 90.0 {
            "Excellent! Perfect or near-perfect solution!"
        } else if score >= 70.0 {
            "Good job! Strong performance!"
        } else if score >= 50.0 {
            "Passing! Keep practicing for better scores!"
        } else {
            "Review and try again! You can do better!"
        }
        .to_string(),
    );
    lines.join("\n")
}

pub struct CodingEngine {
    problems: Arc<ProblemRegistry>,
    evaluator: Arc<dyn CodeEvaluator>,
    store: Arc<dyn SessionStore<CodingSession>>,
    settings: CodingSettings,
}

impl CodingEngine {
    pub fn new(
        problems: Arc<ProblemRegistry>,
        evaluator: Arc<dyn CodeEvaluator>,
        store: Arc<dyn SessionStore<CodingSession>>,
        settings: CodingSettings,
    ) -> Self {
        Self {
            problems,
            evaluator,
            store,
            settings,
        }
    }

    fn problem(&self, problem_id: &str) -> Result<&CodingProblem, AssessmentError> {
        self.problems
            .get(problem_id)
            .ok_or_else(|| AssessmentError::UnknownProblem(problem_id.to_string()))
    }

    pub async fn start(
        &self,
        user_id: &str,
        course_id: &str,
        problem_id: &str,
    ) -> Result<CodingStart, AssessmentError> {
        let problem = self.problem(problem_id)?;
        let session_id = Uuid::new_v4().to_string();
        let window = SessionWindow::open(self.store.now(), self.settings.time_limit_secs);

        let start = CodingStart {
            session_id: session_id.clone(),
            problem: ProblemView::from(problem),
            time_limit: window.time_limit_seconds,
            start_time: window.start_time,
            expires_at: window.expires_at,
        };

        self.store
            .put(
                &session_id,
                CodingSession {
                    session_id: session_id.clone(),
                    user_id: user_id.to_string(),
                    course_id: course_id.to_string(),
                    problem_id: problem_id.to_string(),
                    window,
                },
            )
            .await?;

        tracing::info!(session_id = %session_id, user_id, problem_id, "coding session started");
        Ok(start)
    }

    /// Score a submission. Evaluator failures leave the session in place so
    /// the learner can resubmit.
    pub async fn submit(
        &self,
        session_id: &str,
        user_id: &str,
        code: &str,
        language: &str,
        counters: Option<&AntiCheatCounters>,
    ) -> Result<CodingResult, AssessmentError> {
        let session: CodingSession = load_for_submit(
            self.store.as_ref(),
            session_id,
            user_id,
            SessionKind::Coding,
            self.settings.grace_secs,
        )
        .await?;

        let problem = self.problem(&session.problem_id)?;
        if !self.evaluator.supports(language) {
            return Err(AssessmentError::UnsupportedLanguage(language.to_string()));
        }

        let eval = self
            .evaluator
            .evaluate(code, language, problem)
            .await
            .map_err(|e| {
                tracing::warn!(session_id, error = %e, "code evaluation failed");
                AssessmentError::Upstream(e.to_string())
            })?;

        let penalty = anti_cheat::penalty(counters);
        let score = round2((eval.raw_score - penalty).max(0.0));
        let passed = score >= self.settings.pass_score;
        let complexity = ComplexityInfo {
            expected_time: problem.expected_complexity.time.clone(),
            expected_space: problem.expected_complexity.space.clone(),
            note: "Expected complexity - reference only, not evaluated".to_string(),
        };
        let feedback = render_feedback(&eval, &complexity, penalty, score);

        consume::<CodingSession, _>(self.store.as_ref(), session_id).await?;

        let now = self.store.now();
        tracing::info!(session_id, user_id, score, passed, penalty, "coding session scored");

        Ok(CodingResult {
            session_id: session.session_id,
            user_id: session.user_id,
            course_id: session.course_id,
            problem_id: session.problem_id,
            language: language.to_string(),
            score,
            tests_passed: format!("{}/{}", eval.tests_passed, eval.tests_total),
            test_results: eval.test_results,
            time_complexity_analysis: complexity,
            anti_cheat_penalty: penalty,
            passed,
            time_taken: session.window.elapsed_secs(now).max(0.0).round() as i64,
            feedback,
        })
    }

    /// Run code against the problem's first test case, outside any session.
    pub async fn run(
        &self,
        code: &str,
        language: &str,
        problem_id: &str,
    ) -> Result<ExecutionOutcome, AssessmentError> {
        let problem = self.problem(problem_id)?;
        if !self.evaluator.supports(language) {
            return Err(AssessmentError::UnsupportedLanguage(language.to_string()));
        }
        self.evaluator
            .run(code, language, problem)
            .await
            .map_err(|e| AssessmentError::Upstream(e.to_string()))
    }

    pub async fn status(&self, session_id: &str) -> Result<SessionStatus, AssessmentError> {
        status_of::<CodingSession, _>(self.store.as_ref(), session_id, self.settings.grace_secs)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::memory::InMemorySessionStore;
    use crate::session::ManualClock;
    use chrono::Duration;
    use std::sync::Mutex;

    /// Evaluator that reports a fixed raw score, or fails on demand.
    struct FixedEvaluator {
        raw_score: f64,
        fail: bool,
    }

    #[async_trait]
    impl CodeEvaluator for FixedEvaluator {
        fn supports(&self, language: &str) -> bool {
            language == "python"
        }
        async fn evaluate(&self, _code: &str, _language: &str, problem: &CodingProblem) -> Result<Evaluation> {
            if self.fail {
                anyhow::bail!("sandbox unavailable");
            }
            let total = problem.test_cases.len();
            Ok(Evaluation {
                raw_score: self.raw_score,
                tests_passed: (self.raw_score / 100.0 * total as f64) as usize,
                tests_total: total,
                test_results: Vec::new(),
            })
        }
        async fn run(&self, _code: &str, _language: &str, _problem: &CodingProblem) -> Result<ExecutionOutcome> {
            Ok(ExecutionOutcome {
                output: "1".to_string(),
                execution_time: 0.1,
                error: None,
            })
        }
    }

    /// Executor that computes factorials natively for "python" and records stdin.
    struct FakeExecutor {
        seen: Mutex<Vec<String>>,
        broken_above: u64,
    }

    #[async_trait]
    impl CodeExecutor for FakeExecutor {
        fn supports(&self, language: &str) -> bool {
            language == "python"
        }
        async fn execute(&self, _code: &str, _language: &str, stdin: &str) -> Result<ExecutionOutcome> {
            self.seen.lock().unwrap().push(stdin.to_string());
            let n: u64 = stdin.trim().parse()?;
            if n > self.broken_above {
                return Ok(ExecutionOutcome {
                    output: String::new(),
                    execution_time: 0.0,
                    error: Some("Runtime Error: overflow".to_string()),
                });
            }
            let f: u64 = (1..=n).product();
            Ok(ExecutionOutcome {
                output: format!("{}\n", f),
                execution_time: 0.01,
                error: None,
            })
        }
    }

    fn engine_with(evaluator: Arc<dyn CodeEvaluator>) -> (Arc<ManualClock>, CodingEngine) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(InMemorySessionStore::<CodingSession>::with_clock(clock.clone()));
        let engine = CodingEngine::new(
            Arc::new(ProblemRegistry::builtin()),
            evaluator,
            store,
            CodingSettings::default(),
        );
        (clock, engine)
    }

    fn fixed(raw_score: f64) -> Arc<dyn CodeEvaluator> {
        Arc::new(FixedEvaluator {
            raw_score,
            fail: false,
        })
    }

    #[tokio::test]
    async fn test_pass_boundary() {
        for (raw, expect_pass) in [(50.0, true), (49.0, false)] {
            let (_, engine) = engine_with(fixed(raw));
            let start = engine.start("u1", "data-structures", "factorial").await.unwrap();
            let result = engine
                .submit(&start.session_id, "u1", "print(1)", "python", None)
                .await
                .unwrap();
            assert_eq!(result.score, raw);
            assert_eq!(result.passed, expect_pass, "raw score {}", raw);
        }
    }

    #[tokio::test]
    async fn test_penalty_floor_and_rounding() {
        let (_, engine) = engine_with(fixed(33.333));
        let start = engine.start("u1", "ds", "factorial").await.unwrap();
        let counters = AntiCheatCounters {
            tab_switches: 1,
            ..AntiCheatCounters::default()
        };
        let result = engine
            .submit(&start.session_id, "u1", "x", "python", Some(&counters))
            .await
            .unwrap();
        assert_eq!(result.anti_cheat_penalty, 2.0);
        assert_eq!(result.score, 31.33);

        let (_, engine) = engine_with(fixed(20.0));
        let start = engine.start("u1", "ds", "factorial").await.unwrap();
        let heavy = AntiCheatCounters {
            paste_attempts: 10,
            ..AntiCheatCounters::default()
        };
        let result = engine
            .submit(&start.session_id, "u1", "x", "python", Some(&heavy))
            .await
            .unwrap();
        assert_eq!(result.score, 0.0);
    }

    #[tokio::test]
    async fn test_upstream_failure_keeps_session() {
        let (_, engine) = engine_with(Arc::new(FixedEvaluator {
            raw_score: 0.0,
            fail: true,
        }));
        let start = engine.start("u1", "ds", "factorial").await.unwrap();
        let err = engine
            .submit(&start.session_id, "u1", "x", "python", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "upstream_failure");
        assert!(engine.status(&start.session_id).await.unwrap().valid);
    }

    #[tokio::test]
    async fn test_unsupported_language_keeps_session() {
        let (_, engine) = engine_with(fixed(100.0));
        let start = engine.start("u1", "ds", "factorial").await.unwrap();
        let err = engine
            .submit(&start.session_id, "u1", "x", "cobol", None)
            .await
            .unwrap_err();
        assert_eq!(err, AssessmentError::UnsupportedLanguage("cobol".to_string()));
        assert!(engine.status(&start.session_id).await.unwrap().valid);
    }

    #[tokio::test]
    async fn test_one_shot_and_expiry() {
        let (clock, engine) = engine_with(fixed(100.0));
        let start = engine.start("u1", "ds", "factorial").await.unwrap();
        assert_eq!(start.time_limit, 1800);
        engine
            .submit(&start.session_id, "u1", "x", "python", None)
            .await
            .unwrap();
        let again = engine
            .submit(&start.session_id, "u1", "x", "python", None)
            .await
            .unwrap_err();
        assert_eq!(again, AssessmentError::InvalidSession);

        let late = engine.start("u1", "ds", "factorial").await.unwrap();
        clock.advance(Duration::seconds(1800 + 31));
        let err = engine
            .submit(&late.session_id, "u1", "x", "python", None)
            .await
            .unwrap_err();
        assert_eq!(err, AssessmentError::Expired(SessionKind::Coding));
        assert_eq!(err.to_string(), "Coding session expired");
    }

    #[tokio::test]
    async fn test_unknown_problem() {
        let (_, engine) = engine_with(fixed(100.0));
        let err = engine.start("u1", "ds", "fizzbuzz").await.unwrap_err();
        assert_eq!(err, AssessmentError::UnknownProblem("fizzbuzz".to_string()));
    }

    #[tokio::test]
    async fn test_suite_evaluator_counts_passes() {
        let evaluator = TestSuiteEvaluator::new(FakeExecutor {
            seen: Mutex::new(Vec::new()),
            broken_above: 12,
        });
        let registry = ProblemRegistry::builtin();
        let problem = registry.get("factorial").unwrap();
        let eval = evaluator.evaluate("code", "python", problem).await.unwrap();
        assert_eq!(eval.tests_total, 10);
        assert_eq!(eval.tests_passed, 8);
        assert_eq!(eval.raw_score, 80.0);
        assert!(eval.test_results[8].error.is_some());
        assert_eq!(eval.test_results[0].actual_output, "1");
        assert_eq!(evaluator.executor.seen.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_run_uses_first_case_only() {
        let evaluator = TestSuiteEvaluator::new(FakeExecutor {
            seen: Mutex::new(Vec::new()),
            broken_above: 100,
        });
        let registry = ProblemRegistry::builtin();
        let out = evaluator
            .run("code", "python", registry.get("factorial").unwrap())
            .await
            .unwrap();
        assert_eq!(out.output.trim(), "1");
        assert_eq!(*evaluator.executor.seen.lock().unwrap(), vec!["0".to_string()]);
    }

    #[test]
    fn test_feedback_mentions_penalty_only_when_applied() {
        let eval = Evaluation {
            raw_score: 100.0,
            tests_passed: 10,
            tests_total: 10,
            test_results: Vec::new(),
        };
        let info = ComplexityInfo {
            expected_time: "O(n)".into(),
            expected_space: "O(1)".into(),
            note: String::new(),
        };
        let clean = render_feedback(&eval, &info, 0.0, 100.0);
        assert!(clean.starts_with("Test Cases: 10/10 passed"));
        assert!(clean.contains("Raw Score: 10 × 5 = 50 points (out of 50)"));
        assert!(clean.contains("Scaled Score: 50 × 2 = 100%"));
        assert!(!clean.contains("Anti-cheat"));
        assert!(clean.ends_with("Excellent! Perfect or near-perfect solution!"));

        let penalised = render_feedback(&eval, &info, 40.0, 60.0);
        assert!(penalised.contains("⚠ Anti-cheat penalty: -40%"));
        assert!(penalised.contains("Final Score: 100% - 40% = 60%"));
        assert!(penalised.ends_with("Passing! Keep practicing for better scores!"));
    }
}
