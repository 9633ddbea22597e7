//! HTTP API for the tutor chat and the assessment engines.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/ai/status` | Chat model and index availability |
//! | `POST` | `/ai/chat` | Scoped tutor chat |
//! | `POST` | `/assessment/{course_id}/quiz/start` | Issue a timed quiz |
//! | `POST` | `/assessment/{course_id}/quiz/submit` | Score a quiz session |
//! | `GET`  | `/assessment/{course_id}/quiz/session/{session_id}/status` | Time remaining |
//! | `POST` | `/assessment/{course_id}/coding/start` | Issue a timed coding problem |
//! | `POST` | `/assessment/{course_id}/coding/run` | Run code against the first test case |
//! | `POST` | `/assessment/{course_id}/coding/submit` | Score a coding session |
//! | `GET`  | `/assessment/{course_id}/coding/session/{session_id}/status` | Time remaining |
//! | `GET`  | `/assessment/{course_id}/quiz/attempts?user_id=` | Latest quiz attempts |
//! | `GET`  | `/assessment/{course_id}/coding/attempts?user_id=` | Latest coding attempts |
//! | `POST` | `/assessment/{course_id}/anti-cheat/report` | Record a violation |
//! | `GET`  | `/assessment/{course_id}/anti-cheat/status?user_id=&assessment_type=` | Violations and block |
//! | `POST` | `/assessment/{course_id}/anti-cheat/clear?user_id=&assessment_type=` | Reset violations |
//!
//! # Error Contract
//!
//! ```json
//! { "success": false, "error": "Invalid or expired session", "code": "invalid_session" }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `invalid_session`, `unknown_course`, `unknown_problem` | 404 |
//! | `forbidden` | 403 |
//! | `session_expired` | 410 |
//! | `no_questions`, `unsupported_language`, `bad_request` | 400 |
//! | `upstream_failure` | 502 |
//! | `store_failure` | 500 |
//!
//! `/ai/chat` answers 200 with `{success, response, error?}` instead, so the
//! tutor widget can always show `response`. A spent daily quota is
//! `error: "daily_limit_reached"`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted for the browser frontend.

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use signum_core::anti_cheat::AntiCheatCounters;
use signum_core::coding::problems::ProblemRegistry;
use signum_core::coding::{CodingEngine, CodingSession, CodingSettings, TestSuiteEvaluator};
use signum_core::index::VectorIndex;
use signum_core::quiz::bank::QuestionBank;
use signum_core::quiz::{QuizEngine, QuizSession, QuizSettings};
use signum_core::retrieve::Retriever;
use signum_core::scope::ScopeGate;
use signum_core::session::memory::InMemorySessionStore;
use signum_core::session::AssessmentError;
use signum_core::violations::memory::InMemoryViolationLog;
use signum_core::violations::{AntiCheatMonitor, AssessmentKind, ViolationKey};

use crate::chat::{ChatReply, ChatRequest, TutorChat};
use crate::config::Config;
use crate::embedding::create_provider;
use crate::execution::PistonExecutor;
use crate::ledger::{
    record_or_warn, AttemptKind, AttemptLedger, AttemptQuery, AttemptRecord, InMemoryLedger,
    JsonlLedger, HISTORY_LIMIT,
};
use crate::llm::create_chat_model;
use crate::quota::{InMemoryDailyQuota, QuotaFailurePolicy, QuotaGate};
use crate::sqlite_index::SqliteIndex;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub retriever: Arc<Retriever>,
    pub chat: Arc<TutorChat>,
    pub quiz: Arc<QuizEngine>,
    pub coding: Arc<CodingEngine>,
    pub ledger: Arc<dyn AttemptLedger>,
    pub anti_cheat: Arc<AntiCheatMonitor>,
}

impl AppState {
    /// Wire every collaborator named in `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let provider = create_provider(&config.embedding)?;
        let index: Arc<dyn VectorIndex> = Arc::new(SqliteIndex::open(
            &config.rag.persist_dir,
            &config.rag.collection_name,
            provider,
        ));
        let retriever = Arc::new(Retriever::new(index, config.rag.retrieval_settings())?);
        let gate = Arc::new(ScopeGate::new(
            Arc::clone(&retriever),
            config.rag.in_scope_distance_threshold,
        ));

        let quota = Arc::new(QuotaGate::new(
            Arc::new(InMemoryDailyQuota::new(config.quota.daily_limit)),
            QuotaFailurePolicy::from_config(&config.quota.on_failure)?,
        ));
        let chat = Arc::new(TutorChat::new(
            gate,
            Arc::clone(&retriever),
            quota,
            create_chat_model(&config.llm)?,
            config.llm.clone(),
        ));

        let bank = match &config.assessment.question_bank {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read question bank: {}", path.display()))?;
                QuestionBank::from_json_str(&json)?
            }
            None => QuestionBank::builtin(),
        };
        let quiz = Arc::new(QuizEngine::new(
            Arc::new(bank),
            Arc::new(InMemorySessionStore::<QuizSession>::new()),
            QuizSettings {
                time_limit_secs: config.assessment.quiz_time_limit_secs,
                grace_secs: config.assessment.grace_secs,
                pass_score: config.assessment.quiz_pass_score,
            },
        ));

        let evaluator = TestSuiteEvaluator::new(PistonExecutor::new(&config.execution)?);
        let coding = Arc::new(CodingEngine::new(
            Arc::new(ProblemRegistry::builtin()),
            Arc::new(evaluator),
            Arc::new(InMemorySessionStore::<CodingSession>::new()),
            CodingSettings {
                time_limit_secs: config.assessment.coding_time_limit_secs,
                grace_secs: config.assessment.grace_secs,
                pass_score: config.assessment.coding_pass_score,
            },
        ));

        let ledger: Arc<dyn AttemptLedger> = match &config.assessment.attempts_log {
            Some(path) => Arc::new(JsonlLedger::new(path.clone())),
            None => Arc::new(InMemoryLedger::new()),
        };
        let anti_cheat = Arc::new(AntiCheatMonitor::new(Arc::new(InMemoryViolationLog::new())));

        Ok(Self {
            config: Arc::new(config.clone()),
            retriever,
            chat,
            quiz,
            coding,
            ledger,
            anti_cheat,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/ai/status", get(handle_ai_status))
        .route("/ai/chat", post(handle_chat))
        .route("/assessment/{course_id}/quiz/start", post(handle_quiz_start))
        .route("/assessment/{course_id}/quiz/submit", post(handle_quiz_submit))
        .route(
            "/assessment/{course_id}/quiz/session/{session_id}/status",
            get(handle_quiz_status),
        )
        .route("/assessment/{course_id}/coding/start", post(handle_coding_start))
        .route("/assessment/{course_id}/coding/run", post(handle_coding_run))
        .route("/assessment/{course_id}/coding/submit", post(handle_coding_submit))
        .route(
            "/assessment/{course_id}/coding/session/{session_id}/status",
            get(handle_coding_status),
        )
        .route("/assessment/{course_id}/quiz/attempts", get(handle_quiz_attempts))
        .route("/assessment/{course_id}/coding/attempts", get(handle_coding_attempts))
        .route("/assessment/{course_id}/anti-cheat/report", post(handle_violation_report))
        .route("/assessment/{course_id}/anti-cheat/status", get(handle_anti_cheat_status))
        .route("/assessment/{course_id}/anti-cheat/clear", post(handle_anti_cheat_clear))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;
    let index_available = state.retriever.index_available().await;
    let app = build_router(state);

    println!("Signum tutor listening on http://{}", config.server.bind);
    println!("  chat model: {}", config.llm.provider);
    println!(
        "  index: {} ({})",
        config.rag.persist_dir.display(),
        if index_available { "available" } else { "missing" }
    );
    tracing::info!(bind = %config.server.bind, index_available, "server starting");

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    code: String,
}

pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.message,
            code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<AssessmentError> for AppError {
    fn from(err: AssessmentError) -> Self {
        let status = match &err {
            AssessmentError::InvalidSession
            | AssessmentError::UnknownCourse(_)
            | AssessmentError::UnknownProblem(_) => StatusCode::NOT_FOUND,
            AssessmentError::Forbidden => StatusCode::FORBIDDEN,
            AssessmentError::Expired(_) => StatusCode::GONE,
            AssessmentError::NoQuestions | AssessmentError::UnsupportedLanguage(_) => {
                StatusCode::BAD_REQUEST
            }
            AssessmentError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AssessmentError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::warn!(code = err.code(), error = %err, "assessment request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// `{"success": true, ...body}`.
#[derive(Serialize)]
struct Success<T> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

fn ok<T: Serialize>(body: T) -> Json<Success<T>> {
    Json(Success {
        success: true,
        body,
    })
}

// ============ GET /health, GET /ai/status ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
struct AiStatusResponse {
    status: String,
    model: String,
    index_available: bool,
}

async fn handle_ai_status(State(state): State<AppState>) -> Json<AiStatusResponse> {
    Json(AiStatusResponse {
        status: "operational".to_string(),
        model: state.chat.model_name().to_string(),
        index_available: state.retriever.index_available().await,
    })
}

// ============ POST /ai/chat ============

/// Always 200. Refusals and model failures are `success: false` replies.
async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Json<ChatReply> {
    Json(state.chat.respond(&req).await)
}

// ============ Quiz ============

#[derive(Deserialize)]
struct QuizStartRequest {
    user_id: String,
    num_questions: Option<usize>,
}

async fn handle_quiz_start(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Json(req): Json<QuizStartRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.user_id.trim().is_empty() {
        return Err(bad_request("user_id must not be empty"));
    }
    let n = req
        .num_questions
        .unwrap_or(state.config.assessment.default_num_questions);
    let start = state.quiz.start(&req.user_id, &course_id, n).await?;
    Ok(ok(start))
}

#[derive(Deserialize)]
struct QuizSubmitRequest {
    user_id: String,
    session_id: String,
    #[serde(default)]
    answers: HashMap<String, usize>,
    anti_cheat_data: Option<AntiCheatCounters>,
}

async fn handle_quiz_submit(
    State(state): State<AppState>,
    Path(_course_id): Path<String>,
    Json(req): Json<QuizSubmitRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state
        .quiz
        .submit(
            &req.session_id,
            &req.user_id,
            &req.answers,
            req.anti_cheat_data.as_ref(),
        )
        .await?;

    record_or_warn(
        state.ledger.as_ref(),
        AttemptRecord::new(
            AttemptKind::Quiz,
            &result.session_id,
            &result.user_id,
            &result.course_id,
            f64::from(result.score),
            result.passed,
        ),
    )
    .await;

    Ok(ok(result))
}

async fn handle_quiz_status(
    State(state): State<AppState>,
    Path((_course_id, session_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.quiz.status(&session_id).await?))
}

// ============ Coding ============

#[derive(Deserialize)]
struct CodingStartRequest {
    user_id: String,
    problem_id: Option<String>,
}

async fn handle_coding_start(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Json(req): Json<CodingStartRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.user_id.trim().is_empty() {
        return Err(bad_request("user_id must not be empty"));
    }
    let problem_id = req
        .problem_id
        .unwrap_or_else(|| state.config.assessment.default_problem_id.clone());
    let start = state.coding.start(&req.user_id, &course_id, &problem_id).await?;
    Ok(ok(start))
}

#[derive(Deserialize)]
struct CodingRunRequest {
    code: String,
    language: String,
    problem_id: Option<String>,
}

#[derive(Serialize)]
struct CodingRunResponse {
    success: bool,
    output: String,
    execution_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn handle_coding_run(
    State(state): State<AppState>,
    Path(_course_id): Path<String>,
    Json(req): Json<CodingRunRequest>,
) -> Result<Json<CodingRunResponse>, AppError> {
    let problem_id = req
        .problem_id
        .unwrap_or_else(|| state.config.assessment.default_problem_id.clone());
    let outcome = state.coding.run(&req.code, &req.language, &problem_id).await?;
    Ok(Json(CodingRunResponse {
        success: outcome.error.is_none(),
        output: outcome.output,
        execution_time: outcome.execution_time,
        error: outcome.error,
    }))
}

#[derive(Deserialize)]
struct CodingSubmitRequest {
    user_id: String,
    session_id: String,
    code: String,
    language: String,
    anti_cheat_data: Option<AntiCheatCounters>,
}

async fn handle_coding_submit(
    State(state): State<AppState>,
    Path(_course_id): Path<String>,
    Json(req): Json<CodingSubmitRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state
        .coding
        .submit(
            &req.session_id,
            &req.user_id,
            &req.code,
            &req.language,
            req.anti_cheat_data.as_ref(),
        )
        .await?;

    record_or_warn(
        state.ledger.as_ref(),
        AttemptRecord::new(
            AttemptKind::Coding,
            &result.session_id,
            &result.user_id,
            &result.course_id,
            result.score,
            result.passed,
        ),
    )
    .await;

    Ok(ok(result))
}

async fn handle_coding_status(
    State(state): State<AppState>,
    Path((_course_id, session_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.coding.status(&session_id).await?))
}

// ============ Attempt history ============

#[derive(Deserialize)]
struct AttemptsParams {
    user_id: String,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct AttemptsResponse {
    attempts: Vec<AttemptRecord>,
}

async fn list_attempts(
    state: &AppState,
    course_id: String,
    params: AttemptsParams,
    kind: AttemptKind,
) -> Result<Json<Success<AttemptsResponse>>, AppError> {
    let query = AttemptQuery {
        user_id: params.user_id,
        course_id,
        kind: Some(kind),
        limit: params.limit.unwrap_or(HISTORY_LIMIT).min(HISTORY_LIMIT),
    };
    let attempts = state.ledger.recent(&query).await.map_err(|e| {
        tracing::warn!(error = %e, "failed to read attempt history");
        AppError::from(AssessmentError::Store(e.to_string()))
    })?;
    Ok(ok(AttemptsResponse { attempts }))
}

async fn handle_quiz_attempts(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Query(params): Query<AttemptsParams>,
) -> Result<impl IntoResponse, AppError> {
    list_attempts(&state, course_id, params, AttemptKind::Quiz).await
}

async fn handle_coding_attempts(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Query(params): Query<AttemptsParams>,
) -> Result<impl IntoResponse, AppError> {
    list_attempts(&state, course_id, params, AttemptKind::Coding).await
}

// ============ Anti-cheat ============

#[derive(Deserialize)]
struct ViolationReportRequest {
    user_id: String,
    assessment_type: AssessmentKind,
    violation_type: String,
    timestamp: Option<String>,
}

#[derive(Deserialize)]
struct AntiCheatParams {
    user_id: String,
    assessment_type: AssessmentKind,
}

async fn handle_violation_report(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Json(req): Json<ViolationReportRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.user_id.trim().is_empty() {
        return Err(bad_request("user_id must not be empty"));
    }
    let key = ViolationKey::new(&req.user_id, &course_id, req.assessment_type);
    let receipt = state
        .anti_cheat
        .report(&key, &req.violation_type, req.timestamp.as_deref())
        .await?;
    Ok(ok(receipt))
}

async fn handle_anti_cheat_status(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Query(params): Query<AntiCheatParams>,
) -> Result<impl IntoResponse, AppError> {
    let key = ViolationKey::new(&params.user_id, &course_id, params.assessment_type);
    Ok(ok(state.anti_cheat.status(&key).await?))
}

async fn handle_anti_cheat_clear(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Query(params): Query<AntiCheatParams>,
) -> Result<impl IntoResponse, AppError> {
    let key = ViolationKey::new(&params.user_id, &course_id, params.assessment_type);
    Ok(ok(state.anti_cheat.clear(&key).await?))
}
