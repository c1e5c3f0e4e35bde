//! HTTP service surface.
//!
//! JSON in/out over axum. Everything except `/`, `/health`, and the two
//! `/auth` entry points requires a bearer token issued by `/auth/token`.
//!
//! # Error Contract
//!
//! All error responses share one body shape:
//!
//! ```json
//! { "error": { "code": "assistant_unavailable", "message": "assistant unavailable" } }
//! ```
//!
//! Codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `assistant_unavailable` (503), `internal` (500). Internal failures are
//! logged with detail server-side and returned as a generic message.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the service fronts a
//! separate browser app.

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::assistant::Assistant;
use crate::auth::{self, TokenSigner};
use crate::config::Config;
use crate::error::Error;
use crate::knowledge::KnowledgeBase;
use crate::models::{
    ChatTurn, JournalEntry, MoodEntry, MoodTrendPoint, SentimentSummary, TagCount, User,
    UserProfile, WeekdayMood,
};
use crate::repo::{ProfileUpdate, SqliteRepo, UserData};
use crate::sentiment::SentimentAnalyzer;
use crate::{db, embedding, llm, migrate};

/// Shared handles for all route handlers. Everything here is process-wide,
/// built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub repo: SqliteRepo,
    pub assistant: Arc<Assistant>,
    pub sentiment: Arc<SentimentAnalyzer>,
    pub tokens: TokenSigner,
}

/// Builds every process-wide handle and runs the server until terminated.
///
/// Fail-fast startup: a missing knowledge store, a missing API key, or a
/// missing auth secret abort here, before the listener binds.
pub async fn run_server(config: &Config, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let embedder = embedding::create_embedder(&config.embedding).await?;
    let model = llm::create_chat_model(&config.llm)?;
    let knowledge =
        KnowledgeBase::open(&config.knowledge.dir, embedder, config.knowledge.top_k).await?;
    info!(chunks = knowledge.count().await?, "knowledge store opened");

    let pool = db::connect(&config.database.path).await?;
    migrate::run_migrations(&pool).await?;
    let repo = SqliteRepo::new(pool);

    let state = AppState {
        assistant: Arc::new(Assistant::new(
            knowledge,
            model.clone(),
            Arc::new(repo.clone()),
            config.chat.history_limit,
        )),
        sentiment: Arc::new(SentimentAnalyzer::new(model)),
        tokens: TokenSigner::from_config(&config.auth)?,
        repo,
    };

    let bind_addr = format!(
        "{}:{}",
        host.unwrap_or_else(|| config.server.host.clone()),
        port.unwrap_or(config.server.port)
    );

    info!(addr = %bind_addr, "mindwell listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// The full route table over a prepared state. Split out so tests can mount
/// the service in-process with fake model handles.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/auth/register", post(handle_register))
        .route("/auth/token", post(handle_token))
        .route("/auth/users/me", get(handle_me).put(handle_update_me))
        .route("/mood/", post(handle_create_mood).get(handle_list_mood))
        .route("/mood/trends", get(handle_mood_trends))
        .route("/mood/{id}", axum::routing::delete(handle_delete_mood))
        .route(
            "/journal/",
            post(handle_create_journal).get(handle_list_journal),
        )
        .route("/journal/streak", get(handle_journal_streak))
        .route(
            "/journal/{id}",
            get(handle_get_journal)
                .put(handle_update_journal)
                .delete(handle_delete_journal),
        )
        .route("/insights/mood/tags", get(handle_tag_insights))
        .route("/insights/mood/weekday", get(handle_weekday_insights))
        .route("/insights/journal/sentiment", get(handle_sentiment_insights))
        .route("/chat/", post(handle_chat))
        .route("/chat/history", get(handle_chat_history))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err {
            Error::Invalid(message) => AppError {
                status: StatusCode::BAD_REQUEST,
                code: "bad_request",
                message,
            },
            Error::Unauthorized(message) => AppError {
                status: StatusCode::UNAUTHORIZED,
                code: "unauthorized",
                message: message.to_string(),
            },
            Error::NotFound(what) => AppError {
                status: StatusCode::NOT_FOUND,
                code: "not_found",
                message: format!("{} not found", what),
            },
            Error::AssistantUnavailable(cause) => {
                error!(error = %cause, "assistant unavailable");
                AppError {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    code: "assistant_unavailable",
                    message: "The assistant is temporarily unavailable. Please try again.".to_string(),
                }
            }
            // Startup-class and unexpected failures: detail stays in the log.
            other => {
                error!(error = %other, "internal error");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    message: "An unexpected error occurred.".to_string(),
                }
            }
        }
    }
}

fn unauthorized(message: &'static str) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized",
        message: message.to_string(),
    }
}

// ============ Bearer-token extractor ============

/// The authenticated caller, resolved from the `Authorization: Bearer` header.
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| unauthorized("missing Authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| unauthorized("expected a bearer token"))?;

        let user_id = state.tokens.verify(token)?;
        let user = state
            .repo
            .user_by_id(user_id)
            .await?
            .ok_or_else(|| unauthorized("unknown user"))?;

        Ok(AuthUser(user))
    }
}

// ============ Root & health ============

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Welcome to the Mindwell API"
    }))
}

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

// ============ Auth ============

#[derive(Deserialize)]
struct RegisterPayload {
    email: String,
    password: String,
    full_name: Option<String>,
}

async fn handle_register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, Json<UserProfile>), AppError> {
    if payload.email.trim().is_empty() || !payload.email.contains('@') {
        return Err(Error::invalid("a valid email is required").into());
    }
    if payload.password.len() < 8 {
        return Err(Error::invalid("password must be at least 8 characters").into());
    }

    let hash = auth::hash_password(&payload.password)?;
    let user = state
        .repo
        .create_user(&payload.email, &hash, payload.full_name.as_deref())
        .await?;

    info!(user_id = user.id, "registered new user");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[derive(Deserialize)]
struct TokenPayload {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
}

async fn handle_token(
    State(state): State<AppState>,
    Json(payload): Json<TokenPayload>,
) -> Result<Json<TokenResponse>, AppError> {
    let user = state
        .repo
        .user_by_email(&payload.email)
        .await?
        .filter(|u| auth::verify_password(&payload.password, &u.password_hash))
        .ok_or(Error::Unauthorized("incorrect email or password"))?;

    Ok(Json(TokenResponse {
        access_token: state.tokens.issue(user.id)?,
        token_type: "bearer".to_string(),
    }))
}

async fn handle_me(AuthUser(user): AuthUser) -> Json<UserProfile> {
    Json(user.into())
}

#[derive(Deserialize)]
struct ProfilePayload {
    full_name: Option<String>,
    date_of_birth: Option<String>,
    gender: Option<String>,
    triggers: Option<String>,
    areas_of_focus: Option<String>,
}

async fn handle_update_me(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<ProfilePayload>,
) -> Result<Json<UserProfile>, AppError> {
    let updated = state
        .repo
        .update_profile(
            user.id,
            ProfileUpdate {
                full_name: payload.full_name,
                date_of_birth: payload.date_of_birth,
                gender: payload.gender,
                triggers: payload.triggers,
                areas_of_focus: payload.areas_of_focus,
            },
        )
        .await?;
    Ok(Json(updated.into()))
}

// ============ Mood ============

#[derive(Deserialize)]
struct MoodPayload {
    mood_value: i64,
    notes: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

async fn handle_create_mood(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<MoodPayload>,
) -> Result<(StatusCode, Json<MoodEntry>), AppError> {
    let entry = state
        .repo
        .create_mood_entry(
            user.id,
            payload.mood_value,
            payload.notes.as_deref(),
            &payload.tags,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[derive(Deserialize)]
struct PageQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_page_limit")]
    limit: i64,
}

fn default_page_limit() -> i64 {
    100
}

async fn handle_list_mood(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<MoodEntry>>, AppError> {
    Ok(Json(
        state
            .repo
            .mood_entries(user.id, page.skip.max(0), page.limit.clamp(0, 100))
            .await?,
    ))
}

async fn handle_delete_mood(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.repo.delete_mood_entry(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct TrendQuery {
    #[serde(default = "default_trend_days")]
    days: i64,
}

fn default_trend_days() -> i64 {
    30
}

async fn handle_mood_trends(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<TrendQuery>,
) -> Result<Json<Vec<MoodTrendPoint>>, AppError> {
    if !(1..=365).contains(&query.days) {
        return Err(Error::invalid("days must be between 1 and 365").into());
    }
    Ok(Json(state.repo.mood_trend(user.id, query.days).await?))
}

// ============ Journal ============

#[derive(Deserialize)]
struct JournalPayload {
    title: Option<String>,
    content: String,
}

async fn handle_create_journal(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<JournalPayload>,
) -> Result<(StatusCode, Json<JournalEntry>), AppError> {
    // Sentiment runs before the write and can only degrade, never fail.
    let sentiment = state.sentiment.analyze(&payload.content).await;
    let entry = state
        .repo
        .create_journal_entry(user.id, payload.title.as_deref(), &payload.content, sentiment)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn handle_list_journal(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<JournalEntry>>, AppError> {
    Ok(Json(
        state
            .repo
            .journal_entries(user.id, page.skip.max(0), page.limit.clamp(0, 100))
            .await?,
    ))
}

async fn handle_get_journal(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<JournalEntry>, AppError> {
    Ok(Json(state.repo.journal_entry(user.id, id).await?))
}

#[derive(Deserialize)]
struct JournalUpdatePayload {
    title: Option<String>,
    content: Option<String>,
}

async fn handle_update_journal(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<JournalUpdatePayload>,
) -> Result<Json<JournalEntry>, AppError> {
    // Re-analyze only when the text content changes.
    let sentiment = match &payload.content {
        Some(content) => Some(state.sentiment.analyze(content).await),
        None => None,
    };

    let entry = state
        .repo
        .update_journal_entry(
            user.id,
            id,
            payload.title.as_deref(),
            payload.content.as_deref(),
            sentiment,
        )
        .await?;
    Ok(Json(entry))
}

async fn handle_delete_journal(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.repo.delete_journal_entry(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct StreakResponse {
    current_streak: i64,
}

async fn handle_journal_streak(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<StreakResponse>, AppError> {
    Ok(Json(StreakResponse {
        current_streak: state.repo.journal_streak(user.id).await?,
    }))
}

// ============ Insights ============

async fn handle_tag_insights(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<TagCount>>, AppError> {
    Ok(Json(state.repo.tag_counts(user.id).await?))
}

async fn handle_weekday_insights(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<WeekdayMood>>, AppError> {
    Ok(Json(state.repo.weekday_mood(user.id).await?))
}

async fn handle_sentiment_insights(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<SentimentSummary>, AppError> {
    Ok(Json(state.repo.sentiment_summary(user.id).await?))
}

// ============ Chat ============

#[derive(Deserialize)]
struct ChatPayload {
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    sources: Vec<ChatSource>,
}

#[derive(Serialize)]
struct ChatSource {
    content: String,
    metadata: ChatSourceMetadata,
}

#[derive(Serialize)]
struct ChatSourceMetadata {
    source: String,
    chunk_index: i64,
}

async fn handle_chat(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<ChatPayload>,
) -> Result<Json<ChatResponse>, AppError> {
    if payload.message.trim().is_empty() {
        return Err(Error::invalid("message must not be empty").into());
    }

    let reply = state.assistant.respond(user.id, &payload.message).await?;
    Ok(Json(ChatResponse {
        response: reply.response,
        sources: reply
            .sources
            .into_iter()
            .map(|chunk| ChatSource {
                content: chunk.text,
                metadata: ChatSourceMetadata {
                    source: chunk.source,
                    chunk_index: chunk.chunk_index,
                },
            })
            .collect(),
    }))
}

#[derive(Deserialize)]
struct HistoryQuery {
    #[serde(default = "default_history_query_limit")]
    limit: usize,
}

fn default_history_query_limit() -> usize {
    50
}

async fn handle_chat_history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ChatTurn>>, AppError> {
    Ok(Json(
        state
            .repo
            .recent_chat_turns(user.id, query.limit.min(200))
            .await?,
    ))
}
