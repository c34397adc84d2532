use crate::auth::{CurrentUser, RequestScope};
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Form, Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, post, put};
use axum::Router;
use serde::{Deserialize, Serialize};
use tracker_analytics::aggregations::round_to;
use tracker_analytics::{summarize, ReportGenerator, Summary};
use tracker_core::{LearningRecord, NewRecord, RecordPatch, Scope, Topic, TrackerError};

type ApiResult<T> = Result<T, ApiError>;

/// Run a store call on the blocking pool; SQLite and bcrypt never run on
/// the async workers.
pub(crate) async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> tracker_core::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError(TrackerError::Unavailable(format!("blocking task failed: {e}"))))?
        .map_err(ApiError)
}

// ── Health ──────────────────────────────────────────────────────────────

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ── Login ───────────────────────────────────────────────────────────────

pub fn login_routes() -> Router<AppState> {
    Router::new().route("/token", post(login))
}

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/users/me", get(current_user))
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
    expires_in: i64,
}

async fn login(
    State(state): State<AppState>,
    form: Result<Form<LoginForm>, FormRejection>,
) -> ApiResult<Json<TokenResponse>> {
    let Form(form) = form?;
    let users = state.users.clone();
    let username = form.username.clone();
    let user = blocking(move || users.authenticate(&form.username, &form.password))
        .await
        .map_err(|e| {
            tracing::info!(username = %username, "Rejected login");
            e
        })?;
    let (access_token, expires_at) = state.tokens.issue(&user).await;
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
        expires_in: (expires_at - chrono::Utc::now()).num_seconds().max(0),
    }))
}

async fn current_user(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let users = state.users.clone();
    let user = blocking(move || users.get(identity.user_id)).await?;
    Ok(Json(user))
}

// ── Progress records ────────────────────────────────────────────────────

pub fn progress_routes() -> Router<AppState> {
    Router::new()
        .route("/add-progress", post(add_progress))
        .route("/view-progress", get(view_progress))
        .route("/view-progress/{id}", get(view_entry))
        .route("/view-progress/by-topic/{topic}", get(view_by_topic))
        .route(
            "/update-progress/{id}",
            put(update_progress).patch(update_progress),
        )
        .route("/delete-progress/{id}", delete(delete_progress))
}

#[derive(Debug, Serialize)]
struct RecordResponse {
    message: String,
    data: LearningRecord,
}

#[derive(Debug, Serialize)]
struct ProgressList {
    total_entries: usize,
    total_hours: f64,
    entries: Vec<LearningRecord>,
}

#[derive(Debug, Serialize)]
struct TopicProgress {
    topic: Topic,
    total_entries: usize,
    total_hours: f64,
    average_difficulty: Option<f64>,
    entries: Vec<LearningRecord>,
}

#[derive(Debug, Deserialize)]
struct TopicQuery {
    limit: Option<usize>,
}

async fn add_progress(
    State(state): State<AppState>,
    RequestScope(scope): RequestScope,
    payload: Result<Json<NewRecord>, JsonRejection>,
) -> ApiResult<Json<RecordResponse>> {
    let Json(candidate) = payload?;
    let records = state.records.clone();
    let record = blocking(move || records.insert(scope, &candidate)).await?;
    Ok(Json(RecordResponse {
        message: "Progress added successfully!".into(),
        data: record,
    }))
}

async fn view_progress(
    State(state): State<AppState>,
    RequestScope(scope): RequestScope,
) -> ApiResult<Json<ProgressList>> {
    let records = state.records.clone();
    let entries = blocking(move || records.list_all(scope)).await?;
    let precision = state.config.analytics.display_precision;
    Ok(Json(ProgressList {
        total_entries: entries.len(),
        total_hours: round_to(entries.iter().map(|e| e.hours_spent).sum(), precision),
        entries,
    }))
}

async fn view_entry(
    State(state): State<AppState>,
    RequestScope(scope): RequestScope,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<LearningRecord>> {
    let Path(id) = id?;
    let records = state.records.clone();
    Ok(Json(blocking(move || records.get(scope, id)).await?))
}

async fn view_by_topic(
    State(state): State<AppState>,
    RequestScope(scope): RequestScope,
    topic: Result<Path<String>, PathRejection>,
    query: Result<Query<TopicQuery>, QueryRejection>,
) -> ApiResult<Json<TopicProgress>> {
    let Path(topic) = topic?;
    let Query(query) = query?;
    let topic: Topic = topic.parse()?;
    if query.limit == Some(0) {
        return Err(TrackerError::validation("limit", "must be at least 1").into());
    }

    let records = state.records.clone();
    let limit = query.limit;
    let entries = blocking(move || records.list_by_topic(scope, topic, limit)).await?;
    let precision = state.config.analytics.display_precision;
    let total_hours: f64 = entries.iter().map(|e| e.hours_spent).sum();
    let average_difficulty = (!entries.is_empty()).then(|| {
        let sum: f64 = entries.iter().map(|e| f64::from(e.difficulty_level)).sum();
        round_to(sum / entries.len() as f64, precision)
    });

    Ok(Json(TopicProgress {
        topic,
        total_entries: entries.len(),
        total_hours: round_to(total_hours, precision),
        average_difficulty,
        entries,
    }))
}

async fn update_progress(
    State(state): State<AppState>,
    RequestScope(scope): RequestScope,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<RecordPatch>, JsonRejection>,
) -> ApiResult<Json<RecordResponse>> {
    let Path(id) = id?;
    let Json(patch) = payload?;
    let records = state.records.clone();
    let record = blocking(move || records.patch(scope, id, &patch)).await?;
    Ok(Json(RecordResponse {
        message: "Progress updated successfully!".into(),
        data: record,
    }))
}

async fn delete_progress(
    State(state): State<AppState>,
    RequestScope(scope): RequestScope,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    let records = state.records.clone();
    let deleted_id = blocking(move || records.delete(scope, id)).await?;
    Ok(Json(serde_json::json!({
        "message": format!("Entry {} deleted successfully!", deleted_id),
        "deleted_id": deleted_id,
    })))
}

// ── Analytics ───────────────────────────────────────────────────────────

pub fn analytics_routes() -> Router<AppState> {
    Router::new()
        .route("/analytics/learning-summary", get(learning_summary))
        .route("/analytics/report", get(learning_report))
}

#[derive(Debug, Serialize)]
struct SummaryResponse {
    summary: Overview,
    recent_progress: RecentView,
    topic_statistics: Vec<TopicView>,
    skipped_records: usize,
}

#[derive(Debug, Serialize)]
struct Overview {
    total_entries: usize,
    total_hours: f64,
    unique_topics: usize,
    most_studied_topic: Option<Topic>,
}

#[derive(Debug, Serialize)]
struct RecentView {
    window_days: u32,
    study_sessions: u32,
    total_hours: f64,
    average_understanding: Option<f64>,
}

#[derive(Debug, Serialize)]
struct TopicView {
    topic: Topic,
    total_sessions: u32,
    total_hours: f64,
    average_hours_per_session: f64,
    average_understanding: f64,
    average_difficulty: f64,
    last_studied: chrono::DateTime<chrono::Utc>,
}

impl SummaryResponse {
    /// Round every figure to `precision` places for display.
    fn render(summary: Summary, precision: u32) -> Self {
        let round = |v: f64| round_to(v, precision);
        Self {
            summary: Overview {
                total_entries: summary.total_entries,
                total_hours: round(summary.total_hours),
                unique_topics: summary.unique_topics,
                most_studied_topic: summary.most_studied_topic,
            },
            recent_progress: RecentView {
                window_days: summary.recent.window_days,
                study_sessions: summary.recent.session_count,
                total_hours: round(summary.recent.total_hours),
                average_understanding: summary.recent.average_understanding.map(round),
            },
            topic_statistics: summary
                .topics
                .into_iter()
                .map(|t| TopicView {
                    topic: t.topic,
                    total_sessions: t.session_count,
                    total_hours: round(t.total_hours),
                    average_hours_per_session: round(t.average_hours_per_session),
                    average_understanding: round(t.average_understanding),
                    average_difficulty: round(t.average_difficulty),
                    last_studied: t.last_studied,
                })
                .collect(),
            skipped_records: summary.skipped_records,
        }
    }
}

async fn summarize_blocking(state: &AppState, scope: Scope) -> ApiResult<Summary> {
    let records = state.records.clone();
    let window = state.config.analytics.recent_window_days;
    blocking(move || summarize(&records, scope, window)).await
}

async fn learning_summary(
    State(state): State<AppState>,
    RequestScope(scope): RequestScope,
) -> ApiResult<Json<SummaryResponse>> {
    let analytics = &state.config.analytics;
    let summary = summarize_blocking(&state, scope).await?;
    Ok(Json(SummaryResponse::render(
        summary,
        analytics.display_precision,
    )))
}

async fn learning_report(
    State(state): State<AppState>,
    RequestScope(scope): RequestScope,
) -> ApiResult<impl IntoResponse> {
    let analytics = &state.config.analytics;
    let summary = summarize_blocking(&state, scope).await?;
    let report = ReportGenerator::markdown_report(&summary, analytics.display_precision);
    Ok((
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        report,
    ))
}
