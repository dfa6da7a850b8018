use crate::config::Config;
use crate::db::{CompletedTaskPage, HobbyRow, NewHobby, NewTask, StudySessionRow, TaskRow};
use crate::engine::MutationOutcome;
use crate::engine::model::{ActivityKind, ComebackChallenge, WeeklyAggregate};
use crate::engine::streak::StreakSummary;
use crate::error::{EngineError, StoreError};
use crate::recommend::{MoodLabel, Suggestion};
use crate::report;
use crate::scheduler;
use crate::tracker::dashboard::Dashboard;
use crate::tracker::mood::{CheckIn, MoodEntry};
use crate::tracker::study::StudyAnswer;
use crate::tracker::tasks::{CompletedFilter, CompletionCounts, TaskCompletion};
use crate::tracker::teacher::TeacherOverview;
use crate::tracker::{CHALLENGE_HISTORY_LIMIT, ChallengeView, Tracker};
use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fs;
use std::path::Path as FsPath;
use std::sync::Arc;
use tracing::error;

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/status", get(status))
        .route("/api/v1/dashboard", get(dashboard))
        .route("/api/v1/mood", post(mood_check_in))
        .route("/api/v1/mood/another", post(mood_another))
        .route("/api/v1/mood/history", get(mood_history))
        .route("/api/v1/mood-entries/:id", delete(mood_delete))
        .route("/api/v1/recommendations/:id/done", post(recommendation_done))
        .route("/api/v1/tasks", get(tasks_pending).post(task_create))
        .route("/api/v1/tasks/:id", delete(task_delete))
        .route("/api/v1/tasks/:id/complete", post(task_complete))
        .route("/api/v1/tasks/:id/restore", post(task_restore))
        .route("/api/v1/completed-tasks", get(tasks_completed))
        .route("/api/v1/task-counts", get(task_counts))
        .route("/api/v1/hobbies", get(hobbies_list).post(hobby_create))
        .route("/api/v1/hobbies/:id", delete(hobby_delete))
        .route("/api/v1/hobbies/:id/sessions", post(hobby_session))
        .route("/api/v1/streaks", get(streaks))
        .route("/api/v1/challenge", get(challenge_get))
        .route("/api/v1/challenge/:id/accept", post(challenge_accept))
        .route("/api/v1/challenge/:id/skip", post(challenge_skip))
        .route("/api/v1/challenge-history", get(challenge_history))
        .route("/api/v1/weekly", get(weekly))
        .route("/api/v1/teacher/overview", get(teacher_overview))
        .route("/api/v1/study/ask", post(study_ask))
        .route("/api/v1/study/history", get(study_history))
        .route("/api/v1/reports", get(report_list).post(report_generate))
        .route("/api/v1/report/:date", get(report_by_date))
        .route("/api/v1/report/:date/markdown", get(report_markdown))
        .route(
            "/api/v1/settings/report-schedule",
            get(report_schedule_get).put(report_schedule_put),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    user: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct MoodPayload {
    mood: MoodLabel,
    energy: u8,
}

#[derive(Debug, Deserialize)]
struct AnotherPayload {
    mood: MoodLabel,
    energy: u8,
    current: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CompletePayload {
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SessionPayload {
    minutes: Option<i64>,
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AskPayload {
    question: String,
}

#[derive(Debug, Deserialize)]
struct OverviewQuery {
    user: Option<String>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
struct StatusPayload {
    version: &'static str,
    api_port: u16,
    report_time: String,
    utc_offset_minutes: i32,
    comeback_trigger: &'static str,
    default_user: Option<String>,
    known_users: usize,
    ai_enabled: bool,
}

#[derive(Debug, Serialize)]
struct ReportsPayload {
    reports: Vec<ReportView>,
}

#[derive(Debug, Serialize)]
struct ReportView {
    user_id: String,
    date: String,
    generated_at: i64,
    markdown_url: String,
    json_url: String,
}

#[derive(Debug, Serialize)]
struct ReportSchedulePayload {
    report_time: String,
    cron_expression: String,
}

#[derive(Debug, Deserialize)]
struct ReportScheduleUpdatePayload {
    report_time: String,
}

async fn status(State(state): State<ApiState>) -> ApiResult<Json<StatusPayload>> {
    let tracker = open_tracker(&state)?;
    let config = tracker.config();

    Ok(Json(StatusPayload {
        version: env!("CARGO_PKG_VERSION"),
        api_port: config.api_port,
        report_time: config.report_time.clone(),
        utc_offset_minutes: config.utc_offset_minutes,
        comeback_trigger: config.comeback_trigger.as_str(),
        default_user: config.default_user.clone(),
        known_users: tracker.database().known_users()?.len(),
        ai_enabled: config.ai_enabled,
    }))
}

async fn dashboard(
    State(state): State<ApiState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Dashboard>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let mut tracker = open_tracker(&state)?;
    Ok(Json(tracker.dashboard(&user, Utc::now())?))
}

async fn mood_check_in(
    State(state): State<ApiState>,
    Query(query): Query<UserQuery>,
    Json(payload): Json<MoodPayload>,
) -> ApiResult<Json<CheckIn>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let mut tracker = open_tracker(&state)?;
    Ok(Json(tracker.check_in(
        &user,
        payload.mood,
        payload.energy,
        Utc::now(),
    )?))
}

async fn mood_another(
    State(state): State<ApiState>,
    Json(payload): Json<AnotherPayload>,
) -> ApiResult<Json<Suggestion>> {
    let mut tracker = open_tracker(&state)?;
    Ok(Json(tracker.another_suggestion(
        payload.mood,
        payload.energy,
        payload.current,
    )?))
}

async fn mood_history(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<MoodEntry>>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let tracker = open_tracker(&state)?;
    let limit = query.limit.unwrap_or(30).clamp(1, 365);
    Ok(Json(tracker.mood_history(&user, limit)?))
}

async fn mood_delete(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Value>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let mut tracker = open_tracker(&state)?;
    tracker.delete_check_in(&user, id, Utc::now())?;
    Ok(Json(json!({ "deleted": true, "id": id })))
}

async fn recommendation_done(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<MutationOutcome>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let mut tracker = open_tracker(&state)?;
    Ok(Json(tracker.complete_recommendation(&user, id, Utc::now())?))
}

async fn tasks_pending(
    State(state): State<ApiState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Vec<TaskRow>>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let tracker = open_tracker(&state)?;
    Ok(Json(tracker.pending_tasks(&user)?))
}

async fn task_create(
    State(state): State<ApiState>,
    Query(query): Query<UserQuery>,
    Json(payload): Json<NewTask>,
) -> ApiResult<(StatusCode, Json<TaskRow>)> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let tracker = open_tracker(&state)?;
    let task = tracker.create_task(&user, &payload, Utc::now())?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn task_delete(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Value>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let mut tracker = open_tracker(&state)?;
    tracker.delete_task(&user, id)?;
    Ok(Json(json!({ "deleted": true, "id": id })))
}

async fn task_complete(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(query): Query<UserQuery>,
    payload: Option<Json<CompletePayload>>,
) -> ApiResult<Json<TaskCompletion>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    let mut tracker = open_tracker(&state)?;
    Ok(Json(tracker.complete_task(
        &user,
        id,
        payload.completed_at,
        Utc::now(),
    )?))
}

async fn task_restore(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Value>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let mut tracker = open_tracker(&state)?;
    tracker.restore_task(&user, id)?;
    Ok(Json(json!({ "restored": true, "id": id })))
}

async fn tasks_completed(
    State(state): State<ApiState>,
    Query(query): Query<UserQuery>,
    Query(filter): Query<CompletedFilter>,
) -> ApiResult<Json<CompletedTaskPage>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let tracker = open_tracker(&state)?;
    Ok(Json(tracker.completed_tasks(&user, &filter)?))
}

async fn task_counts(
    State(state): State<ApiState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<CompletionCounts>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let tracker = open_tracker(&state)?;
    Ok(Json(tracker.completion_counts(&user, Utc::now())?))
}

async fn hobbies_list(
    State(state): State<ApiState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Vec<HobbyRow>>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let tracker = open_tracker(&state)?;
    Ok(Json(tracker.hobbies(&user)?))
}

async fn hobby_create(
    State(state): State<ApiState>,
    Query(query): Query<UserQuery>,
    Json(payload): Json<NewHobby>,
) -> ApiResult<(StatusCode, Json<HobbyRow>)> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let tracker = open_tracker(&state)?;
    let hobby = tracker.create_hobby(&user, &payload, Utc::now())?;
    Ok((StatusCode::CREATED, Json(hobby)))
}

async fn hobby_delete(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Value>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let tracker = open_tracker(&state)?;
    tracker.delete_hobby(&user, id)?;
    Ok(Json(json!({ "deleted": true, "id": id })))
}

async fn hobby_session(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(query): Query<UserQuery>,
    payload: Option<Json<SessionPayload>>,
) -> ApiResult<Json<MutationOutcome>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    let mut tracker = open_tracker(&state)?;
    Ok(Json(tracker.log_session(
        &user,
        id,
        payload.minutes,
        payload.note.as_deref(),
        Utc::now(),
    )?))
}

async fn streaks(
    State(state): State<ApiState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Vec<StreakSummary>>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let mut tracker = open_tracker(&state)?;
    let today = tracker.today(Utc::now());

    let summaries = ActivityKind::ALL
        .into_iter()
        .map(|kind| tracker.streak_summary(&user, kind, today))
        .collect::<Result<Vec<_>>>()?;

    Ok(Json(summaries))
}

async fn challenge_get(
    State(state): State<ApiState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<ChallengeView>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let mut tracker = open_tracker(&state)?;
    Ok(Json(tracker.challenge_view(&user)?))
}

async fn challenge_accept(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Value>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let mut tracker = open_tracker(&state)?;
    let streaks_saved = tracker.accept_challenge(&user, id)?;
    Ok(Json(json!({ "completed": true, "streaks_saved": streaks_saved })))
}

async fn challenge_skip(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Value>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let mut tracker = open_tracker(&state)?;
    tracker.skip_challenge(&user, id)?;
    Ok(Json(json!({ "skipped": true })))
}

async fn challenge_history(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<ComebackChallenge>>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let mut tracker = open_tracker(&state)?;
    let limit = query.limit.unwrap_or(CHALLENGE_HISTORY_LIMIT).clamp(1, 50);
    Ok(Json(tracker.challenge_history(&user, limit)?))
}

async fn weekly(
    State(state): State<ApiState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<WeeklyAggregate>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let mut tracker = open_tracker(&state)?;
    let today = tracker.today(Utc::now());

    let aggregate = tracker
        .weekly(&user, today)?
        .ok_or_else(|| ApiError::NotFound(format!("No weekly data for {user}")))?;
    Ok(Json(aggregate))
}

async fn teacher_overview(
    State(state): State<ApiState>,
    Query(query): Query<OverviewQuery>,
) -> ApiResult<Json<TeacherOverview>> {
    let mut tracker = open_tracker(&state)?;
    Ok(Json(tracker.teacher_overview(
        query.user.as_deref(),
        query.from,
        query.to,
        Utc::now(),
    )?))
}

async fn study_ask(
    State(state): State<ApiState>,
    Query(query): Query<UserQuery>,
    Json(payload): Json<AskPayload>,
) -> ApiResult<Json<StudyAnswer>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let tracker = open_tracker(&state)?;
    Ok(Json(tracker.ask(&user, &payload.question, Utc::now())?))
}

async fn study_history(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<StudySessionRow>>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let tracker = open_tracker(&state)?;
    let limit = query.limit.unwrap_or(20).clamp(1, 200);
    Ok(Json(tracker.study_history(&user, limit)?))
}

async fn report_list(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<ReportsPayload>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let limit = query.limit.unwrap_or(7).clamp(1, 90);
    let tracker = open_tracker(&state)?;

    let reports = tracker
        .database()
        .list_reports(&user, limit)?
        .into_iter()
        .map(|meta| report_view(&meta.user_id, &meta.date, meta.generated_at))
        .collect::<Vec<_>>();

    Ok(Json(ReportsPayload { reports }))
}

async fn report_generate(
    State(state): State<ApiState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<ReportView>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let mut tracker = open_tracker(&state)?;
    let now = Utc::now();
    let today = tracker.today(now);

    let (report, _) = report::generate_and_store_report(&mut tracker, &user, today, now)?;
    Ok(Json(report_view(
        &report.user_id,
        &report.as_of.format("%Y-%m-%d").to_string(),
        now.timestamp(),
    )))
}

async fn report_by_date(
    State(state): State<ApiState>,
    Path(date): Path<String>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Value>> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let target_date = parse_date(&date)?;

    let tracker = open_tracker(&state)?;
    let report_meta = tracker
        .database()
        .report_meta(&user, target_date)?
        .ok_or_else(|| ApiError::NotFound(format!("No report found for date: {target_date}")))?;

    let report = load_json(FsPath::new(&report_meta.json_path))?;
    Ok(Json(report))
}

async fn report_markdown(
    State(state): State<ApiState>,
    Path(date): Path<String>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Response> {
    let user = resolve_user(&state, query.user.as_deref())?;
    let target_date = parse_date(&date)?;

    let tracker = open_tracker(&state)?;
    let report_meta = tracker
        .database()
        .report_meta(&user, target_date)?
        .ok_or_else(|| ApiError::NotFound(format!("No report found for date: {target_date}")))?;

    let markdown = fs::read_to_string(&report_meta.md_path)
        .with_context(|| format!("Failed to read Markdown report: {}", report_meta.md_path))?;

    let mut response = Response::new(markdown.into_response().into_body());
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/markdown; charset=utf-8"),
    );

    Ok(response)
}

async fn report_schedule_get(
    State(state): State<ApiState>,
) -> ApiResult<Json<ReportSchedulePayload>> {
    let config = Config::load().unwrap_or_else(|_| state.config.as_ref().clone());
    let cron_expression = scheduler::cron_from_report_time(&config.report_time)?;

    Ok(Json(ReportSchedulePayload {
        report_time: config.report_time,
        cron_expression,
    }))
}

async fn report_schedule_put(
    State(state): State<ApiState>,
    Json(payload): Json<ReportScheduleUpdatePayload>,
) -> ApiResult<Json<Value>> {
    let mut config = Config::load().unwrap_or_else(|_| state.config.as_ref().clone());
    let normalized_time = payload.report_time.trim().to_string();

    config
        .set_value("report_time", &normalized_time)
        .map_err(|error| ApiError::BadRequest(error.to_string()))?;
    config.save()?;

    let cron_expression = scheduler::cron_from_report_time(&config.report_time)?;

    Ok(Json(json!({
        "saved": true,
        "report_time": config.report_time,
        "cron_expression": cron_expression
    })))
}

fn open_tracker(state: &ApiState) -> Result<Tracker> {
    Tracker::open(state.config.as_ref().clone())
}

fn resolve_user(state: &ApiState, explicit: Option<&str>) -> ApiResult<String> {
    state
        .config
        .resolve_user(explicit)
        .map_err(|error| ApiError::BadRequest(error.to_string()))
}

fn report_view(user_id: &str, date: &str, generated_at: i64) -> ReportView {
    ReportView {
        user_id: user_id.to_string(),
        date: date.to_string(),
        generated_at,
        markdown_url: format!("/api/v1/report/{date}/markdown?user={user_id}"),
        json_url: format!("/api/v1/report/{date}?user={user_id}"),
    }
}

fn parse_date(input: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|_| {
        ApiError::BadRequest(format!("Invalid date format: {input}. Example: 2026-05-04"))
    })
}

fn load_json(path: &FsPath) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read report JSON file: {}", path.display()))?;

    let payload = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse report JSON file: {}", path.display()))?;

    Ok(payload)
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        match value.downcast_ref::<EngineError>() {
            Some(EngineError::NotFound(message)) => Self::NotFound(message.clone()),
            Some(EngineError::InvalidInput(message)) => Self::BadRequest(message.clone()),
            Some(EngineError::Store(StoreError::Rejected(message))) => {
                Self::BadRequest(message.clone())
            }
            _ => Self::Internal(value),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Internal(error) => {
                error!(error = %error, "API request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": error.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ApiError;
    use crate::error::{EngineError, StoreError};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    fn status_of(error: anyhow::Error) -> StatusCode {
        ApiError::from(error).into_response().status()
    }

    #[test]
    fn engine_errors_map_to_client_statuses() {
        assert_eq!(
            status_of(EngineError::NotFound("task 9".to_string()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(EngineError::InvalidInput("energy".to_string()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(EngineError::Store(StoreError::Rejected("done".to_string())).into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn transient_store_failures_are_internal() {
        assert_eq!(
            status_of(EngineError::Store(StoreError::Transient("locked".to_string())).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(anyhow::anyhow!("disk full")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
