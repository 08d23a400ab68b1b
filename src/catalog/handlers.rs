use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{CatalogError, MemberFilter, NewMember, NewThread, Page, ThreadFilter, DEFAULT_PERIOD};
use crate::AppState;

/// Envelope shared by every catalog endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }
}

fn failure(status: StatusCode, error: impl Into<String>) -> Response {
    let body: ApiResponse<()> = ApiResponse {
        success: false,
        data: None,
        error: Some(error.into()),
        message: None,
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        let status = match &self {
            CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
            CatalogError::MissingNameOrEmail | CatalogError::Invalid(_) => StatusCode::BAD_REQUEST,
            CatalogError::DuplicateEmail => StatusCode::CONFLICT,
            CatalogError::Seed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        failure(status, self.to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    status: Option<String>,
    source: Option<String>,
    department: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
    period: Option<String>,
}

impl ListQuery {
    fn page(&self) -> Page {
        let defaults = Page::default();
        Page {
            limit: parse_or(self.limit.as_deref(), defaults.limit),
            offset: parse_or(self.offset.as_deref(), defaults.offset),
        }
    }
}

fn parse_or(raw: Option<&str>, default: usize) -> usize {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/threads", get(list_threads).post(create_thread))
        .route("/api/threads/:id", get(get_thread))
        .route("/api/thread", get(list_threads).post(create_thread))
        .route("/api/thread/:id", get(get_thread))
        .route("/api/teams", get(list_members).post(create_member))
        .route("/api/teams/:id", get(get_member).put(update_member))
        .route("/api/analytics", get(analytics))
        .route("/api/analytics/summary", get(analytics_summary))
        .route("/api/analytics/threads-processed", get(threads_processed))
        .route("/api/analytics/processing-time", get(processing_time))
        .route("/api/analytics/source-distribution", get(source_distribution))
}

async fn list_threads(State(state): State<AppState>, Query(q): Query<ListQuery>) -> Response {
    let filter = ThreadFilter {
        status: non_empty(&q.status),
        source: non_empty(&q.source),
    };
    let page = q.page();
    let (threads, total) = state.catalog.list_threads(&filter, page);
    Json(ApiResponse::ok(json!({
        "threads": threads,
        "total": total,
        "limit": page.limit,
        "offset": page.offset,
    })))
    .into_response()
}

async fn get_thread(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.catalog.get_thread(&id) {
        Ok(thread) => Json(ApiResponse::ok(thread)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn create_thread(
    State(state): State<AppState>,
    payload: Result<Json<NewThread>, JsonRejection>,
) -> Response {
    let new = match payload {
        Ok(Json(new)) => new,
        Err(rejection) => return failure(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let thread = state.catalog.create_thread(new);
    tracing::info!(id = %thread.id, source = thread.source.as_str(), "thread created");
    (
        StatusCode::CREATED,
        Json(ApiResponse::ok(thread).with_message("Thread created successfully")),
    )
        .into_response()
}

async fn list_members(State(state): State<AppState>, Query(q): Query<ListQuery>) -> Response {
    let filter = MemberFilter {
        department: non_empty(&q.department),
        status: non_empty(&q.status),
    };
    let page = q.page();
    let (members, total) = state.catalog.list_members(&filter, page);
    Json(ApiResponse::ok(json!({
        "members": members,
        "total": total,
        "limit": page.limit,
        "offset": page.offset,
    })))
    .into_response()
}

async fn get_member(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.catalog.get_member(&id) {
        Ok(member) => Json(ApiResponse::ok(member)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn create_member(
    State(state): State<AppState>,
    payload: Result<Json<NewMember>, JsonRejection>,
) -> Response {
    let new = match payload {
        Ok(Json(new)) => new,
        Err(rejection) => return failure(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    match state.catalog.create_member(new) {
        Ok(member) => (
            StatusCode::CREATED,
            Json(ApiResponse::ok(member).with_message("Team member added successfully")),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn update_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let patch = match payload {
        Ok(Json(Value::Object(map))) => map,
        Ok(Json(_)) => return failure(StatusCode::BAD_REQUEST, "Expected a JSON object"),
        Err(rejection) => return failure(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    match state.catalog.update_member(&id, &patch) {
        Ok(member) => {
            Json(ApiResponse::ok(member).with_message("Team member updated successfully"))
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn analytics(State(state): State<AppState>) -> Response {
    Json(ApiResponse::ok(state.catalog.analytics())).into_response()
}

async fn analytics_summary(State(state): State<AppState>) -> Response {
    Json(ApiResponse::ok(&state.catalog.analytics().summary)).into_response()
}

async fn threads_processed(State(state): State<AppState>, Query(q): Query<ListQuery>) -> Response {
    let period = parse_or(q.period.as_deref(), DEFAULT_PERIOD);
    Json(ApiResponse::ok(state.catalog.threads_processed(period))).into_response()
}

async fn processing_time(State(state): State<AppState>) -> Response {
    Json(ApiResponse::ok(&state.catalog.analytics().processing_time)).into_response()
}

async fn source_distribution(State(state): State<AppState>) -> Response {
    Json(ApiResponse::ok(&state.catalog.analytics().source_distribution)).into_response()
}
