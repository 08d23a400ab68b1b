//! Core library for SmartThread.  Wires the thread-processing pipeline, the
//! dashboard catalog, request/response envelopes and the HTTP handlers.

mod config;
pub mod catalog;
pub mod error;
pub mod integrations;
pub mod modes;
pub mod orchestrator;
pub mod ratelimit;
pub mod results;
pub mod screening;
pub mod telemetry;
pub mod upstream;
pub mod util;
pub mod validation;

pub use config::{AppConfig, Environment, IntegrationSettings, OpenAiConfig, RotationConfig};
pub use error::AppError;
pub use modes::ProcessingMode;
pub use results::ProcessingResult;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{
    rejection::{BytesRejection, FailedToBufferBody, JsonRejection},
    ConnectInfo, DefaultBodyLimit, Request, State,
};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::catalog::Catalog;
use crate::integrations::IntegrationRegistry;
use crate::orchestrator::{Rejection, ThreadOrchestrator};
use crate::ratelimit::{Decision, RateLimitConfig, RateLimiter};
use crate::telemetry::{EventLog, EventRecord, Metrics};
use crate::upstream::{OpenAiClient, ThreadProcessor};

/// One message of a submitted conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub sender: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// Advisory hints folded into the system prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notion_database_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<results::Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessThreadRequest {
    pub thread: Vec<ThreadMessage>,
    pub mode: ProcessingMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ProcessingOptions>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub processed_at: String,
    pub thread_length: usize,
    pub processing_time_ms: u64,
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessThreadResponse {
    pub mode: ProcessingMode,
    pub success: bool,
    pub data: ProcessingResult,
    pub metadata: ResponseMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ApiError,
}

impl ErrorResponse {
    pub fn new(code: &str, message: impl Into<String>, details: Map<String, Value>) -> Self {
        Self {
            success: false,
            error: ApiError {
                code: code.to_string(),
                message: message.into(),
                details: if details.is_empty() {
                    None
                } else {
                    Some(Value::Object(details))
                },
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
        }
    }
}

/// Client identifier resolved by the rate-limit middleware.
#[derive(Debug, Clone)]
pub struct ClientKey(pub String);

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orchestrator: ThreadOrchestrator,
    pub limiter: RateLimiter,
    /// Stricter limiter applied to `/api/process-thread` on top of `limiter`.
    pub process_limiter: Option<RateLimiter>,
    pub integrations: Arc<IntegrationRegistry>,
    pub catalog: Arc<Catalog>,
    pub telemetry: EventLog,
    pub metrics: Arc<Metrics>,
}

/// Build state from environment variables, talking to the OpenAI-compatible
/// endpoint named by `OPENAI_BASE_URL`.
pub async fn build_state_from_env() -> Result<AppState, Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    let processor = OpenAiClient::new(&config.openai)?;
    build_state(config, Arc::new(processor))
}

/// Build state around an arbitrary [`ThreadProcessor`].
pub fn build_state(
    config: AppConfig,
    processor: Arc<dyn ThreadProcessor>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    let orchestrator = ThreadOrchestrator::new(processor, config.request_timeout);
    let limiter = RateLimiter::new(config.rate_limit);
    let process_limiter = config.process_rate_limit_max.map(|max| {
        RateLimiter::new(RateLimitConfig {
            max_requests: max,
            window: config.rate_limit.window,
        })
    });
    let telemetry = EventLog::open(
        config.log_file.as_deref(),
        config.error_log_file.as_deref(),
        &config.rotation,
        config.log_stdout,
    );
    let integrations = IntegrationRegistry::from_settings(&config.integrations);
    let catalog = Catalog::seeded()?;

    tracing::info!(
        model = %orchestrator.processor().model(),
        environment = config.environment.as_str(),
        rate_limit_max = config.rate_limit.max_requests,
        timeout_ms = config.request_timeout.as_millis() as u64,
        "application state ready"
    );

    Ok(AppState {
        config: Arc::new(config),
        orchestrator,
        limiter,
        process_limiter,
        integrations: Arc::new(integrations),
        catalog: Arc::new(catalog),
        telemetry,
        metrics: Arc::new(Metrics::new()),
    })
}

/// Build the Axum router and attach handlers and cross-cutting layers.
pub fn app(state: AppState) -> Router {
    let max_request_bytes = state.config.max_request_bytes;

    let api = Router::new()
        .route("/api", get(api_index_handler))
        .route("/api/process-thread", post(process_thread_handler))
        .route("/api/modes", get(modes_handler))
        .route("/api/health", get(api_health_handler))
        .route("/api/integrations", get(integrations_handler))
        .merge(catalog::handlers::routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(liveness_handler))
        .route("/metrics", get(metrics_handler))
        .merge(api)
        .fallback(not_found_handler)
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'self'"),
        ))
        .layer(cors_layer(&state.config.frontend_url))
        .with_state(state)
}

fn cors_layer(frontend_url: &str) -> CorsLayer {
    let origin = HeaderValue::from_str(frontend_url).unwrap_or_else(|_| {
        tracing::warn!(frontend_url, "FRONTEND_URL is not a valid origin; using default");
        HeaderValue::from_static("http://localhost:3000")
    });
    CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(24 * 60 * 60))
}

/// Fixed-window limiting for everything under `/api`.  The process-thread
/// route also passes through the stricter limiter when one is configured.
async fn rate_limit(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = ratelimit::client_key(req.headers(), peer);

    let mut limiters = vec![&state.limiter];
    if req.uri().path() == "/api/process-thread" {
        if let Some(strict) = state.process_limiter.as_ref() {
            limiters.push(strict);
        }
    }

    let mut reported: Option<(u32, u32)> = None;
    for limiter in limiters {
        let cfg = limiter.config();
        match limiter.check(&key) {
            Decision::Allowed { remaining } => {
                if reported.map_or(true, |(_, r)| remaining <= r) {
                    reported = Some((cfg.max_requests, remaining));
                }
            }
            Decision::Limited { retry_after_secs } => {
                state.metrics.record_rate_limited();
                tracing::warn!(
                    client = %key,
                    path = %req.uri().path(),
                    retry_after_secs,
                    "rate limit exceeded"
                );
                let err = AppError::RateLimitExceeded {
                    retry_after_secs,
                    max_requests: cfg.max_requests,
                    window_secs: cfg.window.as_secs(),
                };
                return respond_with_error(&state, &err, Map::new());
            }
        }
    }

    req.extensions_mut().insert(ClientKey(key));
    let mut resp = next.run(req).await;
    if let Some((limit, remaining)) = reported {
        let headers = resp.headers_mut();
        headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
        headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
    }
    resp
}

/// Serialize `err` into the failure envelope.  Outside production the
/// internal cause is attached to the details.
pub fn respond_with_error(state: &AppState, err: &AppError, extra: Map<String, Value>) -> Response {
    let mut details = err.public_details();
    details.extend(extra);
    if !state.config.is_production() {
        if let Some(cause) = err.diagnostic() {
            details.insert("cause".into(), Value::String(cause));
        }
    }
    let body = ErrorResponse::new(err.code(), err.public_message(), details);
    let mut resp = (err.status(), Json(body)).into_response();
    if let AppError::RateLimitExceeded {
        retry_after_secs, ..
    } = err
    {
        resp.headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
    }
    resp
}

fn content_length_exceeds(headers: &HeaderMap, limit: usize) -> bool {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .map_or(false, |len| len > limit)
}

fn json_rejection_error(state: &AppState, rejection: JsonRejection) -> AppError {
    match rejection {
        JsonRejection::BytesRejection(BytesRejection::FailedToBufferBody(
            FailedToBufferBody::LengthLimitError(_),
        )) => {
            tracing::warn!(
                limit = state.config.max_request_bytes,
                "request body exceeded configured limit"
            );
            AppError::RequestTooLarge {
                limit: state.config.max_request_bytes,
            }
        }
        other => AppError::Validation(vec![validation::FieldViolation::new(
            "",
            other.body_text(),
        )]),
    }
}

/// Handler for `POST /api/process-thread`.
async fn process_thread_handler(
    State(state): State<AppState>,
    client: Option<Extension<ClientKey>>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let client = client
        .map(|Extension(ClientKey(k))| k)
        .unwrap_or_else(|| "unknown".to_string());

    let body = if content_length_exceeds(&headers, state.config.max_request_bytes) {
        Err(AppError::RequestTooLarge {
            limit: state.config.max_request_bytes,
        })
    } else {
        payload
            .map(|Json(v)| v)
            .map_err(|rejection| json_rejection_error(&state, rejection))
    };

    let outcome = match body {
        Ok(body) => state.orchestrator.handle(&body, started).await,
        Err(error) => Err(Rejection {
            error,
            stage: orchestrator::Stage::Received,
            processing_time_ms: started.elapsed().as_millis() as u64,
            mode: None,
            thread_length: None,
        }),
    };

    match outcome {
        Ok(processed) => {
            let resp = &processed.response;
            state
                .metrics
                .record_success(resp.metadata.processing_time_ms, processed.tokens_used);
            state.telemetry.record(&EventRecord {
                client: &client,
                status: 200,
                code: None,
                mode: Some(resp.mode.as_str()),
                thread_length: Some(resp.metadata.thread_length),
                processing_time_ms: resp.metadata.processing_time_ms,
                tokens_used: processed.tokens_used,
                message: None,
            });
            (StatusCode::OK, Json(processed.response)).into_response()
        }
        Err(rejection) => {
            let err = &rejection.error;
            state
                .metrics
                .record_error(err.code(), rejection.processing_time_ms);
            let message = err.to_string();
            state.telemetry.record(&EventRecord {
                client: &client,
                status: err.status().as_u16(),
                code: Some(err.code()),
                mode: rejection.mode.map(ProcessingMode::as_str),
                thread_length: rejection.thread_length,
                processing_time_ms: rejection.processing_time_ms,
                tokens_used: None,
                message: Some(&message),
            });
            tracing::info!(
                client = %client,
                code = err.code(),
                stage = %rejection.stage,
                processing_time_ms = rejection.processing_time_ms,
                "thread request rejected"
            );
            respond_with_error(&state, err, rejection.details())
        }
    }
}

async fn modes_handler() -> Json<Value> {
    Json(modes::catalog())
}

/// Readiness including a bounded check of the language model endpoint.
async fn api_health_handler(State(state): State<AppState>) -> Response {
    let healthy = state.orchestrator.processor().health_check().await;
    let body = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "services": {
            "openai": if healthy { "connected" } else { "disconnected" },
            "server": "running",
        },
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": state.metrics.uptime_secs(),
    });
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

async fn integrations_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "integrations": state.integrations.status(),
    }))
}

async fn api_index_handler(State(state): State<AppState>) -> Json<Value> {
    let supported: Vec<Value> = ProcessingMode::ALL
        .iter()
        .map(|m| json!({ "name": m, "description": m.description() }))
        .collect();
    let cfg = &state.config;
    Json(json!({
        "name": "SmartThread API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Turns chat threads into commit messages, PR titles, Notion tasks and meeting summaries",
        "endpoints": {
            "POST /api/process-thread": {
                "description": "Process a thread of messages into structured output",
                "parameters": {
                    "thread": "Array of messages with sender and text",
                    "mode": "Processing mode: github, notion, or summary",
                    "options": "Optional hints for the selected mode"
                },
                "example": {
                    "thread": [
                        { "sender": "Alice", "text": "Fixed the login bug" },
                        { "sender": "Bob", "text": "Great! Ready for merge" }
                    ],
                    "mode": "github"
                }
            },
            "GET /api/health": { "description": "API and language model health" },
            "GET /api/modes": { "description": "Available processing modes and examples" },
            "GET /api/integrations": { "description": "Status of external integrations" },
            "GET /api/threads": { "description": "Processed threads" },
            "GET /api/teams": { "description": "Team members" },
            "GET /api/analytics": { "description": "Processing analytics" }
        },
        "supportedModes": supported,
        "rateLimit": {
            "requests": cfg.rate_limit.max_requests,
            "windowSeconds": cfg.rate_limit.window.as_secs(),
        },
        "maxRequestSize": format!("{}KB", cfg.max_request_bytes / 1024),
    }))
}

async fn root_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "name": "SmartThread Backend",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Thread processing API",
        "status": "running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "endpoints": { "health": "/health", "api": "/api", "docs": "/api", "metrics": "/metrics" },
        "deployment": {
            "environment": state.config.environment.as_str(),
            "model": state.orchestrator.processor().model(),
        },
    }))
}

/// Liveness only; never touches the upstream.
async fn liveness_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": state.metrics.uptime_secs(),
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    let body = state.metrics.render(&state.telemetry);
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

async fn not_found_handler(method: Method, uri: axum::http::Uri) -> Response {
    let mut details = Map::new();
    details.insert(
        "availableRoutes".into(),
        json!([
            "GET /",
            "GET /health",
            "GET /metrics",
            "GET /api",
            "GET /api/health",
            "GET /api/modes",
            "GET /api/integrations",
            "POST /api/process-thread",
            "GET /api/threads",
            "GET /api/teams",
            "GET /api/analytics"
        ]),
    );
    let body = ErrorResponse::new(
        "NOT_FOUND",
        format!("Route {} {} not found", method, uri.path()),
        details,
    );
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}
