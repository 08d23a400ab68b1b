#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use smartthread::ratelimit::RateLimitConfig;
use smartthread::{
    app, build_state, AppConfig, AppState, Environment, IntegrationSettings, OpenAiConfig,
    RotationConfig,
};
use smartthread::upstream::OpenAiClient;
use tokio::net::TcpListener;

/// Tracks environment variable mutations and restores originals on drop.
pub struct EnvGuard {
    originals: HashMap<String, Option<String>>,
}

impl EnvGuard {
    pub fn new() -> Self {
        Self {
            originals: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.capture(key);
        std::env::set_var(key, value);
    }

    pub fn set_many(&mut self, entries: &[(&str, &str)]) {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.capture(key);
        std::env::remove_var(key);
    }

    fn capture(&mut self, key: &str) {
        if self.originals.contains_key(key) {
            return;
        }
        let original = std::env::var(key).ok();
        self.originals.insert(key.to_string(), original);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, original) in self.originals.drain() {
            match original {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

/// What the mock model endpoint answers with.
#[derive(Clone)]
pub struct MockReply {
    pub status: u16,
    pub body: Value,
    pub delay: Duration,
}

impl MockReply {
    /// Successful completion carrying `arguments` as a forced tool call.
    pub fn tool_call(arguments: Value) -> Self {
        Self {
            status: 200,
            body: json!({
                "id": "chatcmpl-test",
                "object": "chat.completion",
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": { "name": "generated", "arguments": arguments.to_string() }
                        }]
                    },
                    "finish_reason": "tool_calls"
                }],
                "usage": { "prompt_tokens": 100, "completion_tokens": 50, "total_tokens": 150 }
            }),
            delay: Duration::ZERO,
        }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": { "message": message, "type": "invalid_request_error" } }),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

struct MockInner {
    reply: Mutex<MockReply>,
    requests: Mutex<Vec<Value>>,
    calls: AtomicUsize,
    models_ok: AtomicBool,
}

/// Minimal OpenAI-compatible server: `POST /chat/completions` and
/// `GET /models/:model`.
#[derive(Clone)]
pub struct MockOpenAi {
    pub base_url: String,
    inner: Arc<MockInner>,
}

impl MockOpenAi {
    pub async fn start(reply: MockReply) -> Self {
        let inner = Arc::new(MockInner {
            reply: Mutex::new(reply),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            models_ok: AtomicBool::new(true),
        });
        let router = Router::new()
            .route("/chat/completions", post(mock_completion))
            .route("/models/:model", get(mock_model))
            .with_state(inner.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Self {
            base_url: format!("http://{}", addr),
            inner,
        }
    }

    pub fn set_reply(&self, reply: MockReply) {
        *self.inner.reply.lock().unwrap() = reply;
    }

    pub fn set_models_ok(&self, ok: bool) {
        self.inner.models_ok.store(ok, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<Value> {
        self.inner.requests.lock().unwrap().last().cloned()
    }
}

async fn mock_completion(State(inner): State<Arc<MockInner>>, Json(body): Json<Value>) -> Response {
    inner.calls.fetch_add(1, Ordering::SeqCst);
    inner.requests.lock().unwrap().push(body);
    let reply = inner.reply.lock().unwrap().clone();
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    let status = StatusCode::from_u16(reply.status).unwrap();
    (status, Json(reply.body)).into_response()
}

async fn mock_model(State(inner): State<Arc<MockInner>>, Path(model): Path<String>) -> Response {
    if inner.models_ok.load(Ordering::SeqCst) {
        Json(json!({ "id": model, "object": "model" })).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": { "message": "Incorrect API key provided" } })),
        )
            .into_response()
    }
}

/// Configuration pointing at `openai_base` with logging files disabled.
pub fn test_config(openai_base: &str) -> AppConfig {
    AppConfig {
        openai: OpenAiConfig {
            api_key: "sk-test".into(),
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            max_tokens: 2000,
            base_url: openai_base.into(),
        },
        environment: Environment::Test,
        port: 0,
        frontend_url: "http://localhost:3000".into(),
        rate_limit: RateLimitConfig::default(),
        process_rate_limit_max: None,
        max_request_bytes: 500 * 1024,
        request_timeout: Duration::from_secs(30),
        log_file: None,
        error_log_file: None,
        rotation: RotationConfig {
            max_bytes: None,
            keep: 5,
            compress: false,
        },
        log_stdout: false,
        integrations: IntegrationSettings::default(),
    }
}

pub fn state_for(config: AppConfig) -> AppState {
    let client = OpenAiClient::new(&config.openai).unwrap();
    build_state(config, Arc::new(client)).unwrap()
}

pub struct TestServer {
    pub base: String,
    pub state: AppState,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

pub async fn spawn_server(config: AppConfig) -> TestServer {
    spawn_with_state(state_for(config)).await
}

pub async fn spawn_with_state(state: AppState) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(state.clone());
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = rx.await;
        })
        .await
        .ok();
    });
    TestServer {
        base: format!("http://{}", addr),
        state,
        shutdown: Some(tx),
        handle: Some(handle),
    }
}

pub fn github_arguments() -> Value {
    json!({
        "commits": [
            { "type": "fix", "scope": "auth", "description": "resolve login failure on expired tokens" },
            { "type": "test", "description": "cover token refresh path" }
        ],
        "pullRequest": {
            "title": "Fix login failure on expired tokens",
            "description": "Refreshes tokens before validation.",
            "labels": ["bug", "auth"]
        },
        "confidence": 0.92
    })
}

pub fn notion_arguments() -> Value {
    json!({
        "tasks": [
            { "title": "Update dashboard charts", "priority": "high", "status": "not_started", "assignee": "Alice" },
            { "title": "Write release notes", "priority": "low", "status": "not_started" }
        ],
        "summary": "Two follow-ups from the planning sync",
        "totalTasks": 5,
        "confidence": 0.8
    })
}

pub fn summary_arguments() -> Value {
    json!({
        "title": "Sprint planning",
        "summary": "The team agreed on the sprint scope.",
        "keyPoints": ["Scope fixed"],
        "actionItems": ["Alice drafts the plan"],
        "decisions": ["Ship on Friday"],
        "nextSteps": ["Review on Monday"],
        "participants": ["Alice", "Bob"],
        "confidence": 1.4
    })
}

pub fn thread_body(mode: &str) -> Value {
    json!({
        "thread": [
            { "sender": "Alice", "text": "Fixed the login bug with expired tokens", "timestamp": "2024-01-15T10:00:00Z" },
            { "sender": "Bob", "text": "Great! Ready for merge" }
        ],
        "mode": mode
    })
}
