//! External processing client seam.
//!
//! [`ThreadProcessor`] is the one place the service talks to a language
//! model.  Implementations make exactly one call per request and neither
//! retry nor time out on their own: the orchestrator bounds the call and
//! cancels it by dropping the future.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::modes::{FunctionSpec, ProcessingMode};

pub mod openai;

pub use openai::OpenAiClient;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("upstream rate limit: {0}")]
    RateLimited(String),
    #[error("upstream authentication failed: {0}")]
    AuthFailed(String),
    #[error("upstream quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("malformed upstream reply: {0}")]
    Malformed(String),
    #[error("upstream failure: {0}")]
    Unknown(String),
}

impl UpstreamError {
    /// Classify a non-success HTTP reply.  `body` is the raw error body.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let detail = error_detail(body);
        match status.as_u16() {
            401 | 403 => UpstreamError::AuthFailed(detail),
            402 => UpstreamError::QuotaExceeded(detail),
            429 if body.contains("insufficient_quota") => UpstreamError::QuotaExceeded(detail),
            429 => UpstreamError::RateLimited(detail),
            _ => {
                let classified = Self::from_message(&detail);
                match classified {
                    UpstreamError::Unknown(msg) => {
                        UpstreamError::Unknown(format!("HTTP {}: {}", status.as_u16(), msg))
                    }
                    other => other,
                }
            }
        }
    }

    /// Fallback classifier for failures that carry only text.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("rate limit") {
            UpstreamError::RateLimited(message.to_string())
        } else if lower.contains("authentication") {
            UpstreamError::AuthFailed(message.to_string())
        } else if lower.contains("quota") {
            UpstreamError::QuotaExceeded(message.to_string())
        } else {
            UpstreamError::Unknown(message.to_string())
        }
    }
}

/// `error.message` from an OpenAI-style error body, else the body itself.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

pub struct CompletionRequest<'a> {
    pub mode: ProcessingMode,
    pub system_prompt: &'a str,
    pub transcript: &'a str,
    pub function: &'a FunctionSpec,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructuredReply {
    /// Parsed function-call arguments.
    pub arguments: Value,
    pub tokens_used: Option<u64>,
}

#[async_trait::async_trait]
pub trait ThreadProcessor: Send + Sync {
    fn model(&self) -> &str;
    async fn complete(&self, req: &CompletionRequest<'_>) -> Result<StructuredReply, UpstreamError>;
    /// Reachability of the model endpoint.  Implementations bound their own
    /// wait and report `false` when it runs out.
    async fn health_check(&self) -> bool;
}
