//! Error taxonomy for the thread-processing surface.
//!
//! Every failure a request can hit is an [`AppError`].  The variant decides
//! the HTTP status, the machine readable code and the user-safe message that
//! end up in the error envelope.

use axum::http::StatusCode;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::upstream::UpstreamError;
use crate::validation::FieldViolation;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("request validation failed ({} violation(s))", .0.len())]
    Validation(Vec<FieldViolation>),

    #[error("thread cannot be empty")]
    EmptyThread,

    /// Index of the first offending message; logged, never returned.
    #[error("thread message {message_index} matched a suspicious pattern")]
    SuspiciousContent { message_index: usize },

    #[error("unsupported processing mode: {0}")]
    UnsupportedMode(String),

    #[error("request body exceeds {limit} bytes")]
    RequestTooLarge { limit: usize },

    #[error("client exceeded {max_requests} requests per {window_secs}s")]
    RateLimitExceeded {
        retry_after_secs: u64,
        max_requests: u32,
        window_secs: u64,
    },

    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::EmptyThread
            | AppError::SuspiciousContent { .. }
            | AppError::UnsupportedMode(_) => StatusCode::BAD_REQUEST,
            AppError::RequestTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            AppError::Upstream(up) => match up {
                UpstreamError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
                UpstreamError::AuthFailed(_) => StatusCode::UNAUTHORIZED,
                UpstreamError::QuotaExceeded(_) => StatusCode::PAYMENT_REQUIRED,
                UpstreamError::Malformed(_) | UpstreamError::Unknown(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::EmptyThread => "EMPTY_THREAD",
            AppError::SuspiciousContent { .. } => "SUSPICIOUS_CONTENT",
            AppError::UnsupportedMode(_) => "UNSUPPORTED_MODE",
            AppError::RequestTooLarge { .. } => "REQUEST_TOO_LARGE",
            AppError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            AppError::Timeout { .. } => "REQUEST_TIMEOUT",
            AppError::Upstream(up) => match up {
                UpstreamError::RateLimited(_) => "RATE_LIMIT_ERROR",
                UpstreamError::AuthFailed(_) => "AUTH_ERROR",
                UpstreamError::QuotaExceeded(_) => "QUOTA_ERROR",
                UpstreamError::Malformed(_) | UpstreamError::Unknown(_) => "PROCESSING_ERROR",
            },
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Human summary safe to show to any client.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(_) => "Request validation failed".into(),
            AppError::EmptyThread => "Thread cannot be empty".into(),
            AppError::SuspiciousContent { .. } => {
                "Thread contains potentially harmful content".into()
            }
            AppError::UnsupportedMode(mode) => format!("Unsupported processing mode: {}", mode),
            AppError::RequestTooLarge { limit } => {
                format!("Request size exceeds {}KB limit", limit / 1024)
            }
            AppError::RateLimitExceeded {
                retry_after_secs, ..
            } => format!(
                "Too many requests. Try again in {} seconds.",
                retry_after_secs
            ),
            AppError::Timeout { .. } => "Request timeout".into(),
            AppError::Upstream(up) => match up {
                UpstreamError::RateLimited(_) => "Language model rate limit exceeded".into(),
                UpstreamError::AuthFailed(_) => "Language model authentication failed".into(),
                UpstreamError::QuotaExceeded(_) => "Language model quota exceeded".into(),
                UpstreamError::Malformed(_) | UpstreamError::Unknown(_) => {
                    "Failed to process thread".into()
                }
            },
            AppError::Internal(_) => "Internal server error".into(),
        }
    }

    /// Detail fields that are part of the public contract (always returned).
    pub fn public_details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        match self {
            AppError::Validation(violations) => {
                details.insert("violations".into(), json!(violations));
            }
            AppError::RateLimitExceeded {
                retry_after_secs,
                max_requests,
                window_secs,
            } => {
                details.insert("maxRequests".into(), json!(max_requests));
                details.insert("windowSeconds".into(), json!(window_secs));
                details.insert("retryAfter".into(), json!(retry_after_secs));
            }
            AppError::RequestTooLarge { limit } => {
                details.insert("maxBytes".into(), json!(limit));
            }
            AppError::Timeout { timeout_ms } => {
                details.insert("timeoutMs".into(), json!(timeout_ms));
            }
            _ => {}
        }
        details
    }

    /// Diagnostic text for non-production payloads.
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            AppError::Upstream(_) | AppError::Internal(_) => Some(self.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_variants_map_to_boundary_statuses() {
        let cases = [
            (UpstreamError::RateLimited("x".into()), 429, "RATE_LIMIT_ERROR"),
            (UpstreamError::AuthFailed("x".into()), 401, "AUTH_ERROR"),
            (UpstreamError::QuotaExceeded("x".into()), 402, "QUOTA_ERROR"),
            (UpstreamError::Malformed("x".into()), 500, "PROCESSING_ERROR"),
            (UpstreamError::Unknown("x".into()), 500, "PROCESSING_ERROR"),
        ];
        for (up, status, code) in cases {
            let err = AppError::from(up);
            assert_eq!(err.status().as_u16(), status);
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn local_rate_limit_details_carry_retry_after() {
        let err = AppError::RateLimitExceeded {
            retry_after_secs: 12,
            max_requests: 100,
            window_secs: 60,
        };
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        let details = err.public_details();
        assert_eq!(details.get("retryAfter"), Some(&json!(12)));
        assert!(err.public_message().contains("12 seconds"));
    }

    #[test]
    fn validation_error_lists_every_violation() {
        let err = AppError::Validation(vec![
            FieldViolation::new("thread", "Required"),
            FieldViolation::new("mode", "Mode must be one of: github, notion, summary"),
        ]);
        let details = err.public_details();
        let violations = details.get("violations").and_then(Value::as_array).unwrap();
        assert_eq!(violations.len(), 2);
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(err.diagnostic().is_none());
    }

    #[test]
    fn blocked_content_carries_no_cause() {
        let err = AppError::SuspiciousContent { message_index: 1 };
        assert_eq!(err.code(), "SUSPICIOUS_CONTENT");
        assert!(err.diagnostic().is_none());
        assert!(err.public_details().get("messageIndex").is_none());
    }
}
