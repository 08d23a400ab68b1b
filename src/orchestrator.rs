//! Thread processing pipeline.
//!
//! `received → validated → screened → routed → externally_processed →
//! responded`, or `rejected` at any gate.  Every exit carries the elapsed
//! time; the external call runs under what is left of the request budget.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};

use crate::error::AppError;
use crate::modes::{self, ProcessingMode};
use crate::results::ProcessingResult;
use crate::screening;
use crate::upstream::{CompletionRequest, ThreadProcessor};
use crate::util::{Deadline, Transcript};
use crate::validation;
use crate::{ProcessThreadRequest, ProcessThreadResponse, ResponseMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Screened,
    Routed,
    ExternallyProcessed,
    Responded,
    Rejected,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::Screened => "screened",
            Stage::Routed => "routed",
            Stage::ExternallyProcessed => "externally_processed",
            Stage::Responded => "responded",
            Stage::Rejected => "rejected",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed run: the error plus whatever request context was known.
#[derive(Debug)]
pub struct Rejection {
    pub error: AppError,
    /// Last stage reached before the failure.
    pub stage: Stage,
    pub processing_time_ms: u64,
    pub mode: Option<ProcessingMode>,
    pub thread_length: Option<usize>,
}

impl Rejection {
    /// Public details: the error's own fields plus timing and request shape.
    pub fn details(&self) -> Map<String, Value> {
        let mut details = self.error.public_details();
        details.insert("processingTimeMs".into(), json!(self.processing_time_ms));
        if let Some(mode) = self.mode {
            details.insert("mode".into(), json!(mode));
        }
        if let Some(len) = self.thread_length {
            details.insert("threadLength".into(), json!(len));
        }
        details
    }
}

#[derive(Debug)]
pub struct Processed {
    pub response: ProcessThreadResponse,
    pub tokens_used: Option<u64>,
}

#[derive(Clone)]
pub struct ThreadOrchestrator {
    processor: Arc<dyn ThreadProcessor>,
    timeout: Duration,
}

impl ThreadOrchestrator {
    pub fn new(processor: Arc<dyn ThreadProcessor>, timeout: Duration) -> Self {
        Self { processor, timeout }
    }

    pub fn processor(&self) -> &Arc<dyn ThreadProcessor> {
        &self.processor
    }

    /// Validate a raw body and run it through the pipeline.
    pub async fn handle(&self, body: &Value, started: Instant) -> Result<Processed, Rejection> {
        tracing::debug!(stage = %Stage::Received, "thread request received");
        match validation::validate_process_request(body) {
            Ok(request) => self.process(request, started).await,
            Err(violations) => {
                tracing::info!(
                    stage = %Stage::Rejected,
                    violations = violations.len(),
                    "thread request failed validation"
                );
                Err(Rejection {
                    error: AppError::Validation(violations),
                    stage: Stage::Received,
                    processing_time_ms: elapsed_ms(started),
                    mode: body
                        .get("mode")
                        .and_then(Value::as_str)
                        .and_then(|m| m.parse().ok()),
                    thread_length: body.get("thread").and_then(Value::as_array).map(Vec::len),
                })
            }
        }
    }

    /// Run an already-typed request.
    pub async fn process(
        &self,
        request: ProcessThreadRequest,
        started: Instant,
    ) -> Result<Processed, Rejection> {
        let deadline = Deadline::starting_at(started, self.timeout);
        let mode = request.mode;
        let thread_length = request.thread.len();
        let reject = |error: AppError, stage: Stage| Rejection {
            error,
            stage,
            processing_time_ms: elapsed_ms(started),
            mode: Some(mode),
            thread_length: Some(thread_length),
        };

        if request.thread.is_empty() {
            return Err(reject(AppError::EmptyThread, Stage::Validated));
        }
        screening::screen_thread(&request.thread).map_err(|e| reject(e, Stage::Validated))?;

        let transcript = Transcript::from_thread(&request.thread);
        tracing::info!(
            stage = %Stage::Screened,
            mode = %mode,
            thread_length,
            participants = ?transcript.participants,
            "processing thread"
        );

        let routed = modes::route(mode, request.options.as_ref());
        tracing::debug!(stage = %Stage::Routed, function = routed.function.name, "mode routed");

        let completion = CompletionRequest {
            mode,
            system_prompt: &routed.system_prompt,
            transcript: &transcript.text,
            function: routed.function,
        };
        let reply = match tokio::time::timeout(
            deadline.remaining(),
            self.processor.complete(&completion),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => {
                tracing::error!(mode = %mode, thread_length, error = %err, "external processing failed");
                return Err(reject(err.into(), Stage::Routed));
            }
            Err(_) => {
                tracing::warn!(
                    mode = %mode,
                    timeout_ms = deadline.budget_ms(),
                    "external processing timed out"
                );
                return Err(reject(
                    AppError::Timeout {
                        timeout_ms: deadline.budget_ms(),
                    },
                    Stage::Routed,
                ));
            }
        };

        let data = ProcessingResult::from_arguments(mode, reply.arguments)
            .map_err(|e| reject(e.into(), Stage::ExternallyProcessed))?;

        let processing_time_ms = elapsed_ms(started);
        tracing::info!(
            stage = %Stage::Responded,
            mode = %mode,
            thread_length,
            processing_time_ms,
            tokens_used = reply.tokens_used.unwrap_or(0),
            "thread processed"
        );
        Ok(Processed {
            response: ProcessThreadResponse {
                mode,
                success: true,
                data,
                metadata: ResponseMetadata {
                    processed_at: chrono::Utc::now().to_rfc3339(),
                    thread_length,
                    processing_time_ms,
                    model: self.processor.model().to_string(),
                },
            },
            tokens_used: reply.tokens_used,
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
