use std::time::{Duration, Instant};

use serde_json::{json, Value};

use super::{CompletionRequest, StructuredReply, ThreadProcessor, UpstreamError};
use crate::config::OpenAiConfig;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// OpenAI-compatible chat completions client that forces a single tool call.
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(cfg: &OpenAiConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
        })
    }

    fn render_body(&self, req: &CompletionRequest<'_>) -> Value {
        json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "system", "content": req.system_prompt },
                {
                    "role": "user",
                    "content": format!(
                        "Please analyze the following thread discussion and provide structured output:\n\n{}",
                        req.transcript
                    )
                }
            ],
            "tools": [{
                "type": "function",
                "function": {
                    "name": req.function.name,
                    "description": req.function.description,
                    "parameters": req.function.parameters,
                }
            }],
            "tool_choice": { "type": "function", "function": { "name": req.function.name } }
        })
    }
}

/// Pull the function-call arguments out of a completion, preferring
/// `tool_calls` and falling back to the legacy `function_call`.
fn extract_arguments(reply: &Value) -> Result<Value, UpstreamError> {
    let message = reply
        .pointer("/choices/0/message")
        .ok_or_else(|| UpstreamError::Malformed("reply has no choices".into()))?;
    let raw = message
        .pointer("/tool_calls/0/function/arguments")
        .or_else(|| message.pointer("/function_call/arguments"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            UpstreamError::Malformed("No function call response received from model".into())
        })?;
    serde_json::from_str(raw)
        .map_err(|e| UpstreamError::Malformed(format!("function arguments are not JSON: {}", e)))
}

#[async_trait::async_trait]
impl ThreadProcessor for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: &CompletionRequest<'_>) -> Result<StructuredReply, UpstreamError> {
        let started = Instant::now();
        let body = self.render_body(req);
        tracing::debug!(
            model = %self.model,
            mode = %req.mode,
            transcript_len = req.transcript.len(),
            "sending completion request"
        );
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                tracing::warn!(error = ?err, "completion request failed to send");
                UpstreamError::from_message(&err.to_string())
            })?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|err| UpstreamError::from_message(&err.to_string()))?;
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "completion request rejected");
            return Err(UpstreamError::from_status(status, &text));
        }
        let json: Value = serde_json::from_str(&text)
            .map_err(|e| UpstreamError::Malformed(format!("reply is not JSON: {}", e)))?;
        let arguments = extract_arguments(&json)?;
        let tokens_used = json.pointer("/usage/total_tokens").and_then(Value::as_u64);
        tracing::debug!(
            model = %self.model,
            tokens_used = tokens_used.unwrap_or(0),
            duration_ms = started.elapsed().as_millis() as u64,
            "completion received"
        );
        Ok(StructuredReply {
            arguments,
            tokens_used,
        })
    }

    async fn health_check(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/models/{}", self.base_url, self.model))
            .bearer_auth(&self.api_key)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::warn!(status = resp.status().as_u16(), "model health check failed");
                false
            }
            Err(err) => {
                tracing::warn!(error = ?err, "model health check failed");
                false
            }
        }
    }
}
