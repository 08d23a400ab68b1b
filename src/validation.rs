//! Schema validation for `POST /api/process-thread`.
//!
//! The body is walked as raw JSON so that every violation can be reported in
//! one pass, each with a dot-joined path (`thread.3.sender`,
//! `options.priority`).

use serde::Serialize;
use serde_json::{Map, Value};

use crate::modes::ProcessingMode;
use crate::results::Priority;
use crate::{ProcessThreadRequest, ProcessingOptions, ThreadMessage};

pub const MAX_THREAD_MESSAGES: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub path: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Validate a raw request body.  Unknown keys are dropped; `null` on an
/// optional field counts as absent.
pub fn validate_process_request(body: &Value) -> Result<ProcessThreadRequest, Vec<FieldViolation>> {
    let mut violations = Vec::new();

    let Some(obj) = body.as_object() else {
        return Err(vec![FieldViolation::new("", "Expected object")]);
    };

    let thread = validate_thread(obj.get("thread"), &mut violations);
    let mode = validate_mode(obj.get("mode"), &mut violations);
    let options = validate_options(obj.get("options"), &mut violations);

    match (thread, mode) {
        (Some(thread), Some(mode)) if violations.is_empty() => Ok(ProcessThreadRequest {
            thread,
            mode,
            options,
        }),
        _ => Err(violations),
    }
}

fn validate_thread(
    value: Option<&Value>,
    violations: &mut Vec<FieldViolation>,
) -> Option<Vec<ThreadMessage>> {
    let items = match value {
        None | Some(Value::Null) => {
            violations.push(FieldViolation::new("thread", "Required"));
            return None;
        }
        Some(Value::Array(items)) => items,
        Some(_) => {
            violations.push(FieldViolation::new("thread", "Expected array"));
            return None;
        }
    };

    if items.is_empty() {
        violations.push(FieldViolation::new(
            "thread",
            "Thread must contain at least one message",
        ));
    } else if items.len() > MAX_THREAD_MESSAGES {
        violations.push(FieldViolation::new(
            "thread",
            format!("Thread cannot exceed {} messages", MAX_THREAD_MESSAGES),
        ));
    }

    let before = violations.len();
    let messages: Vec<ThreadMessage> = items
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| validate_message(idx, item, violations))
        .collect();

    if violations.len() == before && !items.is_empty() && items.len() <= MAX_THREAD_MESSAGES {
        Some(messages)
    } else {
        None
    }
}

fn validate_message(
    idx: usize,
    item: &Value,
    violations: &mut Vec<FieldViolation>,
) -> Option<ThreadMessage> {
    let base = format!("thread.{}", idx);
    let Some(obj) = item.as_object() else {
        violations.push(FieldViolation::new(base, "Expected object"));
        return None;
    };

    let sender = required_text(obj, "sender", &base, "Sender is required", violations);
    let text = required_text(obj, "text", &base, "Text is required", violations);
    let timestamp = optional_string(obj, "timestamp", &base, violations);
    let metadata = match obj.get("metadata") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map.clone()),
        Some(_) => {
            violations.push(FieldViolation::new(
                format!("{}.metadata", base),
                "Expected object",
            ));
            None
        }
    };

    Some(ThreadMessage {
        sender: sender?,
        text: text?,
        timestamp,
        metadata,
    })
}

fn required_text(
    obj: &Map<String, Value>,
    key: &str,
    base: &str,
    empty_message: &str,
    violations: &mut Vec<FieldViolation>,
) -> Option<String> {
    let path = format!("{}.{}", base, key);
    match obj.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::String(_)) | None | Some(Value::Null) => {
            violations.push(FieldViolation::new(path, empty_message));
            None
        }
        Some(_) => {
            violations.push(FieldViolation::new(path, "Expected string"));
            None
        }
    }
}

fn optional_string(
    obj: &Map<String, Value>,
    key: &str,
    base: &str,
    violations: &mut Vec<FieldViolation>,
) -> Option<String> {
    match obj.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            let path = if base.is_empty() {
                key.to_string()
            } else {
                format!("{}.{}", base, key)
            };
            violations.push(FieldViolation::new(path, "Expected string"));
            None
        }
    }
}

fn validate_mode(value: Option<&Value>, violations: &mut Vec<FieldViolation>) -> Option<ProcessingMode> {
    let parsed = value
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<ProcessingMode>().ok());
    if parsed.is_none() {
        violations.push(FieldViolation::new(
            "mode",
            "Mode must be one of: github, notion, summary",
        ));
    }
    parsed
}

fn validate_options(
    value: Option<&Value>,
    violations: &mut Vec<FieldViolation>,
) -> Option<ProcessingOptions> {
    let obj = match value {
        None | Some(Value::Null) => return None,
        Some(Value::Object(obj)) => obj,
        Some(_) => {
            violations.push(FieldViolation::new("options", "Expected object"));
            return None;
        }
    };

    let priority = match obj.get("priority") {
        None | Some(Value::Null) => None,
        Some(v) => {
            let parsed = v.as_str().and_then(Priority::parse);
            if parsed.is_none() {
                violations.push(FieldViolation::new(
                    "options.priority",
                    "Priority must be one of: low, medium, high",
                ));
            }
            parsed
        }
    };

    Some(ProcessingOptions {
        repo_name: optional_string(obj, "repoName", "options", violations),
        branch_name: optional_string(obj, "branchName", "options", violations),
        notion_database_id: optional_string(obj, "notionDatabaseId", "options", violations),
        priority,
        assignee: optional_string(obj, "assignee", "options", violations),
    })
}
