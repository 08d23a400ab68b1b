//! Typed processing results, one shape per [`ProcessingMode`].
//!
//! The upstream reply is untrusted: it is parsed into these types and then
//! normalized so the documented invariants hold regardless of what the model
//! returned (confidence in `[0, 1]`, `totalTasks == tasks.len()`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::modes::ProcessingMode;
use crate::upstream::UpstreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitType {
    Feat,
    Fix,
    Docs,
    Style,
    Refactor,
    Test,
    Chore,
}

impl CommitType {
    pub fn as_str(self) -> &'static str {
        match self {
            CommitType::Feat => "feat",
            CommitType::Fix => "fix",
            CommitType::Docs => "docs",
            CommitType::Style => "style",
            CommitType::Refactor => "refactor",
            CommitType::Test => "test",
            CommitType::Chore => "chore",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSuggestion {
    #[serde(rename = "type")]
    pub commit_type: CommitType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaking_change: Option<bool>,
}

impl CommitSuggestion {
    /// `type(scope): description` header line.
    pub fn header(&self) -> String {
        match &self.scope {
            Some(scope) if !scope.is_empty() => {
                format!("{}({}): {}", self.commit_type.as_str(), scope, self.description)
            }
            _ => format!("{}: {}", self.commit_type.as_str(), self.description),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestSuggestion {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignees: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubSuggestions {
    pub commits: Vec<CommitSuggestion>,
    pub pull_request: PullRequestSuggestion,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotionTask {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: Priority,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotionTasks {
    pub tasks: Vec<NotionTask>,
    pub summary: String,
    /// Recomputed from `tasks`; whatever the model claimed is discarded.
    #[serde(default, deserialize_with = "reported_count")]
    pub total_tasks: usize,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingSummary {
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    pub confidence: f64,
}

/// Result payload; serialized without a tag because the envelope carries
/// the mode next to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProcessingResult {
    Github(GithubSuggestions),
    Notion(NotionTasks),
    Summary(MeetingSummary),
}

impl ProcessingResult {
    /// Interpret the structured-reply arguments for `mode` and normalize.
    pub fn from_arguments(mode: ProcessingMode, arguments: Value) -> Result<Self, UpstreamError> {
        let parsed = match mode {
            ProcessingMode::Github => serde_json::from_value(arguments).map(ProcessingResult::Github),
            ProcessingMode::Notion => serde_json::from_value(arguments).map(ProcessingResult::Notion),
            ProcessingMode::Summary => {
                serde_json::from_value(arguments).map(ProcessingResult::Summary)
            }
        };
        let result = parsed.map_err(|e| {
            UpstreamError::Malformed(format!("{} reply does not match schema: {}", mode, e))
        })?;
        Ok(result.normalized())
    }

    pub fn mode(&self) -> ProcessingMode {
        match self {
            ProcessingResult::Github(_) => ProcessingMode::Github,
            ProcessingResult::Notion(_) => ProcessingMode::Notion,
            ProcessingResult::Summary(_) => ProcessingMode::Summary,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            ProcessingResult::Github(g) => g.confidence,
            ProcessingResult::Notion(n) => n.confidence,
            ProcessingResult::Summary(s) => s.confidence,
        }
    }

    fn normalized(mut self) -> Self {
        let confidence = match &mut self {
            ProcessingResult::Github(g) => &mut g.confidence,
            ProcessingResult::Notion(n) => {
                if n.total_tasks != n.tasks.len() {
                    tracing::warn!(
                        reported = n.total_tasks,
                        actual = n.tasks.len(),
                        "upstream totalTasks disagrees with task list; recomputing"
                    );
                }
                n.total_tasks = n.tasks.len();
                &mut n.confidence
            }
            ProcessingResult::Summary(s) => &mut s.confidence,
        };
        let clamped = clamp_confidence(*confidence);
        if clamped != *confidence {
            tracing::warn!(reported = *confidence, "confidence outside [0, 1]; clamping");
        }
        *confidence = clamped;
        self
    }
}

/// Advisory count from the model.  Any JSON value is accepted; anything
/// that is not a finite non-negative number reads as 0.
fn reported_count<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map_or(0, |n| n as usize))
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
