//! Mode routing: maps a [`ProcessingMode`] to the system prompt and the
//! function schema the language model must answer with.
//!
//! Routing is a pure function of `(mode, options)`; the schemas are built
//! once and shared.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::AppError;
use crate::ProcessingOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    Github,
    Notion,
    Summary,
}

impl ProcessingMode {
    pub const ALL: [ProcessingMode; 3] = [
        ProcessingMode::Github,
        ProcessingMode::Notion,
        ProcessingMode::Summary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingMode::Github => "github",
            ProcessingMode::Notion => "notion",
            ProcessingMode::Summary => "summary",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ProcessingMode::Github => {
                "Generate commit messages and PR suggestions from thread discussions"
            }
            ProcessingMode::Notion => {
                "Create actionable tasks and project items from conversations"
            }
            ProcessingMode::Summary => "Generate meeting summaries with decisions and action items",
        }
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(ProcessingMode::Github),
            "notion" => Ok(ProcessingMode::Notion),
            "summary" => Ok(ProcessingMode::Summary),
            other => Err(AppError::UnsupportedMode(other.to_string())),
        }
    }
}

/// A function the model is forced to call; `parameters` is a JSON Schema.
#[derive(Debug)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// Output of [`route`]: everything the upstream call needs besides the
/// transcript itself.
#[derive(Debug, Clone)]
pub struct ModeRoute {
    pub mode: ProcessingMode,
    pub system_prompt: String,
    pub function: &'static FunctionSpec,
}

fn confidence_schema() -> Value {
    json!({
        "type": "number",
        "description": "Confidence score from 0 to 1",
        "minimum": 0,
        "maximum": 1
    })
}

fn string_list(description: &str) -> Value {
    json!({ "type": "array", "items": { "type": "string" }, "description": description })
}

static GITHUB_FUNCTION: Lazy<FunctionSpec> = Lazy::new(|| FunctionSpec {
    name: "generate_github_suggestions",
    description: "Generate conventional commit messages and a pull request from a discussion",
    parameters: json!({
        "type": "object",
        "properties": {
            "commits": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "type": {
                            "type": "string",
                            "enum": ["feat", "fix", "docs", "style", "refactor", "test", "chore"],
                            "description": "Conventional commit type"
                        },
                        "scope": { "type": "string", "description": "Optional commit scope" },
                        "description": { "type": "string", "description": "Short imperative summary of the change" },
                        "body": { "type": "string", "description": "Optional longer explanation" },
                        "breakingChange": { "type": "boolean", "description": "Whether the change breaks compatibility" }
                    },
                    "required": ["type", "description"]
                }
            },
            "pullRequest": {
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "Clear, descriptive PR title" },
                    "description": { "type": "string", "description": "PR body with context and motivation" },
                    "labels": string_list("Labels that fit the change"),
                    "reviewers": string_list("Reviewers suggested by the discussion"),
                    "assignees": string_list("Suggested assignees")
                },
                "required": ["title", "description", "labels"]
            },
            "confidence": confidence_schema()
        },
        "required": ["commits", "pullRequest", "confidence"]
    }),
});

static NOTION_FUNCTION: Lazy<FunctionSpec> = Lazy::new(|| FunctionSpec {
    name: "generate_notion_tasks",
    description: "Break a discussion down into trackable tasks",
    parameters: json!({
        "type": "object",
        "properties": {
            "tasks": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string", "description": "Actionable task title" },
                        "description": { "type": "string", "description": "What needs to be done" },
                        "priority": { "type": "string", "enum": ["low", "medium", "high"] },
                        "status": { "type": "string", "enum": ["not_started", "in_progress", "completed"] },
                        "assignee": { "type": "string", "description": "Owner of the task" },
                        "dueDate": { "type": "string", "description": "Due date, ISO 8601" },
                        "tags": string_list("Tags for categorization"),
                        "estimatedHours": { "type": "number", "description": "Estimated effort in hours" }
                    },
                    "required": ["title", "priority", "status", "tags"]
                }
            },
            "summary": { "type": "string", "description": "One paragraph overview of the tasks" },
            "totalTasks": { "type": "number", "description": "Number of tasks produced" },
            "confidence": confidence_schema()
        },
        "required": ["tasks", "summary", "totalTasks", "confidence"]
    }),
});

static SUMMARY_FUNCTION: Lazy<FunctionSpec> = Lazy::new(|| FunctionSpec {
    name: "generate_meeting_summary",
    description: "Summarize a discussion for people who were not there",
    parameters: json!({
        "type": "object",
        "properties": {
            "title": { "type": "string", "description": "Descriptive title for the discussion" },
            "summary": { "type": "string", "description": "Summary of the discussion" },
            "keyPoints": string_list("Main points raised"),
            "actionItems": string_list("Concrete action items"),
            "decisions": string_list("Decisions that were made"),
            "nextSteps": string_list("What happens next"),
            "participants": string_list("People who took part"),
            "duration": { "type": "string", "description": "Estimated length of the discussion" },
            "confidence": confidence_schema()
        },
        "required": ["title", "summary", "keyPoints", "actionItems", "decisions", "nextSteps", "participants", "confidence"]
    }),
});

const GITHUB_PROMPT: &str = "You are a senior software engineer who keeps a clean Git history. \
Read the discussion and produce:\n\
1. Commit messages in conventional commits format\n\
2. A pull request title and description\n\
3. Fitting labels and reviewers\n\
Stay technically precise and only describe changes the discussion actually covers.";

const NOTION_PROMPT: &str = "You are an experienced project manager. \
Read the discussion and produce:\n\
1. Clear, actionable tasks\n\
2. A priority and, where obvious, an owner for each task\n\
3. Tags for categorization\n\
4. Realistic effort estimates\n\
Prefer small, measurable tasks over broad goals.";

const SUMMARY_PROMPT: &str = "You are a meticulous meeting note-taker. \
Read the discussion and produce:\n\
1. A summary of the conversation\n\
2. The key points and decisions\n\
3. Action items and next steps\n\
Write for stakeholders who were not present.";

/// Selects prompt and schema for `mode`.  Options only add context lines;
/// absent options add nothing, so equal inputs give equal output.
pub fn route(mode: ProcessingMode, options: Option<&ProcessingOptions>) -> ModeRoute {
    let mut hints: Vec<String> = Vec::new();
    let (base, function): (&str, &'static FunctionSpec) = match mode {
        ProcessingMode::Github => {
            if let Some(opts) = options {
                if let Some(repo) = &opts.repo_name {
                    hints.push(format!("Repository: {}", repo));
                }
                if let Some(branch) = &opts.branch_name {
                    hints.push(format!("Branch: {}", branch));
                }
            }
            (GITHUB_PROMPT, &*GITHUB_FUNCTION)
        }
        ProcessingMode::Notion => {
            if let Some(opts) = options {
                if let Some(priority) = opts.priority {
                    hints.push(format!("Default priority: {}", priority.as_str()));
                }
                if let Some(assignee) = &opts.assignee {
                    hints.push(format!("Default assignee: {}", assignee));
                }
                if let Some(db) = &opts.notion_database_id {
                    hints.push(format!("Target database: {}", db));
                }
            }
            (NOTION_PROMPT, &*NOTION_FUNCTION)
        }
        ProcessingMode::Summary => (SUMMARY_PROMPT, &*SUMMARY_FUNCTION),
    };

    let system_prompt = if hints.is_empty() {
        base.to_string()
    } else {
        format!("{}\n\n{}", base, hints.join("\n"))
    };
    ModeRoute {
        mode,
        system_prompt,
        function,
    }
}

/// Static description served by `GET /api/modes`.
pub fn catalog() -> Value {
    let descriptions: serde_json::Map<String, Value> = ProcessingMode::ALL
        .iter()
        .map(|m| (m.as_str().to_string(), json!(m.description())))
        .collect();
    json!({
        "available": ProcessingMode::ALL,
        "descriptions": descriptions,
        "examples": {
            "github": {
                "input": {
                    "thread": [
                        { "sender": "Alice", "text": "The login bug is fixed, ready for review" },
                        { "sender": "Bob", "text": "Great! I'll test it and merge if all looks good" }
                    ],
                    "mode": "github"
                },
                "output": "Commit messages and PR details"
            },
            "notion": {
                "input": {
                    "thread": [
                        { "sender": "Manager", "text": "We need to update the user dashboard" },
                        { "sender": "Dev", "text": "I can work on the UI improvements" }
                    ],
                    "mode": "notion"
                },
                "output": "Structured tasks with priorities and assignments"
            },
            "summary": {
                "input": {
                    "thread": [
                        { "sender": "Lead", "text": "Let's discuss the project timeline" },
                        { "sender": "Team", "text": "We need 2 more weeks for testing" }
                    ],
                    "mode": "summary"
                },
                "output": "Meeting summary with key decisions and next steps"
            }
        }
    })
}
