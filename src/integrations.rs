//! Chat and delivery integrations (Slack, Discord, Notion, GitHub).
//!
//! Only the capability seams exist: every adapter is a [`StubIntegration`]
//! that refuses to run without credentials and otherwise logs the call.

use serde::Serialize;
use thiserror::Error;

use crate::config::IntegrationSettings;
use crate::results::{CommitSuggestion, NotionTask, PullRequestSuggestion};
use crate::ThreadMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationKind {
    Notion,
    Github,
    Slack,
    Discord,
}

impl IntegrationKind {
    pub const ALL: [IntegrationKind; 4] = [
        IntegrationKind::Notion,
        IntegrationKind::Github,
        IntegrationKind::Slack,
        IntegrationKind::Discord,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IntegrationKind::Notion => "notion",
            IntegrationKind::Github => "github",
            IntegrationKind::Slack => "slack",
            IntegrationKind::Discord => "discord",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntegrationError {
    #[error("{0} integration not configured")]
    NotConfigured(&'static str),
    #[error("no repository given and GITHUB_DEFAULT_REPO is not set")]
    MissingRepository,
}

#[async_trait::async_trait]
pub trait MessageSource: Send + Sync {
    async fn fetch_messages(
        &self,
        channel: &str,
        thread: Option<&str>,
    ) -> Result<Vec<ThreadMessage>, IntegrationError>;
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread: Option<&str>,
    ) -> Result<(), IntegrationError>;
}

#[async_trait::async_trait]
pub trait TaskSink: Send + Sync {
    /// Returns how many tasks were accepted.
    async fn create_tasks(&self, tasks: &[NotionTask]) -> Result<usize, IntegrationError>;
}

#[async_trait::async_trait]
pub trait PullRequestSink: Send + Sync {
    async fn create_pull_request(
        &self,
        repo: Option<&str>,
        pr: &PullRequestSuggestion,
        base: &str,
        head: &str,
    ) -> Result<(), IntegrationError>;
    /// Returns the rendered comment body.
    async fn comment_commit_suggestions(
        &self,
        repo: Option<&str>,
        issue: u64,
        commits: &[CommitSuggestion],
    ) -> Result<String, IntegrationError>;
}

#[derive(Debug, Clone)]
pub struct StubIntegration {
    kind: IntegrationKind,
    configured: bool,
    default_repo: Option<String>,
}

impl StubIntegration {
    pub fn new(kind: IntegrationKind, configured: bool) -> Self {
        Self {
            kind,
            configured,
            default_repo: None,
        }
    }

    pub fn kind(&self) -> IntegrationKind {
        self.kind
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    fn ensure_configured(&self) -> Result<(), IntegrationError> {
        if self.configured {
            Ok(())
        } else {
            Err(IntegrationError::NotConfigured(self.kind.as_str()))
        }
    }

    fn repo<'a>(&'a self, repo: Option<&'a str>) -> Result<&'a str, IntegrationError> {
        repo.or(self.default_repo.as_deref())
            .ok_or(IntegrationError::MissingRepository)
    }
}

#[async_trait::async_trait]
impl MessageSource for StubIntegration {
    async fn fetch_messages(
        &self,
        channel: &str,
        thread: Option<&str>,
    ) -> Result<Vec<ThreadMessage>, IntegrationError> {
        self.ensure_configured()?;
        tracing::info!(integration = self.kind.as_str(), channel, thread, "fetch messages (stub)");
        Ok(Vec::new())
    }

    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread: Option<&str>,
    ) -> Result<(), IntegrationError> {
        self.ensure_configured()?;
        tracing::info!(
            integration = self.kind.as_str(),
            channel,
            thread,
            len = text.len(),
            "post message (stub)"
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl TaskSink for StubIntegration {
    async fn create_tasks(&self, tasks: &[NotionTask]) -> Result<usize, IntegrationError> {
        self.ensure_configured()?;
        for task in tasks {
            tracing::info!(integration = self.kind.as_str(), title = %task.title, "create task (stub)");
        }
        Ok(tasks.len())
    }
}

#[async_trait::async_trait]
impl PullRequestSink for StubIntegration {
    async fn create_pull_request(
        &self,
        repo: Option<&str>,
        pr: &PullRequestSuggestion,
        base: &str,
        head: &str,
    ) -> Result<(), IntegrationError> {
        self.ensure_configured()?;
        let repo = self.repo(repo)?;
        tracing::info!(repo, base, head, title = %pr.title, "create pull request (stub)");
        Ok(())
    }

    async fn comment_commit_suggestions(
        &self,
        repo: Option<&str>,
        issue: u64,
        commits: &[CommitSuggestion],
    ) -> Result<String, IntegrationError> {
        self.ensure_configured()?;
        let repo = self.repo(repo)?;
        let body = format!(
            "## SmartThread Commit Suggestions\n\n{}",
            render_commit_suggestions(commits)
        );
        tracing::info!(repo, issue, commits = commits.len(), "comment commit suggestions (stub)");
        Ok(body)
    }
}

/// Markdown bullet list, one conventional-commit header per line.
pub fn render_commit_suggestions(commits: &[CommitSuggestion]) -> String {
    commits
        .iter()
        .map(|c| {
            let breaking = if c.breaking_change.unwrap_or(false) {
                " **BREAKING**"
            } else {
                ""
            };
            format!("- `{}`{}", c.header(), breaking)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrationStatus {
    pub name: &'static str,
    pub enabled: bool,
    pub configured: bool,
    pub status: &'static str,
}

#[derive(Debug, Clone)]
pub struct IntegrationRegistry {
    pub notion: StubIntegration,
    pub github: StubIntegration,
    pub slack: StubIntegration,
    pub discord: StubIntegration,
}

impl IntegrationRegistry {
    pub fn from_settings(s: &IntegrationSettings) -> Self {
        let mut github = StubIntegration::new(IntegrationKind::Github, s.github_token.is_some());
        github.default_repo = s.github_default_repo.clone();
        Self {
            notion: StubIntegration::new(
                IntegrationKind::Notion,
                s.notion_api_key.is_some() && s.notion_database_id.is_some(),
            ),
            github,
            slack: StubIntegration::new(
                IntegrationKind::Slack,
                s.slack_bot_token.is_some() && s.slack_signing_secret.is_some(),
            ),
            discord: StubIntegration::new(IntegrationKind::Discord, s.discord_bot_token.is_some()),
        }
    }

    pub fn get(&self, kind: IntegrationKind) -> &StubIntegration {
        match kind {
            IntegrationKind::Notion => &self.notion,
            IntegrationKind::Github => &self.github,
            IntegrationKind::Slack => &self.slack,
            IntegrationKind::Discord => &self.discord,
        }
    }

    pub fn task_sink(&self) -> &dyn TaskSink {
        &self.notion
    }

    pub fn pull_request_sink(&self) -> &dyn PullRequestSink {
        &self.github
    }

    pub fn message_source(&self, kind: IntegrationKind) -> Option<&dyn MessageSource> {
        match kind {
            IntegrationKind::Slack => Some(&self.slack),
            IntegrationKind::Discord => Some(&self.discord),
            _ => None,
        }
    }

    pub fn status(&self) -> Vec<IntegrationStatus> {
        IntegrationKind::ALL
            .iter()
            .map(|kind| {
                let configured = self.get(*kind).is_configured();
                IntegrationStatus {
                    name: kind.as_str(),
                    enabled: configured,
                    configured,
                    status: if configured {
                        "available"
                    } else {
                        "not_configured"
                    },
                }
            })
            .collect()
    }
}
