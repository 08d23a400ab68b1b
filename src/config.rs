use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::ratelimit::RateLimitConfig;

pub const DEFAULT_MODEL: &str = "gpt-4-1106-preview";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 500 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(anyhow!(
                "APP_ENV must be one of development, production, test (got '{}')",
                other
            )),
        }
    }
}

#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub base_url: String,
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RotationConfig {
    pub max_bytes: Option<u64>,
    pub keep: usize,
    pub compress: bool,
}

/// Credentials that decide whether an integration counts as configured.
#[derive(Clone, Default)]
pub struct IntegrationSettings {
    pub notion_api_key: Option<String>,
    pub notion_database_id: Option<String>,
    pub github_token: Option<String>,
    pub github_default_repo: Option<String>,
    pub slack_bot_token: Option<String>,
    pub slack_signing_secret: Option<String>,
    pub discord_bot_token: Option<String>,
}

impl fmt::Debug for IntegrationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn present(v: &Option<String>) -> &'static str {
            if v.is_some() {
                "<set>"
            } else {
                "<unset>"
            }
        }
        f.debug_struct("IntegrationSettings")
            .field("notion_api_key", &present(&self.notion_api_key))
            .field("notion_database_id", &self.notion_database_id)
            .field("github_token", &present(&self.github_token))
            .field("github_default_repo", &self.github_default_repo)
            .field("slack_bot_token", &present(&self.slack_bot_token))
            .field("slack_signing_secret", &present(&self.slack_signing_secret))
            .field("discord_bot_token", &present(&self.discord_bot_token))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub openai: OpenAiConfig,
    pub environment: Environment,
    pub port: u16,
    pub frontend_url: String,
    pub rate_limit: RateLimitConfig,
    /// Stricter per-client cap for `/api/process-thread` only.
    pub process_rate_limit_max: Option<u32>,
    pub max_request_bytes: usize,
    pub request_timeout: Duration,
    pub log_file: Option<String>,
    pub error_log_file: Option<String>,
    pub rotation: RotationConfig,
    pub log_stdout: bool,
    pub integrations: IntegrationSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = optional_string("OPENAI_API_KEY")
            .context("OPENAI_API_KEY is required to reach the language model")?;

        let temperature = parse_optional_f32("OPENAI_TEMPERATURE")?.unwrap_or(0.7);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(anyhow!("OPENAI_TEMPERATURE must be between 0 and 2"));
        }

        let openai = OpenAiConfig {
            api_key,
            model: optional_string("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature,
            max_tokens: parse_optional_u32("OPENAI_MAX_TOKENS")?.unwrap_or(2000),
            base_url: optional_string("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        };

        let environment = match optional_string("APP_ENV") {
            Some(raw) => raw.parse()?,
            None => Environment::Development,
        };

        let port = match parse_optional_u64("PORT")? {
            Some(p) => u16::try_from(p).map_err(|_| anyhow!("PORT must fit in 16 bits"))?,
            None => 3001,
        };

        let rate_limit = RateLimitConfig {
            max_requests: parse_optional_u32("SMARTTHREAD_RATE_LIMIT_MAX")?.unwrap_or(100),
            window: Duration::from_secs(
                parse_optional_u64("SMARTTHREAD_RATE_LIMIT_WINDOW_SECS")?
                    .unwrap_or(60)
                    .max(1),
            ),
        };

        let rotation = RotationConfig {
            max_bytes: Some(parse_optional_u64("LOG_MAX_BYTES")?.unwrap_or(5 * 1024 * 1024)),
            keep: parse_optional_u64("LOG_ROTATE_KEEP")?.unwrap_or(5) as usize,
            compress: parse_bool_env("LOG_ROTATE_COMPRESS")?.unwrap_or(false),
        };

        Ok(Self {
            openai,
            environment,
            port,
            frontend_url: optional_string("FRONTEND_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            rate_limit,
            process_rate_limit_max: parse_optional_u32("SMARTTHREAD_PROCESS_RATE_LIMIT_MAX")?,
            max_request_bytes: parse_optional_u64("SMARTTHREAD_MAX_REQUEST_BYTES")?
                .map(|v| v as usize)
                .unwrap_or(DEFAULT_MAX_REQUEST_BYTES),
            request_timeout: Duration::from_millis(
                parse_optional_u64("SMARTTHREAD_REQUEST_TIMEOUT_MS")?.unwrap_or(30_000),
            ),
            log_file: optional_string("LOG_FILE"),
            error_log_file: optional_string("ERROR_LOG_FILE"),
            rotation,
            log_stdout: parse_bool_env("SMARTTHREAD_LOG_STDOUT")?.unwrap_or(false),
            integrations: IntegrationSettings {
                notion_api_key: optional_string("NOTION_API_KEY"),
                notion_database_id: optional_string("NOTION_DATABASE_ID"),
                github_token: optional_string("GITHUB_TOKEN"),
                github_default_repo: optional_string("GITHUB_DEFAULT_REPO"),
                slack_bot_token: optional_string("SLACK_BOT_TOKEN"),
                slack_signing_secret: optional_string("SLACK_SIGNING_SECRET"),
                discord_bot_token: optional_string("DISCORD_BOT_TOKEN"),
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

fn optional_string(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_optional_u32(var: &str) -> Result<Option<u32>> {
    parse_optional_u64(var)?
        .map(|v| u32::try_from(v).map_err(|_| anyhow!("{} is too large", var)))
        .transpose()
}

fn parse_optional_f32(var: &str) -> Result<Option<f32>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<f32>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a number", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool_env(var: &str) -> Result<Option<bool>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value)
            .map(Some)
            .ok_or_else(|| anyhow!("{} must be a boolean (true/false/1/0)", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
