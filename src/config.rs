use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::pr::{self, RepoRef};

/// Default config file looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = ".pr-diary.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration loaded from .pr-diary.toml plus environment overrides.
///
/// All fields are optional. Without a webhook secret signature verification is
/// disabled, without a GitHub token enrichment yields empty file lists, without
/// a summarizer key every summary is the fallback template, and without a sink
/// URL summaries are printed to stdout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,

    #[serde(default)]
    pub summarizer: SummarizerConfig,

    #[serde(default)]
    pub publisher: PublisherConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    /// Repository this deployment watches (e.g. https://github.com/org/repo).
    pub repo_url: Option<String>,
    /// API token used for enrichment. Overridden by GITHUB_TOKEN.
    pub token: Option<String>,
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    /// Attempts per file-list page, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            repo_url: None,
            token: None,
            api_url: default_github_api_url(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookConfig {
    /// Shared secret configured on the GitHub webhook. Overridden by WEBHOOK_SECRET.
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummarizerConfig {
    /// Chat-completions API key. Overridden by OPENAI_API_KEY.
    pub api_key: Option<String>,
    #[serde(default = "default_summarizer_api_url")]
    pub api_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_summarizer_api_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublisherConfig {
    /// Messaging sink endpoint. Overridden by FEISHU_URL.
    pub url: Option<String>,
    /// Optional bearer token for the sink. Overridden by FEISHU_TOKEN.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Upper bound on dispatch tasks running at the same time.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Accepted events waiting for a free slot before new ones are dropped.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            queue_depth: default_queue_depth(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Timeout applied to every outbound request.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_summarizer_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_max_tokens() -> u32 {
    500
}

fn default_temperature() -> f32 {
    0.7
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}

fn default_max_concurrent() -> usize {
    4
}

fn default_queue_depth() -> usize {
    64
}

fn default_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Load configuration from `path`, or from .pr-diary.toml in the current
    /// directory when no path is given, then apply environment overrides.
    ///
    /// A missing default file yields the default config; an explicitly given
    /// path must exist.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::load_from(path)?
                } else {
                    Config::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific path without environment overrides.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Override file values with the recognized environment variables.
    ///
    /// Empty variables are treated as unset so `WEBHOOK_SECRET=` cannot
    /// silently disable verification configured in the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("GITHUB_REPO_URL") {
            self.github.repo_url = Some(value);
        }
        if let Some(value) = get("GITHUB_TOKEN") {
            self.github.token = Some(value);
        }
        if let Some(value) = get("WEBHOOK_SECRET") {
            self.webhook.secret = Some(value);
        }
        if let Some(value) = get("OPENAI_API_KEY") {
            self.summarizer.api_key = Some(value);
        }
        if let Some(value) = get("FEISHU_URL") {
            self.publisher.url = Some(value);
        }
        if let Some(value) = get("FEISHU_TOKEN") {
            self.publisher.token = Some(value);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.watched_repo()?;
        if self.dispatch.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "dispatch.max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.dispatch.queue_depth == 0 {
            return Err(ConfigError::Invalid(
                "dispatch.queue_depth must be at least 1".to_string(),
            ));
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "http.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.github.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "github.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The repository named by `github.repo_url`, if one is configured.
    pub fn watched_repo(&self) -> Result<Option<RepoRef>, ConfigError> {
        match non_empty(&self.github.repo_url) {
            Some(url) => pr::parse_repo_url(url)
                .map(Some)
                .map_err(|e| ConfigError::Invalid(e.to_string())),
            None => Ok(None),
        }
    }

    /// Webhook secret bytes; `None` means signature verification is disabled.
    pub fn webhook_secret(&self) -> Option<&[u8]> {
        non_empty(&self.webhook.secret).map(str::as_bytes)
    }

    pub fn github_token(&self) -> Option<&str> {
        non_empty(&self.github.token)
    }

    pub fn summarizer_api_key(&self) -> Option<&str> {
        non_empty(&self.summarizer.api_key)
    }

    pub fn publish_sink_url(&self) -> Option<&str> {
        non_empty(&self.publisher.url)
    }

    pub fn publish_sink_token(&self) -> Option<&str> {
        non_empty(&self.publisher.token)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
