pub mod diff;
pub mod types;

pub use types::{PrActivity, PullRequestMetadata, RepoRef};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::Config;

/// GitHub caps the files endpoint at 3000 entries, i.e. 30 pages of 100.
const PER_PAGE: u32 = 100;
const MAX_PAGES: u32 = 30;
const USER_AGENT: &str = "pr-diary";

#[derive(Debug, Error)]
pub enum PrError {
    #[error("GitHub API request failed: {0}")]
    ApiRequest(#[from] reqwest::Error),

    #[error("GitHub API returned HTTP {0}")]
    Status(u16),

    #[error("Invalid repository URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to parse diff: {0}")]
    DiffParse(String),

    #[error("GitHub token not configured")]
    MissingToken,
}

/// Parse a GitHub repository URL into owner and name.
///
/// Expected format: https://github.com/{owner}/{repo}, optionally with a
/// trailing `.git` or slash.
pub fn parse_repo_url(url: &str) -> Result<RepoRef, PrError> {
    let parsed = reqwest::Url::parse(url).map_err(|_| PrError::InvalidUrl(url.to_string()))?;

    if !matches!(parsed.host_str(), Some("github.com") | Some("www.github.com")) {
        return Err(PrError::InvalidUrl(url.to_string()));
    }

    let segments: Vec<_> = parsed
        .path_segments()
        .ok_or_else(|| PrError::InvalidUrl(url.to_string()))?
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.len() != 2 {
        return Err(PrError::InvalidUrl(url.to_string()));
    }

    let name = segments[1].strip_suffix(".git").unwrap_or(segments[1]);
    if name.is_empty() {
        return Err(PrError::InvalidUrl(url.to_string()));
    }
    Ok(RepoRef::new(segments[0], name))
}

/// Source of the changed-file list for a pull request.
#[async_trait]
pub trait ChangedFiles: Send + Sync {
    async fn fetch_changed_files(&self, repo: &RepoRef, number: u64)
        -> Result<Vec<String>, PrError>;
}

/// Read-only GitHub REST client used for enrichment.
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
    max_attempts: u32,
    backoff: Duration,
}

#[derive(serde::Deserialize)]
struct PullFile {
    filename: String,
}

#[derive(serde::Deserialize)]
struct Repository {
    full_name: String,
}

#[derive(serde::Deserialize)]
struct User {
    login: String,
}

impl GitHubClient {
    pub fn new(http: reqwest::Client, api_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
            max_attempts: 1,
            backoff: Duration::from_millis(500),
        }
    }

    pub fn from_config(http: reqwest::Client, config: &Config) -> Self {
        Self::new(
            http,
            config.github.api_url.clone(),
            config.github_token().map(str::to_string),
        )
        .with_retry(config.github.max_attempts, Duration::from_millis(500))
    }

    /// Retry transport errors, 429 and 5xx responses up to `max_attempts`
    /// total, doubling `backoff` after each failure.
    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Confirm the token is accepted. With a repository, `GET /repos/{o}/{r}`
    /// must succeed and its full name is returned; without one, `GET /user`
    /// is used and the login is returned.
    #[instrument(skip(self))]
    pub async fn check_connection(&self, repo: Option<&RepoRef>) -> Result<String, PrError> {
        let token = self.token.as_deref().ok_or(PrError::MissingToken)?;
        let url = match repo {
            Some(repo) => format!("{}/repos/{}/{}", self.api_url, repo.owner, repo.name),
            None => format!("{}/user", self.api_url),
        };

        let response = self
            .http
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .bearer_auth(token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PrError::Status(status.as_u16()));
        }

        let identity = match repo {
            Some(_) => response.json::<Repository>().await?.full_name,
            None => response.json::<User>().await?.login,
        };
        debug!(%identity, "GitHub connection ok");
        Ok(identity)
    }

    async fn fetch_page(&self, url: &str, token: &str, page: u32) -> Result<Vec<PullFile>, PrError> {
        let mut attempt = 1;
        loop {
            let result = self
                .http
                .get(url)
                .query(&[("per_page", PER_PAGE), ("page", page)])
                .header("User-Agent", USER_AGENT)
                .header("Accept", "application/vnd.github+json")
                .bearer_auth(token)
                .send()
                .await;

            let error = match result {
                Ok(response) if response.status().is_success() => {
                    return Ok(response.json::<Vec<PullFile>>().await?);
                }
                Ok(response) => {
                    let status = response.status();
                    if !(status.is_server_error() || status.as_u16() == 429) {
                        return Err(PrError::Status(status.as_u16()));
                    }
                    PrError::Status(status.as_u16())
                }
                Err(e) => PrError::ApiRequest(e),
            };

            if attempt >= self.max_attempts {
                return Err(error);
            }
            let delay = self.backoff * 2u32.saturating_pow(attempt - 1);
            warn!(attempt, page, error = %error, delay_ms = delay.as_millis() as u64, "retrying file list request");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl ChangedFiles for GitHubClient {
    /// GET /repos/{owner}/{repo}/pulls/{number}/files, following pages until a
    /// short page is returned.
    #[instrument(skip(self), fields(owner = %repo.owner, repo = %repo.name, pr = number))]
    async fn fetch_changed_files(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<Vec<String>, PrError> {
        let token = self.token.as_deref().ok_or(PrError::MissingToken)?;
        let url = format!(
            "{}/repos/{}/{}/pulls/{}/files",
            self.api_url, repo.owner, repo.name, number
        );

        let mut paths = Vec::new();
        for page in 1..=MAX_PAGES {
            let batch = self.fetch_page(&url, token, page).await?;
            let count = batch.len();
            paths.extend(batch.into_iter().map(|f| f.filename));
            if count < PER_PAGE as usize {
                break;
            }
        }
        debug!(files = paths.len(), "fetched changed files");
        Ok(paths)
    }
}

/// Helper to create PR metadata as a `pull_request` webhook would carry it.
#[cfg(test)]
pub(crate) fn test_metadata(number: u64, author: &str, title: &str) -> PullRequestMetadata {
    use chrono::TimeZone;

    PullRequestMetadata {
        number,
        title: title.to_string(),
        description: String::new(),
        author: author.to_string(),
        author_name: None,
        url: format!("https://github.com/octo/widgets/pull/{number}"),
        state: "open".to_string(),
        created_at: chrono::Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
        updated_at: None,
        base_branch: "main".to_string(),
        head_branch: "fix-bug".to_string(),
        additions: 12,
        deletions: 3,
        changed_files: 2,
        changed_file_paths: Vec::new(),
    }
}
