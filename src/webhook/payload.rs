//! Typed parsing of webhook delivery bodies.
//!
//! `pull_request` deliveries are parsed strictly: a payload missing a required
//! field is rejected here instead of travelling downstream with empty values.
//! Every other event only has to be a JSON object; its `action`, if any, is
//! all the filter needs.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use super::filter::PULL_REQUEST_EVENT;
use crate::pr::{PullRequestMetadata, RepoRef};

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid payload: {0}")]
    Invalid(&'static str),
}

/// A parsed `pull_request` delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequestEvent {
    pub action: String,
    pub repository: RepoRef,
    pub metadata: PullRequestMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookPayload {
    PullRequest(PullRequestEvent),
    Other { action: Option<String> },
}

impl WebhookPayload {
    pub fn parse(event_type: &str, body: &[u8]) -> Result<Self, PayloadError> {
        if event_type == PULL_REQUEST_EVENT {
            let raw: RawPullRequestEvent = serde_json::from_slice(body)?;
            return raw.into_event().map(WebhookPayload::PullRequest);
        }

        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(body)?;
        let action = object
            .get("action")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        Ok(WebhookPayload::Other { action })
    }

    pub fn action(&self) -> Option<&str> {
        match self {
            WebhookPayload::PullRequest(event) => Some(&event.action),
            WebhookPayload::Other { action } => action.as_deref(),
        }
    }
}

#[derive(Deserialize)]
struct RawPullRequestEvent {
    action: String,
    pull_request: RawPullRequest,
    repository: RawRepository,
}

#[derive(Deserialize)]
struct RawPullRequest {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    user: RawUser,
    html_url: String,
    state: String,
    created_at: DateTime<Utc>,
    /// Must be present; `null` is accepted.
    #[serde(deserialize_with = "Option::deserialize")]
    updated_at: Option<DateTime<Utc>>,
    base: RawBranch,
    head: RawBranch,
    additions: u64,
    deletions: u64,
    changed_files: u64,
}

#[derive(Deserialize)]
struct RawUser {
    login: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawBranch {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Deserialize)]
struct RawRepository {
    name: String,
    owner: RawOwner,
}

#[derive(Deserialize)]
struct RawOwner {
    login: String,
}

impl RawPullRequestEvent {
    fn into_event(self) -> Result<PullRequestEvent, PayloadError> {
        let pr = self.pull_request;
        if pr.number == 0 {
            return Err(PayloadError::Invalid("pull_request.number must be positive"));
        }
        if pr.user.login.is_empty() {
            return Err(PayloadError::Invalid("pull_request.user.login is empty"));
        }
        if self.repository.owner.login.is_empty() || self.repository.name.is_empty() {
            return Err(PayloadError::Invalid("repository owner or name is empty"));
        }

        Ok(PullRequestEvent {
            action: self.action,
            repository: RepoRef::new(self.repository.owner.login, self.repository.name),
            metadata: PullRequestMetadata {
                number: pr.number,
                title: pr.title,
                description: pr.body.unwrap_or_default(),
                author: pr.user.login,
                author_name: pr.user.name.filter(|n| !n.is_empty()),
                url: pr.html_url,
                state: pr.state,
                created_at: pr.created_at,
                updated_at: pr.updated_at,
                base_branch: pr.base.name,
                head_branch: pr.head.name,
                additions: pr.additions,
                deletions: pr.deletions,
                changed_files: pr.changed_files,
                changed_file_paths: Vec::new(),
            },
        })
    }
}
