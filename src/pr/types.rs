use chrono::{DateTime, Utc};
use serde::Serialize;

/// Metadata about a pull request, built from the webhook payload.
///
/// `changed_files` is the count GitHub reports; `changed_file_paths` is filled
/// later by enrichment and may stay empty even when the count is nonzero.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequestMetadata {
    /// PR number (e.g., 42)
    pub number: u64,
    pub title: String,
    /// PR body; GitHub sends null for an empty description
    pub description: String,
    /// Author's GitHub login
    pub author: String,
    /// Author's display name, when the payload carries one
    pub author_name: Option<String>,
    pub url: String,
    /// Lifecycle state ("open", "closed")
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub base_branch: String,
    pub head_branch: String,
    /// Total lines added
    pub additions: u64,
    /// Total lines deleted
    pub deletions: u64,
    /// Total files changed
    pub changed_files: u64,
    /// Changed file paths, in API order
    pub changed_file_paths: Vec<String>,
}

/// The pull request activity a webhook reports, for the actions that get a
/// summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrActivity {
    #[default]
    Opened,
    Synchronized,
    ReadyForReview,
}

impl PrActivity {
    /// Map a `pull_request` action to an activity. Other actions are `None`.
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "opened" => Some(PrActivity::Opened),
            "synchronize" => Some(PrActivity::Synchronized),
            "ready_for_review" => Some(PrActivity::ReadyForReview),
            _ => None,
        }
    }

    /// The GitHub action name.
    pub fn action(self) -> &'static str {
        match self {
            PrActivity::Opened => "opened",
            PrActivity::Synchronized => "synchronize",
            PrActivity::ReadyForReview => "ready_for_review",
        }
    }

    /// Verb phrase for a diary sentence, e.g. "pushed new commits to PR #7".
    pub fn describe(self, number: u64) -> String {
        match self {
            PrActivity::Opened => format!("opened PR #{number}"),
            PrActivity::Synchronized => format!("pushed new commits to PR #{number}"),
            PrActivity::ReadyForReview => format!("marked PR #{number} ready for review"),
        }
    }
}

impl std::fmt::Display for PrActivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.action())
    }
}

/// Owner/name pair identifying a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Per-file counts extracted from a unified diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffFile {
    /// File path (e.g., "src/auth/config.rs")
    pub path: String,
    pub is_new: bool,
    pub is_deleted: bool,
    pub additions: usize,
    pub deletions: usize,
}
