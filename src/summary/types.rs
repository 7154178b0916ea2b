use serde::Serialize;

use crate::pr::{PrActivity, PullRequestMetadata};

/// Changed-file paths listed in prompts and messages before the rest is
/// reduced to a count.
pub const MAX_LISTED_FILES: usize = 10;

/// Where a summary's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryOrigin {
    Ai,
    Fallback,
}

impl std::fmt::Display for SummaryOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SummaryOrigin::Ai => write!(f, "ai"),
            SummaryOrigin::Fallback => write!(f, "fallback"),
        }
    }
}

/// A generated summary tagged with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryResult {
    pub text: String,
    pub origin: SummaryOrigin,
}

impl SummaryResult {
    pub fn ai(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: SummaryOrigin::Ai,
        }
    }

    pub fn fallback(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: SummaryOrigin::Fallback,
        }
    }
}

/// Bounded prefix of a changed-file list plus the number of paths left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub listed: Vec<String>,
    pub remaining: usize,
}

impl FileDigest {
    pub fn new(paths: &[String], limit: usize) -> Self {
        let shown = paths.len().min(limit);
        Self {
            listed: paths[..shown].to_vec(),
            remaining: paths.len() - shown,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listed.is_empty()
    }

    /// One bullet per listed path, followed by a "... and N more files" line
    /// when the list was cut.
    pub fn render(&self, bullet: &str) -> String {
        let mut text = self
            .listed
            .iter()
            .map(|path| format!("{bullet} {path}"))
            .collect::<Vec<_>>()
            .join("\n");
        if self.remaining > 0 {
            text.push_str(&format!("\n... and {} more files", self.remaining));
        }
        text
    }
}

/// What the summarizer sees for one pull request: its metadata, what the
/// author just did, and the already-truncated file list.
#[derive(Debug, Clone)]
pub struct SummaryInput<'a> {
    pub metadata: &'a PullRequestMetadata,
    pub activity: PrActivity,
    pub files: FileDigest,
}

impl<'a> SummaryInput<'a> {
    pub fn new(metadata: &'a PullRequestMetadata) -> Self {
        Self {
            metadata,
            activity: PrActivity::default(),
            files: FileDigest::new(&metadata.changed_file_paths, MAX_LISTED_FILES),
        }
    }

    pub fn with_activity(mut self, activity: PrActivity) -> Self {
        self.activity = activity;
        self
    }
}
