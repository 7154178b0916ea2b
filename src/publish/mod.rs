pub mod console;
pub mod feishu;

pub use console::ConsolePublisher;
pub use feishu::FeishuPublisher;

use async_trait::async_trait;
use thiserror::Error;

use crate::pr::PullRequestMetadata;
use crate::summary::{FileDigest, SummaryResult, MAX_LISTED_FILES};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Publish request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Sink returned HTTP {0}")]
    Status(u16),

    #[error("Sink rejected message (code {code}): {message}")]
    Rejected { code: i64, message: String },
}

/// Delivers a finished summary to a messaging sink.
///
/// `metadata` is `None` for summaries that are not tied to a pull request,
/// such as a digest of raw diff text.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(
        &self,
        summary: &SummaryResult,
        metadata: Option<&PullRequestMetadata>,
    ) -> Result<(), PublishError>;
}

/// Heading line for a published summary.
pub fn message_title(metadata: Option<&PullRequestMetadata>) -> String {
    match metadata {
        Some(meta) => format!("Dev diary - PR #{}", meta.number),
        None => "Dev diary".to_string(),
    }
}

/// Detail block appended under the summary text: link, branches, stats and
/// the bounded file list.
pub fn message_details(metadata: &PullRequestMetadata) -> String {
    let mut details = format!(
        "PR: {} ({})\nBranches: {} -> {}\nChanges: +{} -{} in {} files",
        metadata.title,
        metadata.url,
        metadata.head_branch,
        metadata.base_branch,
        metadata.additions,
        metadata.deletions,
        metadata.changed_files,
    );
    let files = FileDigest::new(&metadata.changed_file_paths, MAX_LISTED_FILES);
    if !files.is_empty() {
        details.push('\n');
        details.push_str(&files.render("•"));
    }
    details
}

/// Full plain-text message: title, summary, and details when available.
pub fn message_text(summary: &SummaryResult, metadata: Option<&PullRequestMetadata>) -> String {
    let mut text = format!("{}\n\n{}", message_title(metadata), summary.text);
    if let Some(meta) = metadata {
        text.push_str("\n\n");
        text.push_str(&message_details(meta));
    }
    text
}
