pub mod openai;
pub mod prompt;
pub mod types;

pub use types::{FileDigest, SummaryInput, SummaryOrigin, SummaryResult, MAX_LISTED_FILES};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::pr::diff;

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("Summarizer request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Summarizer API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Summarizer returned an empty completion")]
    EmptyCompletion,
}

/// System and user messages for one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Text generation backend behind the summarizer.
///
/// Implementations may fail freely; [`Summarizer`] turns every failure into
/// the fallback template.
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &Prompt) -> Result<String, SummaryError>;
}

/// Turns one pull request into a summary. The pipeline depends on this seam
/// rather than on [`Summarizer`] directly.
#[async_trait]
pub trait Summarize: Send + Sync {
    async fn summarize(&self, input: &SummaryInput<'_>) -> SummaryResult;
}

/// Produces a summary for every input. Generation failures never escape:
/// they are logged and replaced with a deterministic fallback.
#[derive(Clone, Default)]
pub struct Summarizer {
    generator: Option<Arc<dyn Generator>>,
}

impl Summarizer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator: Some(generator),
        }
    }

    /// Summarizer that always uses the fallback template.
    pub fn fallback_only() -> Self {
        Self { generator: None }
    }

    pub async fn summarize(&self, input: &SummaryInput<'_>) -> SummaryResult {
        let prompt = Prompt {
            system: prompt::PR_SYSTEM_PROMPT.to_string(),
            user: prompt::pull_request_prompt(input),
        };
        match self.generate(&prompt).await {
            Some(text) => SummaryResult::ai(text),
            None => SummaryResult::fallback(prompt::fallback_summary(input)),
        }
    }

    /// Summarize raw unified diff text. The fallback lists the files parsed
    /// from the diff, or says it could not be parsed.
    pub async fn summarize_diff(&self, diff_text: &str) -> SummaryResult {
        let prompt = Prompt {
            system: prompt::DIFF_SYSTEM_PROMPT.to_string(),
            user: prompt::bounded_diff(diff_text).to_string(),
        };
        if let Some(text) = self.generate(&prompt).await {
            return SummaryResult::ai(text);
        }

        let text = match diff::parse_diff(diff_text) {
            Ok(stats) => {
                let files = FileDigest::new(&stats.paths(), MAX_LISTED_FILES);
                prompt::fallback_diff_summary(&stats, &files)
            }
            Err(e) => {
                warn!(error = %e, "diff could not be parsed for fallback summary");
                format!("A code change of {} bytes was submitted.", diff_text.len())
            }
        };
        SummaryResult::fallback(text)
    }

    async fn generate(&self, prompt: &Prompt) -> Option<String> {
        let generator = self.generator.as_ref()?;
        match generator.generate(prompt).await {
            Ok(text) if !text.trim().is_empty() => {
                info!(generator = generator.name(), chars = text.len(), "summary generated");
                Some(text)
            }
            Ok(_) => {
                warn!(generator = generator.name(), "generator returned empty text, using fallback");
                None
            }
            Err(e) => {
                warn!(generator = generator.name(), error = %e, "summary generation failed, using fallback");
                None
            }
        }
    }
}

#[async_trait]
impl Summarize for Summarizer {
    async fn summarize(&self, input: &SummaryInput<'_>) -> SummaryResult {
        Summarizer::summarize(self, input).await
    }
}
