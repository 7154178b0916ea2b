use async_trait::async_trait;
use colored::Colorize;

use super::{message_details, message_title, PublishError, Publisher};
use crate::pr::PullRequestMetadata;
use crate::summary::{SummaryOrigin, SummaryResult};

/// Prints summaries to stdout. Used when no messaging sink is configured.
pub struct ConsolePublisher;

#[async_trait]
impl Publisher for ConsolePublisher {
    fn name(&self) -> &str {
        "console"
    }

    async fn publish(
        &self,
        summary: &SummaryResult,
        metadata: Option<&PullRequestMetadata>,
    ) -> Result<(), PublishError> {
        print_summary(summary, metadata);
        Ok(())
    }
}

/// Format and print a summary with colors:
///
/// ═══ Dev diary - PR #42 ═══ (ai)
/// Today alice opened a pull request that ...
///
/// PR: Fix bug (https://github.com/...)
/// Branches: fix-bug -> main
/// ...
fn print_summary(summary: &SummaryResult, metadata: Option<&PullRequestMetadata>) {
    println!();
    println!(
        "═══ {} ═══ ({})",
        message_title(metadata).bold(),
        colorize_origin(summary.origin)
    );
    println!("{}", summary.text);
    if let Some(meta) = metadata {
        println!();
        println!("{}", message_details(meta).dimmed());
    }
    println!();
}

fn colorize_origin(origin: SummaryOrigin) -> colored::ColoredString {
    match origin {
        SummaryOrigin::Ai => "ai".green(),
        SummaryOrigin::Fallback => "fallback".yellow(),
    }
}
