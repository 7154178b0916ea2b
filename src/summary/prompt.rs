//! Prompt and fallback templates.

use super::types::{FileDigest, SummaryInput};
use crate::pr::diff::DiffStats;

/// Diff text sent to the model is cut at this many characters.
pub const MAX_DIFF_CHARS: usize = 12_000;

pub const PR_SYSTEM_PROMPT: &str = "You keep a short development diary. Turn GitHub pull \
request details into one natural paragraph that starts with \"Today <author>\" followed by \
what the author did, as given in the Activity line (opened the pull request, pushed new \
commits to it, or marked it ready for review).";

pub const DIFF_SYSTEM_PROMPT: &str = "You are a programmer who likes to share your work. \
Explain the following code change in a few plain sentences.";

pub fn pull_request_prompt(input: &SummaryInput<'_>) -> String {
    let meta = input.metadata;
    let author = match &meta.author_name {
        Some(name) => format!("{} ({})", meta.author, name),
        None => meta.author.clone(),
    };
    let description = if meta.description.trim().is_empty() {
        "(none)"
    } else {
        meta.description.trim()
    };

    let mut prompt = format!(
        "Write a short dev-diary entry for this pull request.\n\n\
         Title: {title}\n\
         Description: {description}\n\
         Author: {author}\n\
         Number: #{number}\n\
         Activity: {activity}\n\
         State: {state}\n\
         Created: {created}\n\
         Branches: {head} -> {base}\n\
         Stats: +{additions} -{deletions}, {files} files changed\n\
         Link: {url}\n",
        title = meta.title,
        number = meta.number,
        activity = input.activity.describe(meta.number),
        state = meta.state,
        created = meta.created_at.format("%Y-%m-%d %H:%M UTC"),
        head = meta.head_branch,
        base = meta.base_branch,
        additions = meta.additions,
        deletions = meta.deletions,
        files = meta.changed_files,
        url = meta.url,
    );

    if let Some(updated) = meta.updated_at {
        prompt.push_str(&format!("Updated: {}\n", updated.format("%Y-%m-%d %H:%M UTC")));
    }

    if !input.files.is_empty() {
        prompt.push_str("\nChanged files:\n");
        prompt.push_str(&input.files.render("-"));
        prompt.push('\n');
    }

    prompt.push_str(
        "\nRequirements: mention the author and the PR number, focus on the main work, \
         mention notable files if any, keep it between 50 and 120 words.",
    );
    prompt
}

/// Deterministic summary built only from structured fields.
pub fn fallback_summary(input: &SummaryInput<'_>) -> String {
    let meta = input.metadata;
    let mut summary = format!(
        "Today {} {}: {}.",
        meta.author,
        input.activity.describe(meta.number),
        meta.title
    );
    if meta.changed_files > 0 {
        summary.push_str(&format!(" {} files changed", meta.changed_files));
        if meta.additions > 0 || meta.deletions > 0 {
            summary.push_str(&format!(
                ", {} lines added and {} removed",
                meta.additions, meta.deletions
            ));
        }
        summary.push('.');
    } else if meta.additions > 0 || meta.deletions > 0 {
        summary.push_str(&format!(
            " {} lines added and {} removed.",
            meta.additions, meta.deletions
        ));
    }
    summary.push_str(&format!(" Link: {}", meta.url));
    summary
}

/// Cut `diff` to [`MAX_DIFF_CHARS`] on a character boundary.
pub fn bounded_diff(diff: &str) -> &str {
    match diff.char_indices().nth(MAX_DIFF_CHARS) {
        Some((index, _)) => &diff[..index],
        None => diff,
    }
}

pub fn fallback_diff_summary(stats: &DiffStats, files: &FileDigest) -> String {
    if stats.files.is_empty() {
        return "The change contains no file diffs.".to_string();
    }
    let mut summary = format!(
        "This change touches {} files with {} lines added and {} removed.",
        stats.files.len(),
        stats.additions,
        stats.deletions
    );
    let created = stats.files.iter().filter(|f| f.is_new).count();
    let deleted = stats.files.iter().filter(|f| f.is_deleted).count();
    if created > 0 || deleted > 0 {
        summary.push_str(&format!(" {created} new and {deleted} deleted."));
    }
    summary.push('\n');
    summary.push_str(&files.render("-"));
    summary
}
