//! Connectivity checks behind the `check` subcommand.
//!
//! Each configured outbound integration gets one request. Components that are
//! not configured are reported as skipped.

use colored::Colorize;
use tracing::{debug, instrument};

use crate::config::{Config, ConfigError};
use crate::pr::{GitHubClient, PrError, RepoRef};
use crate::publish::FeishuPublisher;
use crate::summary::openai::OpenAiGenerator;
use crate::summary::{Generator, Prompt};

/// Text posted to the sink by `check --ping-sink`.
pub const SINK_CHECK_MESSAGE: &str = "pr-diary connectivity check: this sink is reachable.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Passed(String),
    Failed(String),
    Skipped(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub name: &'static str,
    pub status: CheckStatus,
}

impl CheckReport {
    fn new(name: &'static str, status: CheckStatus) -> Self {
        Self { name, status }
    }

    pub fn failed(&self) -> bool {
        matches!(self.status, CheckStatus::Failed(_))
    }
}

#[instrument(skip(client))]
pub async fn check_github(client: &GitHubClient, repo: Option<&RepoRef>) -> CheckReport {
    let status = match client.check_connection(repo).await {
        Ok(identity) => CheckStatus::Passed(format!("authenticated, can read {identity}")),
        Err(PrError::MissingToken) => CheckStatus::Skipped("no GitHub token configured"),
        Err(PrError::Status(404)) if repo.is_some() => {
            CheckStatus::Failed("repository not found or not visible to the token".to_string())
        }
        Err(e) => CheckStatus::Failed(e.to_string()),
    };
    CheckReport::new("github", status)
}

#[instrument(skip_all)]
pub async fn check_generator(generator: Option<&dyn Generator>) -> CheckReport {
    let Some(generator) = generator else {
        return CheckReport::new(
            "summarizer",
            CheckStatus::Skipped("no summarizer API key configured"),
        );
    };
    let prompt = Prompt {
        system: "You answer connectivity checks.".to_string(),
        user: "Reply with the single word OK.".to_string(),
    };
    let status = match generator.generate(&prompt).await {
        Ok(text) => {
            debug!(reply = %text, "generator answered");
            CheckStatus::Passed(format!("{} answered", generator.name()))
        }
        Err(e) => CheckStatus::Failed(e.to_string()),
    };
    CheckReport::new("summarizer", status)
}

/// Posts a test message to the sink, only when `ping` is set.
#[instrument(skip(sink))]
pub async fn check_sink(sink: Option<&FeishuPublisher>, ping: bool) -> CheckReport {
    let status = match (sink, ping) {
        (None, _) => CheckStatus::Skipped("no publisher url configured, summaries go to stdout"),
        (Some(_), false) => CheckStatus::Skipped("pass --ping-sink to post a test message"),
        (Some(sink), true) => match sink.send_text(SINK_CHECK_MESSAGE).await {
            Ok(()) => CheckStatus::Passed("test message accepted".to_string()),
            Err(e) => CheckStatus::Failed(e.to_string()),
        },
    };
    CheckReport::new("publisher", status)
}

/// Run every check against the components `config` describes.
pub async fn run(
    config: &Config,
    http: &reqwest::Client,
    ping_sink: bool,
) -> Result<Vec<CheckReport>, ConfigError> {
    let repo = config.watched_repo()?;

    let github = GitHubClient::from_config(http.clone(), config);
    let generator = config
        .summarizer_api_key()
        .map(|key| OpenAiGenerator::new(http.clone(), key, &config.summarizer));
    let sink = config.publish_sink_url().map(|url| {
        FeishuPublisher::new(
            http.clone(),
            url,
            config.publish_sink_token().map(str::to_string),
        )
    });

    Ok(vec![
        check_github(&github, repo.as_ref()).await,
        check_generator(generator.as_ref().map(|g| g as &dyn Generator)).await,
        check_sink(sink.as_ref(), ping_sink).await,
    ])
}

pub fn print_report(reports: &[CheckReport]) {
    println!("\n{}", "Connectivity checks".bold());
    for report in reports {
        let (label, detail) = match &report.status {
            CheckStatus::Passed(detail) => ("PASS".green().bold(), detail.as_str()),
            CheckStatus::Failed(detail) => ("FAIL".red().bold(), detail.as_str()),
            CheckStatus::Skipped(detail) => ("SKIP".yellow(), *detail),
        };
        println!("  [{}] {:<11} {}", label, report.name, detail);
    }
    println!();
}
