mod check;
mod config;
mod dispatch;
mod pr;
mod publish;
mod server;
mod summary;
mod webhook;

use clap::{Parser, Subcommand};
use std::error::Error;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use dispatch::{Dispatcher, Pipeline, SHUTDOWN_GRACE};
use pr::GitHubClient;
use publish::{ConsolePublisher, FeishuPublisher, Publisher};
use server::{AppState, ComponentStatus};
use summary::openai::OpenAiGenerator;
use summary::Summarizer;
use webhook::SignatureVerifier;

/// PR Diary: receives GitHub pull request webhooks and posts a short
/// dev-diary summary of each new or updated pull request to a chat sink.
#[derive(Parser, Debug)]
#[command(name = "pr-diary", version, about)]
struct Cli {
    /// Config file (defaults to .pr-diary.toml in the current directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the webhook server
    Serve {
        /// Address to listen on, overriding server.bind
        #[arg(long)]
        bind: Option<SocketAddr>,
    },

    /// Summarize a unified diff file and print the result
    Digest {
        /// Path to the diff (e.g. output of `git diff`)
        diff_file: PathBuf,

        /// Also post the summary to the configured sink
        #[arg(long)]
        publish: bool,
    },

    /// Verify the configured GitHub token, summarizer and publisher
    Check {
        /// Post a test message to the publisher sink
        #[arg(long)]
        ping_sink: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pr_diary=info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = Arc::new(Config::load(cli.config.as_deref())?);

    match cli.command {
        Command::Serve { bind } => serve(config, bind).await,
        Command::Digest { diff_file, publish } => digest(&config, &diff_file, publish).await,
        Command::Check { ping_sink } => run_checks(&config, ping_sink).await,
    }
}

async fn serve(config: Arc<Config>, bind: Option<SocketAddr>) -> Result<(), Box<dyn Error>> {
    let http = build_http_client(&config)?;

    let verifier = SignatureVerifier::new(config.webhook_secret());
    if !verifier.is_enabled() {
        warn!("no webhook secret configured: signature verification is DISABLED and any sender can trigger processing");
    }
    if config.github_token().is_none() {
        warn!("no GitHub token configured: changed-file lists will be empty");
    }

    let pipeline = Arc::new(Pipeline::new(
        Arc::new(GitHubClient::from_config(http.clone(), &config)),
        Arc::new(build_summarizer(&http, &config)),
        build_publisher(&http, &config),
    ));
    let dispatcher = Arc::new(Dispatcher::start(
        pipeline,
        config.dispatch.max_concurrent,
        config.dispatch.queue_depth,
    ));

    let watched_repo = config.watched_repo()?;
    if let Some(repo) = &watched_repo {
        info!(repo = %repo, "watching repository");
    }
    let state = AppState::new(
        verifier,
        dispatcher.clone(),
        ComponentStatus::from_config(&config),
        watched_repo,
    );

    let listener = TcpListener::bind(bind.unwrap_or(config.server.bind)).await?;
    info!(addr = %listener.local_addr()?, "listening for webhooks");

    server::serve(listener, server::build_router(state), shutdown_signal()).await?;

    info!("server stopped, draining dispatch tasks");
    dispatcher.shutdown(SHUTDOWN_GRACE).await;
    info!("done");
    Ok(())
}

#[instrument(skip(config, diff_file), fields(file = %diff_file.display()))]
async fn digest(config: &Config, diff_file: &Path, publish: bool) -> Result<(), Box<dyn Error>> {
    let diff_text = std::fs::read_to_string(diff_file)?;
    debug!(bytes = diff_text.len(), "read diff");

    let http = build_http_client(config)?;
    let summary = build_summarizer(&http, config)
        .summarize_diff(&diff_text)
        .await;
    info!(origin = %summary.origin, "diff summarized");

    ConsolePublisher.publish(&summary, None).await?;

    if publish {
        match config.publish_sink_url() {
            Some(url) => {
                let sink = FeishuPublisher::new(
                    http,
                    url,
                    config.publish_sink_token().map(str::to_string),
                );
                sink.publish(&summary, None).await?;
                info!(publisher = sink.name(), "summary published");
            }
            None => warn!("--publish given but no publisher url is configured"),
        }
    }
    Ok(())
}

async fn run_checks(config: &Config, ping_sink: bool) -> Result<(), Box<dyn Error>> {
    let http = build_http_client(config)?;
    let reports = check::run(config, &http, ping_sink).await?;
    check::print_report(&reports);

    let failed = reports.iter().filter(|r| r.failed()).count();
    if failed > 0 {
        return Err(format!("{failed} of {} checks failed", reports.len()).into());
    }
    info!("all configured components reachable");
    Ok(())
}

/// One client for every outbound call, with the configured timeout.
fn build_http_client(config: &Config) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(config.http.timeout())
        .user_agent(concat!("pr-diary/", env!("CARGO_PKG_VERSION")))
        .build()
}

fn build_summarizer(http: &reqwest::Client, config: &Config) -> Summarizer {
    match config.summarizer_api_key() {
        Some(key) => {
            info!(model = %config.summarizer.model, "AI summaries enabled");
            Summarizer::new(Arc::new(OpenAiGenerator::new(
                http.clone(),
                key,
                &config.summarizer,
            )))
        }
        None => {
            warn!("no summarizer API key configured: using fallback summaries only");
            Summarizer::fallback_only()
        }
    }
}

fn build_publisher(http: &reqwest::Client, config: &Config) -> Arc<dyn Publisher> {
    match config.publish_sink_url() {
        Some(url) => Arc::new(FeishuPublisher::new(
            http.clone(),
            url,
            config.publish_sink_token().map(str::to_string),
        )),
        None => {
            info!("no publisher url configured: summaries go to stdout");
            Arc::new(ConsolePublisher)
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "could not listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
