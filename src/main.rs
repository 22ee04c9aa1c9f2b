use anyhow::Context;
use clap::Parser;
use commentwatch_core::{ErrorExt, SettingsLoader};
use instagram_client::{ApiClientConfig, InstagramApiClient, SessionManager, SessionStore};
use poll_service::{PollerConfig, SettingsPoller};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "commentwatch=info,instagram_client=info,poll_service=info,comment_store=info";

/// Polls Instagram posts and keeps a JSON snapshot of their comments.
#[derive(Debug, Parser)]
#[command(name = "commentwatch", version, about)]
struct Args {
    /// Settings file, re-read every cycle (.json, or .toml)
    #[arg(long, default_value = "settings.json")]
    settings: PathBuf,

    /// Where the login session is cached between runs
    #[arg(long, default_value = "cookies.json")]
    session_file: PathBuf,

    /// Directory for comments_<id>.json files unless the settings set one
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    #[arg(long, default_value = "bot.log")]
    log_file: PathBuf,
}

fn init_logging(log_file: &Path) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("cannot open log file {}", log_file.display()))?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_file)?;

    tracing::info!(settings = %args.settings.display(), "Starting commentwatch");

    let client = InstagramApiClient::new(ApiClientConfig::default())
        .context("failed to build the HTTP client")?;
    let session = SessionManager::new(client, SessionStore::new(&args.session_file));
    let config = PollerConfig {
        output_dir: args.output_dir,
        ..PollerConfig::default()
    };
    let mut poller = SettingsPoller::new(session, SettingsLoader::new(&args.settings), config);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, stopping");
                signal_token.cancel();
            }
            Err(e) => tracing::error!("Cannot listen for Ctrl-C: {}", e),
        }
    });

    if let Err(e) = poller.run(shutdown).await {
        tracing::error!(code = %e.error_code(), "Startup failed: {}", e.user_friendly_message());
        return Err(e.into());
    }

    tracing::info!("Stopped");
    Ok(())
}
