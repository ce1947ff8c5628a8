use chrono::Utc;
use clap::Parser;
use database::DedupStore;
use llm_interface::GeminiScorer;
use reddit_client::RedditApiClient;
use scout_core::{CoreError, ErrorExt, ScoutConfig};
use scout_service::{DiscordNotifier, ScoutService};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "reddit_scout=info,scout_service=info,reddit_client=info,database=info";

/// Scout forum communities for posts and comments worth replying to.
#[derive(Debug, Parser)]
#[command(name = "reddit-scout", version)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Run every stage but log the digest instead of sending it, and leave
    /// the dedup store untouched.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), CoreError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let args = Args::parse();
    tracing::info!("Starting Reddit Scout");

    let result = run(&args).await;
    match &result {
        Ok(()) => tracing::info!("Reddit Scout completed"),
        Err(e) => {
            e.log_error();
        }
    }
    result
}

async fn run(args: &Args) -> Result<(), CoreError> {
    let config = ScoutConfig::load(&args.config)?;
    tracing::info!("Monitoring: {}", config.reddit.subreddits.join(", "));
    tracing::info!("TTL: {} days", config.database.ttl_days);

    let client = Arc::new(RedditApiClient::from_config(&config.reddit)?);
    let store = DedupStore::open(&config.database.path).await?;
    let scorer = Arc::new(GeminiScorer::from_config(&config.gemini)?);
    let notifier = Arc::new(DiscordNotifier::from_config(&config.discord)?);

    let service = ScoutService::new(&config, client.clone(), store, scorer, notifier)?
        .with_dry_run(args.dry_run);

    let summary = service.run_once(Utc::now()).await?;

    let metrics = client.get_metrics().await;
    tracing::info!(
        "Fetch metrics: {} requests, {} ok, {} failed ({} timed out), avg {:?}",
        metrics.total_requests,
        metrics.successful_requests,
        metrics.failed_requests,
        metrics.timed_out_requests,
        metrics.average_response_time()
    );
    tracing::info!("Top posts selected: {}", summary.posts_selected);
    tracing::info!("Top comments selected: {}", summary.comments_selected);

    service.store().close().await;
    Ok(())
}
