use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use monitor::MonitorService;
use publisher::{publish_digest, EpisodePublisher};
use reddit_client::RedditClient;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use turtlebot_core::BotConfig;

const DEFAULT_FILTER: &str = "turtlebot=info,monitor=info,publisher=info,reddit_client=info";
const VERBOSE_FILTER: &str = "turtlebot=debug,monitor=debug,publisher=debug,reddit_client=debug";

#[derive(Parser)]
#[command(name = "turtlebot", version, about = "Keyword reply bot for r/MyNameIsEarlFans")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "turtlebot.toml", env = "TURTLEBOT_CONFIG")]
    config: PathBuf,

    /// Debug logging unless RUST_LOG is set
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch posts and comments until Ctrl-C
    Run,
    /// Repost the hot titles of one subreddit into another
    Digest {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let mut config = BotConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.apply_env_overrides();
    config.validate().context("invalid configuration")?;

    let credentials = config.reddit.resolve()?;
    let client = Arc::new(RedditClient::new(credentials.into())?);
    client
        .authenticate()
        .await
        .context("Reddit authentication failed")?;
    tracing::info!("Authenticated as u/{}", client.username());

    match cli.command {
        Command::Run => run(client, config).await,
        Command::Digest { from, to, limit } => {
            let submission = publish_digest(client.as_ref(), &from, &to, limit).await?;
            let fullname = submission.fullname();
            println!("Posted {}", submission.url.unwrap_or(fullname));
            Ok(())
        }
    }
}

async fn run(client: Arc<RedditClient>, config: BotConfig) -> Result<()> {
    let username = client.username().to_string();
    let mut service = MonitorService::new(client.clone(), config.monitor, username).await;
    service.start()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let episodes = if config.episodes.enabled {
        let publisher = EpisodePublisher::new(client.clone(), config.episodes);
        Some(tokio::spawn(publisher.run(shutdown_rx)))
    } else {
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    tracing::info!("Shutting down");

    shutdown_tx.send_replace(true);
    if let Some(handle) = episodes {
        if let Err(e) = handle.await {
            tracing::warn!("Episode publisher ended abnormally: {}", e);
        }
    }
    service.stop().await?;
    Ok(())
}
