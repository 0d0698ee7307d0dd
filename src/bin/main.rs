use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use portfolio_tracker::aggregate::Aggregator;
use portfolio_tracker::cache::ResultCache;
use portfolio_tracker::config::{self, TrackerConfig};
use portfolio_tracker::fetch::HttpFetcher;
use portfolio_tracker::portfolio::Portfolio;
use portfolio_tracker::server;
use portfolio_tracker::state::Tracker;

#[derive(Parser, Debug)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Debug)]
struct Settings {
    #[arg(long, env = "TRACKER_CACHE_TTL_SECS", default_value = "300")]
    cache_ttl_secs: u64,
    #[arg(long, env = "TRACKER_FETCH_TIMEOUT_SECS", default_value = "10")]
    fetch_timeout_secs: u64,
    #[arg(long, env = "TRACKER_CONCURRENCY", default_value = "1")]
    concurrency: usize,
    #[arg(long, env = "TRACKER_USER_AGENT")]
    user_agent: Option<String>,
    #[arg(long, env = "TRACKER_SEED_FILE")]
    seed_file: Option<PathBuf>,
    /// Start without any holdings.
    #[arg(long, conflicts_with = "seed_file")]
    empty: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the portfolio over http and websocket.
    Serve {
        #[arg(long, env = "TRACKER_ADDRESS", default_value = "127.0.0.1:5555")]
        address: String,
    },
    /// Fetch every holding once and print the portfolio return.
    Show,
}

impl Settings {
    fn into_config(self) -> Result<TrackerConfig> {
        let defaults = TrackerConfig::default();
        let seed = if self.empty {
            vec![]
        } else if let Some(path) = self.seed_file {
            config::load_seed_file(&path)?
        } else {
            defaults.seed
        };
        Ok(TrackerConfig {
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            user_agent: self.user_agent.unwrap_or(defaults.user_agent),
            concurrency: self.concurrency,
            seed,
        })
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!(
                "{}=debug,portfolio_tracker=debug,tower_http=debug",
                env!("CARGO_CRATE_NAME")
            )
            .into()
        }))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let res = match cli.settings.into_config() {
        Ok(config) => match cli.command {
            Some(Commands::Serve { address }) => run_serve(config, address).await,
            Some(Commands::Show) | None => run_show(config).await,
        },
        Err(err) => Err(err),
    };

    if let Err(err) = res {
        error!("{:#}", err);
        std::process::exit(1);
    }
}

fn build_tracker(config: TrackerConfig) -> Result<Tracker<HttpFetcher>> {
    let portfolio = Portfolio::from_seed(&config.seed)?;
    let fetcher = HttpFetcher::new(&config.user_agent, config.fetch_timeout)?;
    let cache = Arc::new(ResultCache::new(fetcher, config.cache_ttl));
    let aggregator = Aggregator::new(cache).with_concurrency(config.concurrency);
    info!(
        "Tracking {} (cache ttl {:?}, fetch timeout {:?})",
        portfolio, config.cache_ttl, config.fetch_timeout
    );
    Ok(Tracker::new(portfolio, aggregator))
}

async fn run_serve(config: TrackerConfig, address: String) -> Result<()> {
    let tracker = Arc::new(build_tracker(config)?);
    info!("{}", "STARTING TRACKER".green());
    server::start(address, tracker).await
}

async fn run_show(config: TrackerConfig) -> Result<()> {
    let tracker = build_tracker(config)?;
    let aggregate = tracker.get_current_aggregate().await;
    println!(
        "{} {}",
        "Updated:".dimmed(),
        aggregate
            .computed_at
            .with_timezone(&chrono::Local)
            .format("%H:%M:%S")
    );
    print!("{}", aggregate);
    Ok(())
}
