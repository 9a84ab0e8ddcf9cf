//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

use adstxt_core::{Orchestrator, crawl_single};
use adstxt_discovery::DomainSource;
use adstxt_fetch::Fetcher;
use adstxt_shared::{DEFAULT_MAX_CONCURRENT_FETCHES, Settings, SettingsBuilder};
use adstxt_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// adstxt — crawl publisher domains and reconcile their ads.txt records.
#[derive(Parser)]
#[command(
    name = "adstxt",
    version,
    about = "Crawl publisher domains and reconcile their ads.txt supplier records.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to the local database file.
    #[arg(long, env = "ADSTXT_DB_PATH", global = true)]
    pub db_path: Option<PathBuf>,

    /// Crawler identity, sent as the HTTP User-Agent.
    #[arg(long, env = "ADSTXT_CRAWLER_TAG", global = true)]
    pub crawler_tag: Option<String>,

    /// Maximum concurrent outbound fetches.
    #[arg(long, env = "ADSTXT_CONCURRENCY", global = true)]
    pub concurrency: Option<usize>,

    /// Newline-delimited domain list file (file discovery mode).
    #[arg(long, env = "ADSTXT_FILE_PATH", global = true)]
    pub file_path: Option<PathBuf>,

    /// Search backend base URL (query discovery mode).
    #[arg(long, env = "ADSTXT_QUERY_ENDPOINT", global = true)]
    pub query_endpoint: Option<String>,

    /// Search index to query (query discovery mode).
    #[arg(long, env = "ADSTXT_QUERY_INDEX", global = true)]
    pub query_index: Option<String>,

    /// JSON query body with a top_domains terms aggregation.
    #[arg(long, env = "ADSTXT_QUERY_BODY", global = true)]
    pub query_body: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Crawl continuously until interrupted.
    Run,

    /// Run a single crawl cycle and exit.
    Once,

    /// Fetch and reconcile one domain, ignoring the refresh window.
    Domain {
        /// Domain name to crawl.
        name: String,
    },
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "adstxt=info",
        1 => "adstxt=debug",
        _ => "adstxt=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run => {
            let orchestrator = build_orchestrator(&cli).await?;
            let shutdown = CancellationToken::new();
            let token = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupt received, shutting down");
                    token.cancel();
                }
            });
            orchestrator.run(shutdown).await?;
            Ok(())
        }
        Command::Once => {
            let orchestrator = build_orchestrator(&cli).await?;
            orchestrator.run_once().await?;
            Ok(())
        }
        Command::Domain { ref name } => cmd_domain(&cli, name).await,
    }
}

/// Validate discovery-mode settings and assemble the crawl pipeline.
async fn build_orchestrator(cli: &Cli) -> Result<Orchestrator> {
    let settings: Settings = SettingsBuilder {
        db_path: cli.db_path.clone(),
        crawler_tag: cli.crawler_tag.clone(),
        max_concurrent_fetches: cli.concurrency,
        file_path: cli.file_path.clone(),
        query_endpoint: cli.query_endpoint.clone(),
        query_index: cli.query_index.clone(),
        query_body: cli.query_body.clone(),
    }
    .build()?;

    let store = Storage::open(&settings.db_path).await?;
    let fetcher = Fetcher::new(&settings.crawler_tag, settings.max_concurrent_fetches)?;
    let source = DomainSource::from_settings(&settings)?;

    Ok(Orchestrator::new(Arc::new(store), fetcher, source))
}

/// One-off crawl of a single domain. Needs no discovery configuration.
async fn cmd_domain(cli: &Cli, name: &str) -> Result<()> {
    let db_path = cli
        .db_path
        .clone()
        .ok_or_else(|| color_eyre::eyre::eyre!("--db-path is required"))?;
    let crawler_tag = cli
        .crawler_tag
        .clone()
        .ok_or_else(|| color_eyre::eyre::eyre!("--crawler-tag is required"))?;

    let store = Storage::open(&db_path).await?;
    let fetcher = Fetcher::new(
        &crawler_tag,
        cli.concurrency.unwrap_or(DEFAULT_MAX_CONCURRENT_FETCHES),
    )?;

    crawl_single(&store, &fetcher, name).await?;
    Ok(())
}
