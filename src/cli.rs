//! CLI surface and command wiring.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::catalog::CatalogLoader;
use crate::clients::{AdvisorClient, DisambiguatorClient, LlmConfig, RateLimiter};
use crate::config::{
    Settings, DEFAULT_CATALOG_CACHE, DEFAULT_CHECKPOINT_FILE, DEFAULT_DATABASE_FILE,
};
use crate::matching::SmartMatcher;
use crate::repository::{
    init_schema, AsyncSqlitePool, FailureRepository, OilSpecRepository, VehicleRepository,
};
use crate::scraper::{AdvisorAdapter, ScrapeSummary, ScraperConfig, ScraperService};
use crate::server;

#[derive(Parser)]
#[command(name = "oilspec")]
#[command(about = "Vehicle catalog enrichment from the Motul oil advisor")]
#[command(version)]
pub struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true, env = "DATABASE_PATH", default_value = DEFAULT_DATABASE_FILE)]
    pub database: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema
    Init,

    /// Run the enrichment crawl against the oil advisor
    Scrape {
        /// Number of concurrent workers (keep low while LLM-bound)
        #[arg(long, env = "SCRAPER_WORKERS", default_value = "1")]
        workers: usize,

        /// Per-worker pacing interval in milliseconds
        #[arg(long, env = "SCRAPER_RATE_LIMIT_MS", default_value = "2000")]
        rate_limit_ms: u64,

        /// Advisor requests per second (hard ceiling across workers)
        #[arg(long, env = "ADVISOR_RPS", default_value = "1.0")]
        advisor_rps: f64,

        /// Save a checkpoint every N fed vehicles
        #[arg(long, env = "CHECKPOINT_EVERY", default_value = "50")]
        checkpoint_every: usize,

        /// Checkpoint file path
        #[arg(long, env = "CHECKPOINT_FILE", default_value = DEFAULT_CHECKPOINT_FILE)]
        checkpoint_file: PathBuf,

        /// Resume from a specific vehicle id (overrides the checkpoint)
        #[arg(long, env = "RESUME_FROM", default_value = "0")]
        resume_from: i32,

        /// Walk the pipeline without external calls or writes
        #[arg(long, env = "DRY_RUN")]
        dry_run: bool,

        /// HTTP monitoring port
        #[arg(long, env = "MONITOR_PORT", default_value = "9090")]
        monitor_port: u16,

        /// Disable the HTTP monitor
        #[arg(long, env = "NO_MONITOR")]
        no_monitor: bool,

        /// LLM API keys, comma-separated for failover
        #[arg(long, env = "LLM_API_KEYS")]
        llm_keys: String,

        /// LLM requests per minute per key
        #[arg(long, env = "LLM_RPM", default_value = "30")]
        llm_rpm: f64,

        /// LLM model id
        #[arg(long, env = "LLM_MODEL")]
        llm_model: Option<String>,

        /// Advisor catalog cache file
        #[arg(long, env = "CATALOG_CACHE", default_value = DEFAULT_CATALOG_CACHE)]
        catalog_cache: PathBuf,
    },

    /// Serve the read-only catalog API
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(long, env = "API_PORT", default_value = "8080")]
        port: u16,
    },

    /// Inspect and clean the failure table
    Failures {
        #[command(subcommand)]
        command: FailureCommands,
    },
}

#[derive(Subcommand)]
enum FailureCommands {
    /// Unresolved failure counts by error kind
    Stats,
    /// Delete resolved failures older than the given age
    Purge {
        #[arg(long, default_value = "30")]
        older_than_days: i64,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::new(&cli.database);

    match cli.command {
        Commands::Init => cmd_init(&settings).await,
        Commands::Scrape {
            workers,
            rate_limit_ms,
            advisor_rps,
            checkpoint_every,
            checkpoint_file,
            resume_from,
            dry_run,
            monitor_port,
            no_monitor,
            llm_keys,
            llm_rpm,
            llm_model,
            catalog_cache,
        } => {
            let config = ScraperConfig {
                workers,
                worker_interval: Duration::from_millis(rate_limit_ms),
                checkpoint_every,
                checkpoint_path: checkpoint_file,
                resume_from_id: resume_from,
                dry_run,
                monitor_port,
                enable_monitor: !no_monitor,
            };
            cmd_scrape(
                &settings,
                config,
                advisor_rps,
                &llm_keys,
                llm_rpm,
                llm_model,
                &catalog_cache,
            )
            .await
        }
        Commands::Serve { host, port } => cmd_serve(&settings, &host, port).await,
        Commands::Failures { command } => cmd_failures(&settings, command).await,
    }
}

/// Cancellation token wired to ctrl-c.
fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received interrupt, shutting down gracefully");
            trigger.cancel();
        }
    });
    cancel
}

async fn open_database(settings: &Settings) -> anyhow::Result<AsyncSqlitePool> {
    settings.ensure_directories()?;
    let pool = AsyncSqlitePool::from_path(&settings.database_path);
    init_schema(&pool)
        .await
        .with_context(|| format!("failed to open database {}", settings.database_path.display()))?;
    Ok(pool)
}

async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    let _ = open_database(settings).await?;
    println!(
        "{} Database initialized at {}",
        style("✓").green(),
        settings.database_path.display()
    );
    Ok(())
}

async fn cmd_scrape(
    settings: &Settings,
    config: ScraperConfig,
    advisor_rps: f64,
    llm_keys: &str,
    llm_rpm: f64,
    llm_model: Option<String>,
    catalog_cache: &std::path::Path,
) -> anyhow::Result<()> {
    let keys: Vec<String> = llm_keys
        .split(',')
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    if keys.is_empty() {
        bail!("at least one LLM API key is required (--llm-keys or LLM_API_KEYS)");
    }

    let pool = open_database(settings).await?;
    let cancel = shutdown_token();

    let advisor_limiter = Arc::new(RateLimiter::new(advisor_rps));
    let advisor = Arc::new(
        AdvisorClient::new(advisor_limiter, cancel.clone())
            .context("failed to build advisor client")?,
    );

    // Catalog load is the one long synchronous-feeling phase; show a spinner.
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("static template"),
    );
    spinner.set_message("loading advisor catalog...");
    spinner.enable_steady_tick(Duration::from_millis(120));

    let loader = CatalogLoader::new(&advisor, catalog_cache);
    let catalog = loader
        .load_or_fetch()
        .await
        .context("failed to load advisor catalog")?;

    spinner.finish_with_message(format!(
        "catalog ready: {} brands, {} models, {} types",
        catalog.brands.len(),
        catalog.total_models(),
        catalog.total_types()
    ));

    let mut llm_config = LlmConfig {
        requests_per_minute: llm_rpm,
        ..Default::default()
    };
    if let Some(model) = llm_model {
        llm_config.model = model;
    }
    let llm = DisambiguatorClient::new(keys, llm_config, cancel.clone())
        .context("failed to build LLM client")?;

    let matcher = SmartMatcher::new(Arc::new(catalog), llm.clone());
    let adapter = Arc::new(AdvisorAdapter::new(matcher, advisor));

    let service = ScraperService::new(
        config,
        Arc::new(VehicleRepository::new(pool.clone())),
        Arc::new(OilSpecRepository::new(pool.clone())),
        Arc::new(FailureRepository::new(pool)),
        adapter,
        cancel,
    )
    .with_key_pool_status(llm);

    let summary = service.run().await?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &ScrapeSummary) {
    let headline = if summary.cancelled {
        style("Crawl cancelled").yellow()
    } else {
        style("Crawl complete").green()
    };
    println!("\n{}", headline);
    println!(
        "  processed {} of {} ({} success, {} failed, {} skipped, {} no-match)",
        summary.processed,
        summary.total,
        style(summary.success).green(),
        style(summary.failed).red(),
        summary.skipped,
        summary.no_match,
    );
    println!(
        "  matches: {} exact, {} fuzzy",
        summary.exact_match, summary.fuzzy_match
    );
}

async fn cmd_serve(settings: &Settings, host: &str, port: u16) -> anyhow::Result<()> {
    let pool = open_database(settings).await?;
    let cancel = shutdown_token();
    server::serve(pool, host, port, cancel).await
}

async fn cmd_failures(settings: &Settings, command: FailureCommands) -> anyhow::Result<()> {
    let pool = open_database(settings).await?;
    let failures = FailureRepository::new(pool);

    match command {
        FailureCommands::Stats => {
            let pending = failures.count_pending().await?;
            let stats = failures.stats().await?;

            println!("{} unresolved failures", style(pending).bold());
            let mut kinds: Vec<_> = stats.into_iter().collect();
            kinds.sort_by(|a, b| b.1.cmp(&a.1));
            for (kind, count) in kinds {
                println!("  {:<16} {}", kind.as_str(), count);
            }
        }
        FailureCommands::Purge { older_than_days } => {
            let removed = failures
                .purge_resolved(chrono::Duration::days(older_than_days))
                .await?;
            println!(
                "{} Removed {} resolved failure records older than {} days",
                style("✓").green(),
                removed,
                older_than_days
            );
        }
    }
    Ok(())
}
