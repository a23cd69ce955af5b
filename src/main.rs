use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use oilspec::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present, before anything reads the environment.
    let _ = dotenvy::dotenv();

    let args = cli::Cli::parse();

    let default_filter = format!("oilspec={}", args.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    cli::run(args).await
}
