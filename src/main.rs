//! Main entry point for the repo-cloner CLI

use clap::Parser;
use repo_cloner::cancel::CancelToken;
use repo_cloner::cli::{self, Cli, Commands};
use repo_cloner::metrics;
use std::net::SocketAddr;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with optional JSON formatting.
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("repo_cloner=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    // One cancellation token for the whole process, tripped by Ctrl+C and
    // threaded into every subsystem below.
    let cancel = CancelToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received - cancelling in-flight work...");
                cancel.cancel();
            }
        }
    });

    // Metrics are opt-in and non-fatal.
    if let Ok(metrics_addr) = std::env::var("METRICS_ADDR") {
        match metrics_addr.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::warn!("failed to initialize metrics: {e}. Continuing without metrics.");
                }
            }
            Err(_) => {
                tracing::debug!("invalid metrics address: {metrics_addr}. Metrics disabled.");
            }
        }
    }

    let args = Cli::parse();

    let fetch = match cli::build_fetch_usecase(&args, &cancel) {
        Ok(fetch) => fetch,
        Err(e) => {
            error!("failed to configure providers: {e}");
            std::process::exit(1);
        }
    };

    let result = match &args.command {
        Commands::List(list_args) => list_args.execute(&fetch).await,
        Commands::Clone(clone_args) => clone_args.execute(&fetch, &cancel).await,
    };

    if let Err(e) = result {
        error!("command failed: {e}");
        std::process::exit(1);
    }
}
