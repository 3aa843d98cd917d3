//! europatch-server - Eurorack rack import and patch idea service
//!
//! Scrapes ModularGrid racks into a local SQLite store, caches module manuals
//! and forum threads, and generates patch ideas from a free-text prompt.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use europatch_common::config::{load_toml_config, prepare_root_folder, LoggingConfig};
use europatch_server::config::ServerConfig;
use europatch_server::scraper::HttpFetcher;
use europatch_server::services::catalog::seed_catalog;
use europatch_server::AppState;

/// Command-line arguments for europatch-server
#[derive(Parser, Debug)]
#[command(name = "europatch-server")]
#[command(about = "Eurorack rack import and patch idea service")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides config file)
    #[arg(short, long, env = "EUROPATCH_PORT")]
    port: Option<u16>,

    /// Root folder holding the database
    #[arg(short, long, env = "EUROPATCH_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Bootstrap config file (TOML)
    #[arg(short, long, env = "EUROPATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Insert the starter module catalog before serving
    #[arg(long)]
    seed_catalog: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = load_toml_config(args.config.as_deref());
    init_tracing(&toml_config.logging)?;

    let config = ServerConfig::resolve(toml_config, args.port, args.root_folder.as_deref());

    info!(
        "Starting europatch-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Root folder: {}", config.root_folder.display());

    let db_path = prepare_root_folder(&config.root_folder)
        .map_err(|e| anyhow::anyhow!("Failed to initialize root folder: {}", e))?;
    info!("Database: {}", db_path.display());

    let db_pool = europatch_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;

    if args.seed_catalog {
        let inserted = seed_catalog(&db_pool).await.context("Failed to seed catalog")?;
        info!("Catalog seeding added {} module(s)", inserted);
    }

    let fetcher = HttpFetcher::new(&config.scraper).context("Failed to build HTTP client")?;
    let state = AppState::new(db_pool, Arc::new(fetcher), &config.scraper, config.cache.clone());
    let app = europatch_server::build_router(state);

    let addr = config.listen_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Console (or file) logging; `RUST_LOG` overrides the configured level
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("europatch_server={0},europatch_common={0},tower_http=info", logging.level).into()
    });

    match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
