//! jobtrack-scan - job application mailbox scanner
//!
//! Fetches recent mail from Gmail, keeps the job-related messages, links them
//! to tracked applications and creates applications for new ones. Serves the
//! tracker over HTTP REST + SSE.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use jobtrack_common::config::{RootFolderInitializer, TomlConfig};
use jobtrack_common::events::EventBus;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jobtrack_scan::config::{CliOverrides, ServiceConfig};
use jobtrack_scan::services::GmailClient;
use jobtrack_scan::AppState;

/// Command-line arguments for jobtrack-scan
#[derive(Parser, Debug)]
#[command(name = "jobtrack-scan")]
#[command(about = "Job application mailbox scanner")]
#[command(version)]
struct Args {
    /// Folder holding the tracker database
    #[arg(short, long, env = "JOBTRACK_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Address to listen on, e.g. 127.0.0.1:5780
    #[arg(short, long, env = "JOBTRACK_BIND_ADDRESS")]
    bind_address: Option<String>,

    /// Log level when RUST_LOG is not set
    #[arg(short, long, env = "JOBTRACK_LOG_LEVEL")]
    log_level: Option<String>,

    /// Gmail authorized-user token file
    #[arg(long, env = "JOBTRACK_GMAIL_TOKEN_FILE")]
    gmail_token_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let cli = CliOverrides {
        root_folder: args.root_folder,
        bind_address: args.bind_address,
        log_level: args.log_level,
        gmail_token_file: args.gmail_token_file,
    };
    let config = ServiceConfig::resolve(&cli, &TomlConfig::load_or_default());

    let level = config.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("jobtrack_scan={level},jobtrack_common={level},tower_http={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting jobtrack-scan {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));
    info!("Root folder: {}", config.root_folder.display());

    let initializer = RootFolderInitializer::new(config.root_folder.clone());
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = jobtrack_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let event_bus = EventBus::new(100);

    match &config.gmail_token_file {
        Some(path) => info!("Gmail token file: {}", path.display()),
        None => info!("No Gmail token file configured; scans will report a configuration error"),
    }
    let source = Arc::new(GmailClient::new(
        config.gmail_token_file.clone(),
        config.gmail_delegated_user.clone(),
    ));

    let state = AppState::new(db_pool.clone(), event_bus, source, &config);
    let fetch_pool = Arc::clone(&state.fetch_pool);
    let app = jobtrack_scan::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;
    info!("Listening on http://{}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    fetch_pool.shutdown().await;
    db_pool.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
