//! usertree-api - User directory service
//!
//! Registration, login, bulk import from CSV/TSV/JSON with parent linking by
//! username, and the resulting hierarchy as JSON or HTML.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use usertree_common::config::{self, CliOverrides, Settings, ENV_BIND, ENV_ROOT_FOLDER};
use usertree_common::PasswordHasher;

use usertree_api::AppState;

/// Command-line arguments for usertree-api
#[derive(Parser, Debug)]
#[command(name = "usertree-api")]
#[command(about = "User directory and hierarchy service")]
#[command(version)]
struct Args {
    /// Config file (TOML); overrides USERTREE_CONFIG
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Folder holding the SQLite database
    #[arg(short, long, env = ENV_ROOT_FOLDER)]
    root_folder: Option<PathBuf>,

    /// Listen address, e.g. 127.0.0.1:5780
    #[arg(short, long, env = ENV_BIND)]
    bind: Option<String>,

    /// Default log level when RUST_LOG is unset
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config =
        config::load_toml_config(args.config.as_deref()).context("Failed to load config file")?;
    let settings = Settings::resolve(
        &CliOverrides {
            root_folder: args.root_folder,
            bind: args.bind,
            log_level: args.log_level,
        },
        &toml_config,
    );

    // RUST_LOG wins over the configured level
    let default_filter = format!(
        "usertree_api={level},usertree_common={level},tower_http={level}",
        level = settings.log_level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting usertree-api v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Root folder: {}", settings.root_folder.display());

    let db_path = settings.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = usertree_common::db::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let hasher = PasswordHasher::from_config(&settings.credentials)
        .context("Invalid [credentials] configuration")?;

    let state = AppState::new(db_pool, hasher).with_max_upload_bytes(settings.max_upload_bytes);
    let app = usertree_api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.bind))?;
    info!("Listening on http://{}", settings.bind);
    info!("Health check: http://{}/health", settings.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or, on unix, SIGTERM
///
/// A handler that cannot be installed is logged and never fires; the other
/// one still stops the server.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Ctrl+C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let source = tokio::select! {
        _ = ctrl_c => "Ctrl+C",
        _ = terminate => "SIGTERM",
    };
    info!("{} received, draining connections", source);
}
