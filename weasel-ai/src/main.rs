//! weasel-ai - Call log compliance service
//!
//! Accepts debt-collection call logs, stores them in the blob store and runs
//! each through an FDCPA compliance analysis by a hosted language model.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weasel_common::config::{default_config_path, env};

use weasel_ai::config::{load_config_logged, CliOverrides, ServerSettings};
use weasel_ai::services::AnthropicClient;
use weasel_ai::storage::{SqliteBlobStore, StorageClient};
use weasel_ai::AppState;

/// Command-line arguments for weasel-ai
#[derive(Parser, Debug)]
#[command(name = "weasel-ai")]
#[command(about = "Call log compliance analysis service")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = env::CONFIG)]
    config: Option<PathBuf>,

    /// Address to listen on (host:port)
    #[arg(short, long, env = env::BIND)]
    bind: Option<String>,

    /// Blob store connection string (SQLite URL)
    #[arg(short, long, env = env::STORAGE_CONNECTION_STRING)]
    storage: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(default_config_path);

    let toml_config =
        load_config_logged(&config_path, std::io::stdout).context("Failed to load config file")?;

    // RUST_LOG overrides the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("weasel_ai={0},weasel_common={0},tower_http=info", toml_config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting weasel-ai v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    // clap has already folded the environment into these
    let settings = ServerSettings::resolve(
        CliOverrides {
            bind: args.bind,
            connection_string: args.storage,
        },
        &toml_config,
    );
    settings.log_summary();

    let store = SqliteBlobStore::connect(&settings.connection_string)
        .await
        .context("Failed to open blob store")?;
    let storage = StorageClient::new(Arc::new(store), settings.containers.clone());
    storage
        .initialize_containers()
        .await
        .context("Failed to initialize storage containers")?;
    info!("Blob store ready");

    let model = AnthropicClient::new(
        settings.llm_api_key.clone(),
        settings.llm_model.clone(),
        settings.llm_base_url.clone(),
    )
    .context("Failed to build language model client")?;
    info!(
        model = %model.model(),
        api_key_configured = model.has_api_key(),
        "Language model client ready"
    );

    let state = AppState::from_model(storage, Arc::new(model), settings.max_file_size_mb);

    match state.pipeline.recover_pending().await {
        Ok(0) => {}
        Ok(n) => info!("Re-queued {} pending analyses", n),
        Err(e) => tracing::warn!(error = %e, "Could not scan for pending analyses"),
    }

    let app = weasel_ai::build_router(state);

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

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
