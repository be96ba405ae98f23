//! civic-board - crowd-sourced civic incident board
//!
//! Serves the incident API (and optionally the single-page client) from an
//! in-memory store that is flushed to JSON files in the data folder.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use civic_board::config::{BoardConfig, Overrides};
use civic_board::geocode::{DisabledGeocoder, Geocoder, NominatimGeocoder};
use civic_board::identity::{IdentityProvider, StaticTokenProvider};
use civic_board::incidents::IncidentStore;
use civic_board::persistence::{spawn_flusher, BlobStore, JsonFileStore};
use civic_board::polls::PollLedger;
use civic_board::users::UserStore;
use civic_board::{build_router, build_router_with_static, AppState};

#[derive(Parser, Debug)]
#[command(name = "civic-board")]
#[command(about = "Crowd-sourced civic incident reporting board")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "CIVIC_BOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "CIVIC_BOARD_PORT")]
    port: Option<u16>,

    /// Folder holding the JSON snapshots
    #[arg(short, long, env = "CIVIC_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Disable geocoding lookups
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = Overrides {
        config_path: args.config,
        port: args.port,
        data_dir: args.data_dir,
        offline: args.offline,
    };
    let config = BoardConfig::resolve(&overrides).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("civic_board={0},tower_http={0}", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting civic-board v{}", env!("CARGO_PKG_VERSION"));

    let data_dir = config.data_dir();
    info!("Data folder: {}", data_dir.display());
    let blob: Arc<dyn BlobStore> = Arc::new(JsonFileStore::new(data_dir));

    let geocoder: Arc<dyn Geocoder> = if config.geocoding.enabled {
        let client = NominatimGeocoder::new(&config.geocoding).context("Failed to build geocoding client")?;
        info!("Geocoding via {}", config.geocoding.base_url);
        Arc::new(client)
    } else {
        info!("Geocoding disabled");
        Arc::new(DisabledGeocoder)
    };

    let tokens = StaticTokenProvider::new(&config.identity.tokens);
    if tokens.is_empty() {
        warn!("No identity tokens configured; authenticated endpoints will reject every request");
    } else {
        info!("Loaded {} identity token(s)", tokens.len());
    }
    let identity: Arc<dyn IdentityProvider> = Arc::new(tokens);

    let incidents = Arc::new(
        IncidentStore::load(blob.clone(), geocoder)
            .await
            .context("Failed to load incidents")?,
    );
    let polls = Arc::new(PollLedger::load(blob.clone()).await.context("Failed to load poll responses")?);
    let users = Arc::new(UserStore::load(blob).await.context("Failed to load user profiles")?);

    let shutdown = CancellationToken::new();
    let debounce = config.flush_debounce();
    let flushers = vec![
        spawn_flusher(incidents.clone(), incidents.dirty_flag(), debounce, shutdown.clone()),
        spawn_flusher(polls.clone(), polls.dirty_flag(), debounce, shutdown.clone()),
        spawn_flusher(users.clone(), users.dirty_flag(), debounce, shutdown.clone()),
    ];

    let state = AppState::new(incidents, polls, users, identity, config.polling_recommended_ms);
    let app = match config.static_dir() {
        Some(dir) => {
            info!("Serving client from {}", dir.display());
            build_router_with_static(state, dir)
        }
        None => build_router(state),
    };

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("civic-board listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Flushing pending changes");
    shutdown.cancel();
    for flusher in flushers {
        if let Err(e) = flusher.await {
            warn!("Flusher task ended abnormally: {}", e);
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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
