// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::live_metrics_service::LiveMetricsService;
use crate::application::session_store::{Session, SessionStore};
use crate::infrastructure::config::{load_dashboard_config, load_dashboard_config_from};
use crate::infrastructure::http_repository::HttpRepository;
use crate::infrastructure::session_store::{FileSessionStore, InMemorySessionStore};
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    health_check, live_snapshot, live_stream, normalize_samples, session_status, sign_in, sign_out,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration, from an explicit file when one is given
    let config = match std::env::args().nth(1) {
        Some(path) => load_dashboard_config_from(Path::new(&path))?,
        None => load_dashboard_config()?,
    };

    // Session backing the bearer token
    let store: Arc<dyn SessionStore> = match &config.session.path {
        Some(path) => Arc::new(FileSessionStore::open(path)?),
        None => Arc::new(InMemorySessionStore::default()),
    };
    let session = Session::new(store);
    if let Some(token) = &config.api.token {
        session.set_token(token)?;
    }
    if session.token().is_none() {
        tracing::warn!("no API token configured; requests will be sent unauthenticated");
    }

    // Create repository (infrastructure layer)
    let repository = Arc::new(HttpRepository::new(
        config.api.base_url.clone(),
        Duration::from_secs(config.api.timeout_secs),
        session.clone(),
    )?);

    // Create services (application layer)
    let live_service = LiveMetricsService::new(repository, config.live.clone());

    let state = Arc::new(AppState {
        live_service,
        session,
        snapshot_timeout: config.live.fetch_timeout() + Duration::from_secs(1),
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/normalize", post(normalize_samples))
        .route("/live", get(live_snapshot))
        .route("/live/stream", get(live_stream))
        .route("/session", get(session_status).post(sign_in).delete(sign_out))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = config.server.socket_addr()?;
    tracing::info!(
        address = %addr,
        api = %config.api.base_url,
        poll_interval_secs = config.live.poll_interval_secs,
        "starting derms-telemetry service"
    );

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
