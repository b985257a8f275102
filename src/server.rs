//! HTTP server bootstrap.
//!
//! Wires together configuration, the SQLite store, the App Store client, the
//! verification engine, the backlog reconciler, and the Axum router.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use crate::engine::VerificationEngine;
use crate::infra::{SqliteStore, TenantStore};
use crate::platform::{AppStoreClient, AppStoreConfig};
use crate::reconciler::{spawn_reconciler, ReconcilerConfig};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection URL.
    pub database_url: String,
    /// Server listen address.
    pub listen_addr: SocketAddr,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://iap_sentry.db?mode=rwc".to_string());

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8081);

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid listen address: {e}"))?;

        Ok(Self {
            database_url,
            listen_addr,
        })
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub tenants: Arc<dyn TenantStore>,
    pub engine: Arc<VerificationEngine>,
}

/// Start the HTTP server and the backlog reconciler.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    info!("starting iap-sentry v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(listen_addr = %config.listen_addr, database_url = %config.database_url, "configuration loaded");

    let store = SqliteStore::connect(&config.database_url).await?;
    store.initialize().await?;
    info!("database migrations applied");

    let platform_config = AppStoreConfig::from_env();
    if platform_config.offline {
        info!("platform verification is in offline mode; all calls will be deferred");
    }
    let platform = Arc::new(AppStoreClient::new(platform_config)?);

    let store = Arc::new(store);
    let engine = Arc::new(VerificationEngine::new(
        store.clone(),
        store.clone(),
        platform,
    ));

    let (_reconciler_handle, _reconciler_control) = spawn_reconciler(
        ReconcilerConfig::from_env(),
        store.clone(),
        store.clone(),
        engine.clone(),
    );

    let state = AppState {
        tenants: store,
        engine,
    };

    let app = build_router().with_state(state);

    info!(listen_addr = %config.listen_addr, "starting HTTP server");
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    info!("iap-sentry is ready to accept submissions");
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}

fn build_router() -> Router<AppState> {
    Router::new()
        .merge(crate::api::router())
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
}

/// Health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "service": "iap-sentry",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
