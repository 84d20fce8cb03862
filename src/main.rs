//! SchemaLens API - MySQL Schema Explorer
//!
//! Connects to MySQL environments through port-forwarding tunnels and
//! answers questions about their schemas:
//! - ERD generation with unused-table filtering (DOT and PNG)
//! - Environment compare (table and column name diff)
//! - Ad-hoc queries with CSV export
//! - Code impact analysis over local or hosted repositories

mod config;
mod connection;
mod erd;
mod error;
mod impact;
mod metadata;
mod models;
mod query;
mod routes;
mod snapshot;
mod state;
mod tunnel;

use crate::config::Settings;
use crate::routes::create_router;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting SchemaLens - MySQL Schema Explorer...");

    // Load configuration
    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    if settings.environments.is_empty() {
        warn!("⚠️  No environments configured; add [environments.<NAME>] to schemalens.toml");
    } else {
        info!(
            "🗄️  Environments: {}",
            settings.environments.keys().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    if !settings.tunnel.enabled {
        warn!("⚠️  Tunnel disabled, connecting to environment hosts directly");
    }

    let state = Arc::new(AppState::new(settings.clone())?);

    // Build the router
    let app = create_router(state.clone(), &settings);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   ─── Connections ───");
    info!("   POST   /api/credentials                      - Store AWS session credentials");
    info!("   POST   /api/connections                      - Connect an environment");
    info!("   GET    /api/connections                      - List connections");
    info!("   DELETE /api/connections/{{env}}                - Disconnect an environment");
    info!("   GET    /api/connections/{{env}}/schemas        - List schemas");
    info!("   GET    /api/connections/schema-diff          - Schema names across two environments");
    info!("");
    info!("   ─── Metadata ───");
    info!("   GET    /api/metadata/{{env}}/{{schema}}          - Cached snapshot and table stats");
    info!("   POST   /api/metadata/{{env}}/{{schema}}/reload   - Reload a snapshot");
    info!("");
    info!("   ─── ERD ───");
    info!("   POST   /api/erd                              - Generate a diagram");
    info!("   POST   /api/erd/export                       - Download DOT or PNG");
    info!("   GET    /api/erd/exclusions                   - Tables left out of the last diagram");
    info!("");
    info!("   ─── Query & Compare ───");
    info!("   POST   /api/query                            - Run a query");
    info!("   POST   /api/query/csv                        - Run a query as CSV");
    info!("   POST   /api/query/suggest                    - Column suggestions");
    info!("   POST   /api/compare                          - Compare two schemas");
    info!("");
    info!("   ─── Code Impact ───");
    info!("   POST   /api/impact/table                     - References to a table");
    info!("   POST   /api/impact/column                    - References to a column");
    info!("   POST   /api/impact/unused                    - Tables and columns never referenced");
    info!("");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Tunnels are child processes; stop them before exiting
    state.connections.disconnect_all().await;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,schemalens_api=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
