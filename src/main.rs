//! Courtside server
//!
//! GraphQL API for player statistics with JWT authentication and live
//! subscriptions for newly created players.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use courtside::bus::{LocalTransport, Transport};
use courtside::config::Config;
use courtside::db::Database;
use courtside::graphql::ShutdownSignal;
use courtside::{AppState, build_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courtside=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("Starting Courtside");

    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e);
        }
    };
    tracing::info!(
        port = config.port,
        origins = ?config.allowed_origins,
        "Configuration loaded"
    );

    let db = Database::connect(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.context("Failed to apply schema")?;
    tracing::info!("Database ready");

    let bus = LocalTransport::connect();
    let transport: Arc<dyn Transport> = Arc::new(bus.clone());
    tracing::info!("Event transport connected");

    let shutdown = ShutdownSignal::default();
    let state = AppState::new(config.clone(), db.clone(), transport, shutdown.clone());
    let app = build_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);
    tracing::info!("GraphQL playground: http://localhost:{}/graphql", config.port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    bus.close();
    db.close().await;
    tracing::info!("Courtside stopped");

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then end every live subscription
async fn shutdown_signal(shutdown: ShutdownSignal) {
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown requested, closing subscriptions");
    shutdown.trigger();
}
