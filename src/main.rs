// SPDX-License-Identifier: MIT

//! flowbridge server
//!
//! Polls the Bosch eBike Flow cloud on a fixed interval and republishes the
//! merged telemetry as entities over a local REST API.

use std::sync::Arc;
use std::time::Duration;

use flowbridge::{
    config::Config,
    services::{Coordinator, FlowClient, FlowSession, SnapshotRegistry},
    store::StateStore,
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting flowbridge");

    // Load persisted state (tokens, cursors, stats)
    let store = StateStore::load(&config.state_path)
        .await
        .expect("Failed to load state file");

    // Flow API client and session
    let client = FlowClient::new(&config);
    let session = FlowSession::new(client, store.clone(), config.token_url.clone());

    if session.logged_in().await {
        tracing::info!("Flow tokens found, coordinator will start polling");
    } else {
        tracing::warn!("No Flow tokens yet - complete the login via GET /auth/login");
    }

    // Snapshot registry and refresh coordinator
    let registry: SnapshotRegistry = Arc::new(dashmap::DashMap::new());
    let coordinator = Arc::new(Coordinator::new(
        session.clone(),
        store.clone(),
        registry.clone(),
        Duration::from_secs(config.poll_interval_secs),
    ));
    tokio::spawn(coordinator.clone().run());
    tracing::info!(
        interval_secs = config.poll_interval_secs,
        "Refresh coordinator started"
    );

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        session,
        registry,
        coordinator,
        pending_login: tokio::sync::Mutex::new(None),
    });

    // Build router
    let app = flowbridge::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize logging with an env-filter; `RUST_LOG` overrides the default.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("flowbridge=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
