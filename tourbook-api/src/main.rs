//! # Tourbook API Server
//!
//! REST backend for the tour booking site: tours, users, reviews and
//! bookings, with payments delegated to Stripe checkout.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p tourbook-api
//! ```

use anyhow::Context;
use std::sync::Arc;
use tourbook_api::{
    app::{build_router, AppState},
    config::Config,
};
use tourbook_shared::{
    db::{
        migrations::run_migrations,
        pool::{create_pool, DatabaseConfig as PoolConfig},
    },
    payments::stripe::StripeClient,
    repository::Repositories,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tourbook_api=debug,tourbook_shared=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Panics are fatal; the supervisor restarts the process
    std::panic::set_hook(Box::new(|info| {
        tracing::error!("Unhandled panic, shutting down: {}", info);
        std::process::exit(1);
    }));

    tracing::info!(
        "Tourbook API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env().context("Failed to load configuration")?;

    let pool_config = PoolConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..Default::default()
    };

    let pool = match create_pool(pool_config).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Could not connect to the database");
            std::process::exit(1);
        }
    };
    tracing::info!("Database connection established");

    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let payments = Arc::new(StripeClient::new(config.stripe.clone())?);
    let repos = Repositories::postgres(pool);
    let bind_address = config.bind_address();

    let state = AppState::new(repos.clone(), payments, config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    repos.close().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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

    tracing::info!("Shutdown signal received, draining connections...");
}
