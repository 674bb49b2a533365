//! MatchBot API - Main Application Entry Point
//!
//! Backend for the MatchBot document-upload and reconciliation service. It
//! mirrors users from Clerk through signed webhooks and lets clients upload
//! documents straight to S3-compatible storage with presigned forms.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Object Storage**: S3 / MinIO via aws-sdk-s3 and SigV4 POST policies
//! - **Identity**: Clerk webhooks verified with SVIX signatures
//! - **Authentication**: API key with SHA-256 hashing
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool and run migrations
//! 3. Re-dispatch webhook events left unfinished by the previous run
//! 4. Build HTTP router with routes and middleware
//! 5. Serve until Ctrl-C / SIGTERM
//!
//! # Commands
//!
//! - `matchbot-api` - run the server
//! - `matchbot-api issue-api-key <clerk_id> [name]` - issue a key for a synced
//!   user and print it once

mod app;
mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;
mod state;

use tracing_subscriber::EnvFilter;

use crate::services::{api_keys, webhook_processor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    config.validate()?;
    tracing::info!(
        bucket = %config.s3_bucket,
        endpoint = config.s3_endpoint.as_deref().unwrap_or("aws"),
        "Configuration loaded"
    );

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None => {}
        Some("issue-api-key") => {
            let clerk_id = args
                .get(1)
                .ok_or_else(|| anyhow::anyhow!("usage: matchbot-api issue-api-key <clerk_id> [name]"))?;
            let name = args.get(2).map(String::as_str).unwrap_or("default");
            let issued = api_keys::issue_for_clerk_user(&pool, clerk_id, name).await?;
            println!("{}", issued.key);
            return Ok(());
        }
        Some(other) => anyhow::bail!("unknown command: {other}"),
    }

    let state = state::AppState::new(&config, pool)?;

    let recovered = webhook_processor::recover_pending(&state.pool, state.retry_policy).await?;
    if recovered > 0 {
        tracing::info!(count = recovered, "Re-dispatched unfinished webhook events");
    }

    let app = app::build_router(state, app::cors_layer(&config)?);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix (docker stop).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
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

    tracing::info!("Shutdown signal received");
}
