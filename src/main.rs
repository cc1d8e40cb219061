//! Internal Transfers service
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────┐    ┌──────────┐
//! │  Config  │───▶│ Gateway  │───▶│  Engine  │───▶│  Store   │
//! │  (YAML)  │    │  (axum)  │    │(transfer)│    │(PG / mem)│
//! └──────────┘    └──────────┘    └──────────┘    └──────────┘
//!                       │
//!                       └──▶ Idempotency gate ──▶ sweeper (background)
//! ```
//!
//! Flags: `--env <name>` (default `dev`), `--port <port>`, `--memory`.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;

use internal_transfers::config::AppConfig;
use internal_transfers::db::{Database, PgStore};
use internal_transfers::gateway::{self, state::AppState};
use internal_transfers::idempotency::run_sweeper;
use internal_transfers::logging::init_logging;
use internal_transfers::store::memory::MemoryStore;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

fn use_memory_store() -> bool {
    std::env::args().any(|a| a == "--memory")
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
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

async fn build_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let gateway = &config.gateway;

    if use_memory_store() {
        tracing::warn!("Running with the in-memory store; balances are lost on exit");
        let store = MemoryStore::with_idempotency_ttl(config.idempotency.ttl())
            .lock_timeout(config.postgres.lock_timeout());
        return Ok(AppState::memory(
            store,
            gateway.transfer_deadline(),
            gateway.request_timeout(),
        ));
    }

    let url = config
        .database_url()
        .context("No database configured: set postgres_url or DATABASE_URL, or pass --memory")?;
    let db = Database::connect(
        &url,
        config.postgres.max_connections,
        config.postgres.acquire_timeout(),
    )
    .await
    .context("Failed to connect to PostgreSQL")?;
    db.init_schema()
        .await
        .context("Failed to initialize schema")?;

    let store = PgStore::new(db.pool().clone(), config.idempotency.ttl())
        .lock_timeout(config.postgres.lock_timeout());
    Ok(AppState::postgres(
        store,
        gateway.transfer_deadline(),
        gateway.request_timeout(),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = init_logging(&app_config);

    tracing::info!("Starting Internal Transfers in {} mode", env);

    let state = Arc::new(build_state(&app_config).await?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let wait_for_shutdown = |mut rx: watch::Receiver<bool>| async move {
        while !*rx.borrow() {
            // Sender dropped also means shutdown
            if rx.changed().await.is_err() {
                break;
            }
        }
    };

    let sweeper = tokio::spawn(run_sweeper(
        state.idempotency.clone(),
        app_config.idempotency.sweep_interval(),
        wait_for_shutdown(shutdown_rx.clone()),
    ));

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let port = get_port_override().unwrap_or(app_config.gateway.port);
    gateway::run_server(
        &app_config.gateway.host,
        port,
        state,
        wait_for_shutdown(shutdown_rx),
    )
    .await?;

    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Idempotency sweeper ended abnormally");
    }
    tracing::info!("Internal Transfers stopped");
    Ok(())
}
