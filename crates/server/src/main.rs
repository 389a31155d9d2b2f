// crates/server/src/main.rs
//! Jobwatch server binary.
//!
//! Loads the completed-job snapshot, binds the HTTP listener and serves until
//! ctrl-c. Running jobs are stopped on shutdown without being finalized.

use anyhow::{Context, Result};
use clap::Parser;
use jobwatch_server::{create_app, init_metrics, AppState, Config};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn,jobwatch_server=info,jobwatch_core=info";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .compact()
        .init();

    let config = Config::parse();
    init_metrics();

    let data_dir = config.data_dir()?;
    let state = AppState::open(&data_dir, config.runner()).await;
    tracing::info!(
        data_dir = %data_dir.display(),
        completed = state.jobs.store().counts().completed,
        "Loaded job snapshot"
    );

    let app = create_app(state.clone());
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    eprintln!("\n  jobwatch v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("  \u{2192} http://{addr}\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.jobs.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
