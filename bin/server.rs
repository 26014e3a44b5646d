// Expense Tracker - Web Server
// Records expenses and serves daily/weekly summaries and charts

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use expense_tracker::{
    count_expenses, router, AppState, LocalClock, ServerConfig, Store, SvgChartRenderer, VERSION,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::parse();
    tracing::info!(version = VERSION, "Expense Tracker - Web Server");

    // Schema is created once, idempotently
    config.ensure_database_dir()?;
    let store = Store::new(&config.database);
    store.init()?;
    let existing = store.with_connection(count_expenses)?;
    tracing::info!(path = %config.database.display(), expenses = existing, "Database ready");

    let state = AppState::new(
        store,
        Arc::new(SvgChartRenderer::new()),
        Arc::new(LocalClock),
    );
    let app = router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!(%addr, "Server running, press Ctrl+C to stop");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
