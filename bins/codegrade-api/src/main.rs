mod handlers;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use axum::Router;
use codegrade_common::config::Settings;
use codegrade_engine::{CancellationToken, Evaluator};
use metrics::Metrics;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub struct AppState {
    pub evaluator: Evaluator,
    pub metrics: Metrics,
    /// Fired on shutdown; running evaluations stop between test cases
    pub shutdown: CancellationToken,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if std::env::var("CODEGRADE_LOG_FORMAT").as_deref() == Ok("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        return;
    }
    info!("Shutdown requested, cancelling in-flight evaluations");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("CodeGrade API booting...");

    let settings = Settings::from_env().context("Invalid configuration")?;
    let evaluator = Evaluator::from_settings(&settings)?;
    let metrics = Metrics::new().context("Failed to register metrics")?;
    let shutdown = CancellationToken::new();

    let state = Arc::new(AppState {
        evaluator,
        metrics,
        shutdown: shutdown.clone(),
    });

    let app = Router::new().merge(routes::routes()).with_state(state);

    let listener = TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.bind_addr))?;

    info!(addr = %settings.bind_addr, "HTTP server listening");
    info!("Ready to accept submissions");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}
