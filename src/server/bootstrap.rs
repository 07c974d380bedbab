use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::board::Board;
use crate::config::ServerConfig;

use super::background::spawn_reset_job;
use super::routes::MemoryScrambleServer;

const LOG_TARGET: &str = "server::bootstrap";

pub async fn run_server(config: ServerConfig, board: Arc<Board>) -> Result<()> {
    let shutdown = CancellationToken::new();

    let reset_job = spawn_reset_job(Arc::clone(&board), config.reset_interval, shutdown.clone());

    let server = MemoryScrambleServer::new(Arc::clone(&board));
    let router = server.into_router();

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let local_addr = listener.local_addr()?;
    info!(target: LOG_TARGET, %local_addr, "memory scramble server listening");

    let result = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error");

    shutdown.cancel();
    if let Some(job) = reset_job {
        let _ = job.await;
    }

    result
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target: LOG_TARGET, error = %err, "failed to install ctrl-c handler");
    }
    info!(target: LOG_TARGET, "shutdown signal received");
}
