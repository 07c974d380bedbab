use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::board::Board;
use crate::tokio_tools::spawn_named_task;

const LOG_TARGET: &str = "server::background";

/// Spawns the periodic board-reset job. Calling the Board's own `reset()`
/// is its only contract with the core; a `None` interval means the board
/// never auto-resets.
pub fn spawn_reset_job(
    board: Arc<Board>,
    interval: Option<Duration>,
    shutdown: CancellationToken,
) -> Option<tokio::task::JoinHandle<()>> {
    let interval = interval?;

    Some(spawn_named_task("board-reset", async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::info!(target: LOG_TARGET, "resetting board on schedule");
                    board.reset().await;
                }
                _ = shutdown.cancelled() => {
                    tracing::info!(target: LOG_TARGET, "reset job shutting down");
                    break;
                }
            }
        }
    }))
}
