use std::sync::Arc;

use axum::extract::{Path, State};
use axum::middleware;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::board::Board;

use super::error::ApiError;

/// Shared state handed to every handler. Holding it behind `Arc` lets the
/// background reset job and the HTTP router share the same board.
pub struct ServerContext {
    pub board: Arc<Board>,
}

pub struct MemoryScrambleServer {
    router: Router,
}

impl MemoryScrambleServer {
    pub fn new(board: Arc<Board>) -> Self {
        let context = Arc::new(ServerContext { board });

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let router = Router::new()
            .route("/look/:viewer_id", get(look))
            .route("/flip/:viewer_id/:row/:col", get(flip))
            .route("/replace/:viewer_id/:from/:to", get(replace))
            .route("/watch/:viewer_id", get(watch))
            .route("/health", get(health))
            .layer(middleware::from_fn(super::logging::log_requests))
            .layer(cors)
            .with_state(context);

        Self { router }
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

async fn look(
    State(ctx): State<Arc<ServerContext>>,
    Path(viewer_id): Path<String>,
) -> Result<String, ApiError> {
    Ok(ctx.board.view(&viewer_id).await?)
}

async fn flip(
    State(ctx): State<Arc<ServerContext>>,
    Path((viewer_id, row, col)): Path<(String, usize, usize)>,
) -> Result<String, ApiError> {
    ctx.board.flip(&viewer_id, row, col).await?;
    Ok(ctx.board.view(&viewer_id).await?)
}

async fn replace(
    State(ctx): State<Arc<ServerContext>>,
    Path((viewer_id, from, to)): Path<(String, String, String)>,
) -> Result<String, ApiError> {
    ctx.board
        .map(move |token| {
            let from = from.clone();
            let to = to.clone();
            async move {
                if token == from {
                    Some(to)
                } else {
                    Some(token)
                }
            }
        })
        .await?;
    Ok(ctx.board.view(&viewer_id).await?)
}

async fn watch(
    State(ctx): State<Arc<ServerContext>>,
    Path(viewer_id): Path<String>,
) -> Result<String, ApiError> {
    Ok(ctx.board.watch(&viewer_id).await?)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    rows: usize,
    cols: usize,
}

async fn health(State(ctx): State<Arc<ServerContext>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        rows: ctx.board.rows(),
        cols: ctx.board.cols(),
    })
}
