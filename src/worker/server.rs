//! HTTP front end for a [`TaskProcessor`].
//!
//! - `POST /tasks`: process one [`TaskRequest`], reply with an [`Ack`] or a
//!   [`RemoteError`] naming the failed stage
//! - `GET /totals`: per-type totals so far
//! - `GET /healthz`

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State as AxumState;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{TaskProcessor, TypeTotal};
use crate::dispatch::{Ack, RemoteError, TaskRequest};
use crate::error::{Error, Result};

#[derive(Clone)]
struct AppState {
    processor: Arc<TaskProcessor>,
    shutdown: CancellationToken,
}

/// Build the worker router. `shutdown` cancels pending rate-limiter waits.
pub fn router(processor: Arc<TaskProcessor>, shutdown: CancellationToken) -> Router {
    Router::new()
        .route("/tasks", post(process_task))
        .route("/totals", get(totals))
        .route("/healthz", get(healthz))
        .with_state(AppState {
            processor,
            shutdown,
        })
}

/// Serve until `shutdown` is cancelled, then finish in-flight requests.
pub async fn serve(
    listener: TcpListener,
    processor: Arc<TaskProcessor>,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "worker listening");

    let app = router(processor, shutdown.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("worker stopped");
    Ok(())
}

async fn process_task(
    AxumState(state): AxumState<AppState>,
    Json(request): Json<TaskRequest>,
) -> Response {
    match state
        .processor
        .process_detached(request, &state.shutdown)
        .await
    {
        Ok(processed) => (StatusCode::OK, Json(Ack::processed(processed.id))).into_response(),
        Err(e) => {
            let status = match e.root() {
                Error::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                Error::NotFound(_) => StatusCode::NOT_FOUND,
                Error::InvalidTransition { .. } => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let body = RemoteError {
                error: e.to_string(),
                stage: e.stage(),
            };
            (status, Json(body)).into_response()
        }
    }
}

async fn totals(AxumState(state): AxumState<AppState>) -> Json<BTreeMap<i32, TypeTotal>> {
    Json(state.processor.totals().snapshot())
}

async fn healthz() -> &'static str {
    "ok"
}
