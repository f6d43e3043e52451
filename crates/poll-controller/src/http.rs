//! Read-only inspection API.
//!
//! A pass-through projection of the data model: session detail, live
//! results, question history and aggregate stats. Nothing here mutates
//! state or adds invariants; handlers resolve the session and forward one
//! query message.

use crate::actors::SessionRegistryActorHandle;
use crate::errors::PcError;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

/// Error payload returned to API clients.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: i32,
    message: String,
}

/// Map a core error to an HTTP response without leaking internals.
fn error_response(err: &PcError) -> Response {
    let status = match err.error_code() {
        1 => StatusCode::BAD_REQUEST,
        4 => StatusCode::NOT_FOUND,
        5 => StatusCode::CONFLICT,
        7 => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ErrorBody {
            code: err.error_code(),
            message: err.client_message(),
        }),
    )
        .into_response()
}

/// Create the inspection API router.
///
/// # Endpoints
///
/// - `GET /sessions/{id}` - Session detail (status, participants, question)
/// - `GET /sessions/{id}/results` - Live aggregation of the open question
/// - `GET /sessions/{id}/history` - Closed-question snapshots, oldest first
/// - `GET /stats` - Aggregate counts across all sessions
pub fn api_router(registry: SessionRegistryActorHandle) -> Router {
    Router::new()
        .route("/sessions/:session_id", get(session_detail))
        .route("/sessions/:session_id/results", get(session_results))
        .route("/sessions/:session_id/history", get(session_history))
        .route("/stats", get(registry_stats))
        .with_state(registry)
}

async fn session_detail(
    State(registry): State<SessionRegistryActorHandle>,
    Path(session_id): Path<String>,
) -> Response {
    let handle = match registry.resolve(session_id).await {
        Ok(handle) => handle,
        Err(err) => return error_response(&err),
    };

    match handle.get_detail().await {
        Ok(detail) => Json(detail).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn session_results(
    State(registry): State<SessionRegistryActorHandle>,
    Path(session_id): Path<String>,
) -> Response {
    let handle = match registry.resolve(session_id).await {
        Ok(handle) => handle,
        Err(err) => return error_response(&err),
    };

    match handle.get_results().await {
        Ok(results) => Json(results).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn session_history(
    State(registry): State<SessionRegistryActorHandle>,
    Path(session_id): Path<String>,
) -> Response {
    let handle = match registry.resolve(session_id).await {
        Ok(handle) => handle,
        Err(err) => return error_response(&err),
    };

    match handle.get_history().await {
        Ok(history) => Json(history).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn registry_stats(State(registry): State<SessionRegistryActorHandle>) -> Response {
    match registry.stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => error_response(&err),
    }
}
