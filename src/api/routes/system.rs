//! System handlers: health, OpenAPI, events.

use axum::{
    Json,
    extract::State,
    response::{
        IntoResponse,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use serde_json::json;
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::api::AppState;
use crate::error::Error;
use crate::types::SyncState;

/// GET /health - Health check with aggregation and delivery counters
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy")
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let db = &state.server.db;

    let pending_candidates = db.count_candidates_with_status(0).await?;
    let in_flight = db.count_sync_logs_with_state(SyncState::InFlight).await?;
    let delivered = db.count_sync_logs_with_state(SyncState::Delivered).await?;
    let artifacts = db.list_artifacts().await?.len();

    let sources: Vec<_> = db
        .list_source_states()
        .await?
        .into_iter()
        .map(|s| {
            json!({
                "source_id": s.source_id,
                "last_fetch_at": s.last_fetch_at,
                "error_count": s.error_count,
                "last_error": s.last_error,
            })
        })
        .collect();

    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "artifacts": artifacts,
        "pending_candidates": pending_candidates,
        "deliveries_in_flight": in_flight,
        "deliveries_completed": delivered,
        "sources": sources,
    })))
}

/// GET /openapi.json - OpenAPI specification
#[utoipa::path(
    get,
    path = "/openapi.json",
    tag = "system",
    responses(
        (status = 200, description = "OpenAPI specification in JSON format")
    )
)]
pub async fn openapi_spec() -> impl IntoResponse {
    use crate::api::openapi::ApiDoc;
    use utoipa::OpenApi;

    Json(ApiDoc::openapi())
}

/// GET /events - Server-sent events stream of lifecycle events
#[utoipa::path(
    get,
    path = "/api/v1/events",
    tag = "system",
    responses(
        (status = 200, description = "Server-sent events stream (text/event-stream)", content_type = "text/event-stream")
    )
)]
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = state.server.subscribe();
    let stream = BroadcastStream::new(receiver).filter_map(|event| {
        let event = event.ok()?;
        let data = serde_json::to_string(&event).ok()?;
        Some(Ok(SseEvent::default().data(data)))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
