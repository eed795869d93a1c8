//! Content listing, download, and status handlers.

use axum::{
    Extension, Json,
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use utoipa::ToSchema;

use crate::api::AppState;
use crate::api::auth::AuthedDevice;
use crate::error::Error;
use crate::types::{ArtifactId, AvailableArtifact, DeliveryOutcome};

/// GET /content - Artifacts available to the authenticated device
#[utoipa::path(
    get,
    path = "/api/v1/content",
    tag = "content",
    responses(
        (status = 200, description = "Available artifacts", body = [AvailableArtifact]),
        (status = 401, description = "Missing or expired session")
    ),
    security(("session_token" = []))
)]
pub async fn list_content(
    State(state): State<AppState>,
    Extension(device): Extension<AuthedDevice>,
) -> Result<Json<Vec<AvailableArtifact>>, Error> {
    let available = state.server.coordinator.list_available(&device.0).await?;
    Ok(Json(available))
}

/// GET /content/{id}/download - Claim the delivery and stream the artifact
///
/// Claiming transitions the (device, artifact) ledger row to IN_FLIGHT; the
/// device must follow up with a status report once the stream finishes.
#[utoipa::path(
    get,
    path = "/api/v1/content/{id}/download",
    tag = "content",
    params(
        ("id" = i64, Path, description = "Artifact id")
    ),
    responses(
        (status = 200, description = "Artifact bytes", content_type = "application/octet-stream"),
        (status = 401, description = "Missing or expired session"),
        (status = 404, description = "No such artifact"),
        (status = 409, description = "Delivery already in flight"),
        (status = 410, description = "Delivery abandoned"),
        (status = 429, description = "Failed delivery still backing off")
    ),
    security(("session_token" = []))
)]
pub async fn download_content(
    State(state): State<AppState>,
    Extension(device): Extension<AuthedDevice>,
    Path(id): Path<i64>,
) -> Result<Response, Error> {
    let stream = state
        .server
        .coordinator
        .begin_delivery(&device.0, ArtifactId(id))
        .await?;

    let filename = sanitize_filename(&stream.artifact.title);
    let body = Body::from_stream(ReaderStream::new(stream.reader));

    let response = Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, stream.artifact.size_bytes)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(body)
        .map_err(|e| Error::ApiServerError(e.to_string()))?;

    Ok(response)
}

/// Reported delivery outcome payload
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum StatusRequest {
    /// The artifact arrived intact
    Success,
    /// The transfer failed
    Failure {
        /// What went wrong, from the device's point of view
        message: String,
    },
    /// The device gave up waiting
    Timeout,
}

/// Resulting delivery state
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    /// State after applying the outcome (delivered, failed, abandoned)
    pub state: String,
}

/// POST /content/{id}/status - Report the outcome of an in-flight delivery
#[utoipa::path(
    post,
    path = "/api/v1/content/{id}/status",
    tag = "content",
    params(
        ("id" = i64, Path, description = "Artifact id")
    ),
    request_body = StatusRequest,
    responses(
        (status = 200, description = "Outcome recorded", body = StatusResponse),
        (status = 401, description = "Missing or expired session"),
        (status = 404, description = "No delivery ledger row for this pair"),
        (status = 409, description = "Delivery is not in flight")
    ),
    security(("session_token" = []))
)]
pub async fn report_status(
    State(state): State<AppState>,
    Extension(device): Extension<AuthedDevice>,
    Path(id): Path<i64>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<StatusResponse>, Error> {
    let outcome = match request {
        StatusRequest::Success => DeliveryOutcome::Success,
        StatusRequest::Failure { message } => DeliveryOutcome::Failure { message },
        StatusRequest::Timeout => DeliveryOutcome::Timeout,
    };

    let state_after = state
        .server
        .coordinator
        .report_outcome(&device.0, ArtifactId(id), outcome)
        .await?;

    Ok(Json(StatusResponse {
        state: state_after.to_string(),
    }))
}

/// Keep artifact titles header-safe
fn sanitize_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.txt", cleaned.trim())
}
