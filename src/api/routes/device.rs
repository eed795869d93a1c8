//! Device authentication handler.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::AppState;
use crate::error::Error;

/// Device credential payload
#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthRequest {
    /// Registered device id
    pub device_id: String,
    /// Device secret
    pub secret: String,
}

/// Minted session token
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    /// Bearer token for subsequent requests
    pub token: String,
    /// Seconds until the token expires
    pub expires_in_secs: u64,
}

/// POST /auth/device - Authenticate a device and mint a session token
#[utoipa::path(
    post,
    path = "/api/v1/auth/device",
    tag = "auth",
    request_body = AuthRequest,
    responses(
        (status = 200, description = "Session token minted", body = AuthResponse),
        (status = 401, description = "Unknown device or bad secret")
    )
)]
pub async fn authenticate_device(
    State(state): State<AppState>,
    Json(request): Json<AuthRequest>,
) -> Result<Json<AuthResponse>, Error> {
    let token = state
        .server
        .coordinator
        .authenticate(&request.device_id, &request.secret)
        .await?;

    Ok(Json(AuthResponse {
        token,
        expires_in_secs: state.server.config.delivery.session_ttl.as_secs(),
    }))
}
