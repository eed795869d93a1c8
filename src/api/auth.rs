//! Session authentication middleware
//!
//! Protected routes require a `Authorization: Bearer <token>` header carrying
//! a session token minted by the auth endpoint. The middleware resolves the
//! token to a device id and attaches it to the request.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::api::AppState;
use crate::error::{DeliveryError, Error};

/// The authenticated device, attached to requests by [`require_session`]
#[derive(Debug, Clone)]
pub struct AuthedDevice(pub String);

/// Reject requests without a valid session token
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Error> {
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(Error::Delivery(DeliveryError::InvalidSession))?;

    let device_id = state.server.coordinator.resolve_session(token).await?;

    request.extensions_mut().insert(AuthedDevice(device_id));
    Ok(next.run(request).await)
}
