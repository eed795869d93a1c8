//! REST API server module
//!
//! Serves the device-facing delivery protocol over HTTP, with OpenAPI
//! documentation and an optional Swagger UI.

use crate::error::{Error, Result};
use crate::server::ContentServer;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Auth
/// - `POST /api/v1/auth/device` - Authenticate and mint a session token
///
/// ## Content (session required)
/// - `GET  /api/v1/content` - List artifacts available to this device
/// - `GET  /api/v1/content/:id/download` - Claim a delivery and stream bytes
/// - `POST /api/v1/content/:id/status` - Report the delivery outcome
///
/// ## System
/// - `GET /api/v1/health` - Health check
/// - `GET /api/v1/events` - Server-sent events stream
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive documentation (if enabled; serves its
///   own spec copy at `/api/v1/openapi.json`)
pub fn create_router(server: Arc<ContentServer>) -> Router {
    let state = AppState::new(server.clone());

    // Routes behind the session middleware
    let protected = Router::new()
        .route("/content", get(routes::list_content))
        .route("/content/:id/download", get(routes::download_content))
        .route("/content/:id/status", post(routes::report_status))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    let api = Router::new()
        .route("/auth/device", post(routes::authenticate_device))
        .route("/health", get(routes::health_check))
        .route("/events", get(routes::event_stream))
        .merge(protected);

    // The spec lives at the top level; SwaggerUi registers its own copy at
    // /api/v1/openapi.json, so nesting ours there would collide with it.
    let router = Router::new()
        .nest("/api/v1", api)
        .route("/openapi.json", get(routes::openapi_spec));

    // Merge Swagger UI routes if enabled in config (before applying state)
    let router = if server.config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api/v1/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    router
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Start the API server on the configured bind address
///
/// Binds a TCP listener and serves the router until shutdown.
pub async fn run_api_server(server: Arc<ContentServer>) -> Result<()> {
    let address = format!(
        "{}:{}",
        server.config.api.bind_address, server.config.api.port
    );

    tracing::info!(address = %address, "Starting API server");

    let app = create_router(server);

    let listener = TcpListener::bind(&address).await.map_err(Error::Io)?;

    tracing::info!(address = %address, "API server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
