//! OpenAPI documentation and schema generation
//!
//! Compile-time OpenAPI spec for the device protocol, served at
//! `/openapi.json` and browsable at `/swagger-ui`.

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};

/// OpenAPI documentation for the bookdrop REST API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "bookdrop REST API",
        version = "0.1.0",
        description = "Device-facing protocol for content listing, download, and delivery status tracking",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    paths(
        crate::api::routes::device::authenticate_device,
        crate::api::routes::content::list_content,
        crate::api::routes::content::download_content,
        crate::api::routes::content::report_status,
        crate::api::routes::system::health_check,
        crate::api::routes::system::openapi_spec,
        crate::api::routes::system::event_stream,
    ),
    components(schemas(
        crate::api::routes::device::AuthRequest,
        crate::api::routes::device::AuthResponse,
        crate::api::routes::content::StatusRequest,
        crate::api::routes::content::StatusResponse,
        crate::types::AvailableArtifact,
        crate::types::ArtifactKind,
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    modifiers(&SessionTokenSecurity),
    tags(
        (name = "auth", description = "Device authentication"),
        (name = "content", description = "Content listing and delivery"),
        (name = "system", description = "Health and observability")
    )
)]
pub struct ApiDoc;

/// Registers the bearer session token scheme referenced by protected paths
struct SessionTokenSecurity;

impl utoipa::Modify for SessionTokenSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session_token",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}
