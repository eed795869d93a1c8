use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use crate::config::Config;
use crate::server::ContentServer;

async fn test_server() -> (Arc<ContentServer>, Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.storage.database_path = dir.path().join("test.db");
    config.storage.blob_dir = dir.path().join("blobs");
    config.api.enabled = false;

    let server = Arc::new(ContentServer::new(config).await.unwrap());
    let router = super::create_router(server.clone());
    (server, router, dir)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn authed_token(server: &ContentServer) -> String {
    server.register_device("kindle-1", None, "hunter2").await.unwrap();
    server.coordinator.authenticate("kindle-1", "hunter2").await.unwrap()
}

#[tokio::test]
async fn test_auth_endpoint_mints_token() {
    let (server, router, _dir) = test_server().await;
    server.register_device("kindle-1", None, "hunter2").await.unwrap();

    let response = router
        .oneshot(post_json(
            "/api/v1/auth/device",
            json!({"device_id": "kindle-1", "secret": "hunter2"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["token"].as_str().unwrap().len(), 32);
    assert!(body["expires_in_secs"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_auth_endpoint_rejects_bad_secret() {
    let (server, router, _dir) = test_server().await;
    server.register_device("kindle-1", None, "hunter2").await.unwrap();

    let response = router
        .oneshot(post_json(
            "/api/v1/auth/device",
            json!({"device_id": "kindle-1", "secret": "wrong"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "auth_error");
}

#[tokio::test]
async fn test_content_requires_session() {
    let (_server, router, _dir) = test_server().await;

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/v1/content")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_download_and_report_flow() {
    let (server, router, _dir) = test_server().await;
    let token = authed_token(&server).await;
    let book_id = server.add_book("Dune", None, b"epub bytes").await.unwrap();

    // List shows the book
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/content")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listing = body_json(response).await;
    assert_eq!(listing.as_array().unwrap().len(), 1);
    assert_eq!(listing[0]["artifact_id"], book_id.0);

    // Download streams the bytes
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/content/{}/download", book_id.0))
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"epub bytes");

    // A second download while in flight conflicts
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/content/{}/download", book_id.0))
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Report success
    let mut request = post_json(
        &format!("/api/v1/content/{}/status", book_id.0),
        json!({"outcome": "success"}),
    );
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {token}").parse().unwrap(),
    );
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["state"], "delivered");

    // Delivered: gone from the listing
    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/v1/content")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let listing = body_json(response).await;
    assert!(listing.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_download_unknown_artifact_is_404() {
    let (server, router, _dir) = test_server().await;
    let token = authed_token(&server).await;

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/v1/content/999/download")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_server, router, _dir) = test_server().await;

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["artifacts"], 0);
}

#[tokio::test]
async fn test_openapi_spec_served() {
    let (_server, router, _dir) = test_server().await;

    let response = router
        .oneshot(
            Request::builder()
                .uri("/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["paths"]["/api/v1/content"].is_object());
}

#[tokio::test]
async fn test_swagger_ui_spec_route_served() {
    // Swagger UI is on by default and registers /api/v1/openapi.json itself;
    // the router must construct cleanly and serve the spec from both paths.
    let (_server, router, _dir) = test_server().await;

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/v1/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["paths"]["/api/v1/content"].is_object());
}
