#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;
pub use waypost_api::config::{RedirectConfig, ServerConfig};
use waypost_api::router::build_app_router;
use waypost_api::state::AppState;
use waypost_core::geo::GeoResolver;
use waypost_core::redirect::RedirectType;
use waypost_core::transfer::MAX_IMPORT_BYTES;

pub const HOME_URL: &str = "https://example.com";

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default)
/// and a 30-second request timeout.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        trust_proxy_headers: false,
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        redirects: RedirectConfig {
            home_url: HOME_URL.to_string(),
            default_type: RedirectType::MovedPermanently,
            geoip_license_key: None,
            geoip_dir: PathBuf::from("data/geoip"),
            import_max_bytes: MAX_IMPORT_BYTES,
        },
    }
}

/// Build the full application router with the given database pool.
///
/// Uses the same builder as `main.rs` so integration tests exercise the
/// production middleware stack.
pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_with_geo(pool, None)
}

pub fn build_test_app_with_geo(pool: PgPool, geo: Option<Arc<dyn GeoResolver>>) -> Router {
    build_test_app_with(pool, test_config(), geo)
}

pub fn build_test_app_with(
    pool: PgPool,
    config: ServerConfig,
    geo: Option<Arc<dyn GeoResolver>>,
) -> Router {
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        geo,
    };
    build_app_router(state, &config)
}

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

async fn with_json(
    app: Router,
    method: Method,
    uri: &str,
    body: serde_json::Value,
) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    with_json(app, Method::POST, uri, body).await
}

pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    with_json(app, Method::PUT, uri, body).await
}

pub async fn delete_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    with_json(app, Method::DELETE, uri, body).await
}

/// POST a single multipart `file` field.
pub async fn post_file(
    app: Router,
    uri: &str,
    file_name: &str,
    content_type: &str,
    contents: &[u8],
) -> Response<Body> {
    let boundary = "waypost-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Create a redirect through the API and return its id.
pub async fn create(pool: &PgPool, body: serde_json::Value) -> i64 {
    let response = post_json(build_test_app(pool.clone()), "/api/v1/redirects", body).await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    body_json(response).await["data"]["id"].as_i64().unwrap()
}
