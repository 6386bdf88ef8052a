//! Shared fixtures for router-level tests.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode},
};
use tower::ServiceExt;

use keepsake_blob::MemoryBlobStore;
use keepsake_db::Database;

use crate::middleware::TOKEN_HEADER;
use crate::{AppState, AppStateInner, PhotoPolicy, SessionIssuer, router};

pub const BOUNDARY: &str = "keepsake-test-boundary";

pub fn test_state() -> (AppState, MemoryBlobStore) {
    test_state_with(PhotoPolicy::default())
}

pub fn test_state_with(policy: PhotoPolicy) -> (AppState, MemoryBlobStore) {
    let blobs = MemoryBlobStore::new();
    let state = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        blobs: Arc::new(blobs.clone()),
        sessions: SessionIssuer::new("test-secret", None),
        photos: policy,
    });
    (state, blobs)
}

pub fn test_app(state: &AppState) -> Router {
    router(state.clone())
}

pub async fn send(app: &Router, req: Request<Body>) -> Response<Body> {
    app.clone().oneshot(req).await.unwrap()
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

pub fn authed(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(TOKEN_HEADER, token)
        .body(Body::empty())
        .unwrap()
}

/// Hand-built multipart body. `photos` are `(content type, contents)` pairs
/// sent as `photo` file parts.
pub fn multipart_body(
    title: Option<&str>,
    info: Option<&str>,
    photos: &[(&str, &str)],
) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in [("title", title), ("info", info)] {
        if let Some(value) = value {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
    }
    for (i, (content_type, data)) in photos.iter().enumerate() {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"photo\"; filename=\"p{i}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_request(method: &str, uri: &str, token: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(TOKEN_HEADER, token)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Register `username` and return a fresh token for it.
pub async fn signup(app: &Router, username: &str, password: &str) -> String {
    let creds = serde_json::json!({ "username": username, "password": password });

    let response = send(app, json_request("POST", "/register", creds.clone())).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = send(app, json_request("POST", "/login", creds)).await;
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await["token"].as_str().unwrap().to_string()
}

/// Create a memory through the API and return its JSON.
pub async fn create_memory(
    app: &Router,
    token: &str,
    title: &str,
    photos: &[(&str, &str)],
) -> serde_json::Value {
    let body = multipart_body(Some(title), Some("some info"), photos);
    let response = send(app, multipart_request("POST", "/secure/memory", token, body)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}
