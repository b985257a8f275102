//! Wire contract for the submission endpoint, driven through the router.

mod common;

use std::io::Write;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tower::ServiceExt;

use common::{engine_with, seeded_store, submission, ScriptedPlatform, TEST_BUNDLE};
use iap_sentry::server::AppState;

async fn app() -> axum::Router {
    let (store, _game) = seeded_store().await;
    let engine = engine_with(&store, Arc::new(ScriptedPlatform::valid(TEST_BUNDLE)));
    let state = AppState {
        tenants: store,
        engine,
    };
    iap_sentry::api::router().with_state(state)
}

fn verify_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/verify")
        .body(body.into())
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn well_formed_submission_is_acknowledged_with_ok() {
    let app = app().await;
    let payload = submission("X1", "U1").raw.to_string();

    let response = app.oneshot(verify_request(payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "OK");
}

#[tokio::test]
async fn zlib_compressed_submission_is_accepted() {
    let app = app().await;
    let payload = submission("X1", "U1").raw.to_string();
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload.as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();

    let response = app.oneshot(verify_request(compressed)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "OK");
}

#[tokio::test]
async fn unknown_game_secret_is_rejected() {
    let app = app().await;
    let mut payload = submission("X1", "U1").raw;
    payload["game_secret"] = serde_json::json!("not a secret");

    let response = app
        .oneshot(verify_request(payload.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(response).await, "invalid game");
}

#[tokio::test]
async fn forged_server_owned_field_is_rejected() {
    let app = app().await;
    let mut payload = submission("X1", "U1").raw;
    payload["cheat_kind"] = serde_json::json!(5);

    let response = app
        .oneshot(verify_request(payload.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn garbage_body_is_rejected_as_invalid_json() {
    let app = app().await;

    let response = app
        .oneshot(verify_request(&b"not json at all"[..]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(response).await, "invalid json");
}
