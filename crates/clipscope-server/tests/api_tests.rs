//! HTTP scenarios against the mock backend

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use clipscope_models::{mock::MockLoader, Backend, ModelsConfig, Workbench};
use clipscope_server::{build_app, AppState};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "clipscope-test-boundary";

/// Registry [a.pth, b.pth] with classes cat/dog and a zscl/DTD checkpoint
fn setup() -> (TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.pth"), "1.0").unwrap();
    std::fs::write(dir.path().join("b.pth"), "2.0").unwrap();
    std::fs::write(dir.path().join("classes.txt"), "cat\ndog").unwrap();

    let zscl = dir.path().join("models").join("zscl");
    std::fs::create_dir_all(&zscl).unwrap();
    std::fs::write(zscl.join("dtd_final.pth"), "0.5").unwrap();

    let dist = dir.path().join("frontend").join("dist");
    std::fs::create_dir_all(dist.join("assets")).unwrap();
    std::fs::write(dist.join("index.html"), "<html>clipscope</html>").unwrap();
    std::fs::write(dist.join("assets").join("app.js"), "console.log(1)").unwrap();

    let config = ModelsConfig {
        checkpoints: vec![dir.path().join("a.pth"), dir.path().join("b.pth")],
        models_root: dir.path().join("models"),
        class_names_path: dir.path().join("classes.txt"),
        ..ModelsConfig::default()
    };
    let workbench = Workbench::new(&config, Backend::mock(Arc::new(MockLoader::new()))).unwrap();
    let app = build_app(AppState::new(workbench, dir.path().join("frontend")));

    (dir, app)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_json(app: &Router, uri: &str, payload: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn upload(app: &Router, bytes: &[u8]) -> (StatusCode, Value) {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"photo.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn png_bytes() -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([120, 60, 30])));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_dir, app) = setup();
    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_predict_without_upload() {
    let (_dir, app) = setup();
    let (status, body) = get_json(&app, "/predict").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "No image uploaded yet" }));
}

#[tokio::test]
async fn test_upload_then_predict() {
    let (_dir, app) = setup();

    let (status, body) = upload(&app, &png_bytes()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));

    let (status, body) = get_json(&app, "/predict").await;
    assert_eq!(status, StatusCode::OK);

    let models = body.as_object().unwrap();
    assert_eq!(models.len(), 1);
    let scores = models["a.pth"].as_object().unwrap();
    assert_eq!(scores.len(), 2);
    assert!(scores.contains_key("a photo of a cat"));
    assert!(scores.contains_key("a photo of a dog"));

    let total: f64 = scores.values().map(|v| v.as_f64().unwrap()).sum();
    assert!((total - 1.0).abs() < 1e-4);
}

#[tokio::test]
async fn test_upload_rejects_non_image() {
    let (_dir, app) = setup();
    let (status, body) = upload(&app, b"plain text").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Failed to decode image"));
}

#[tokio::test]
async fn test_set_active_models() {
    let (_dir, app) = setup();

    let (status, body) = post_json(&app, "/setactivemodels", json!([1, 1, 0])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Expected array of length 2, got 3" }));

    let (status, body) = post_json(&app, "/setactivemodels", json!([1, "yes"])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Array must contain only 0 or 1 values" }));

    let (status, body) = post_json(&app, "/setactivemodels", json!([0, 1])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "active": [0, 1] }));

    let (status, body) = post_json(&app, "/setactivemodels", json!([true, 0.0])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "active": [1, 0] }));

    let (status, _) = post_json(&app, "/setactivemodels", json!([0, 1])).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = get_json(&app, "/getmodels").await;
    assert_eq!(body, json!({ "models": ["a.pth", "b.pth"], "active": [0, 1] }));
}

#[tokio::test]
async fn test_class_names_round_trip() {
    let (_dir, app) = setup();

    let (status, body) = post_json(&app, "/saveclassnames", json!({ "text": ["x", "y", "z"] })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));

    let (status, body) = get_json(&app, "/getclassnames").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["x", "y", "z"]));
}

#[tokio::test]
async fn test_malformed_body_is_json_error() {
    let (_dir, app) = setup();
    let (status, body) = post_json(&app, "/saveclassnames", json!({ "names": [] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_prompt_round_trip() {
    let (_dir, app) = setup();

    let (_, body) = get_json(&app, "/getprompt").await;
    assert_eq!(body, json!({ "prefix": "a photo of a", "suffix": "" }));

    let (status, _) = post_json(
        &app,
        "/saveprompt",
        json!({ "prefix": "a blurry photo of a", "suffix": "outdoors" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    upload(&app, &png_bytes()).await;
    let (_, body) = get_json(&app, "/predict").await;
    assert!(body["a.pth"]
        .as_object()
        .unwrap()
        .contains_key("a blurry photo of a cat outdoors"));
}

#[tokio::test]
async fn test_sequential_flow() {
    let (_dir, app) = setup();
    upload(&app, &png_bytes()).await;

    let (status, body) = post_json(
        &app,
        "/setsequentialmodels",
        json!({ "models": [
            { "datasetIndex": 0, "dataset": "Base Model/CLIP", "method": null },
            { "datasetIndex": 1, "dataset": "DTD", "method": "zscl" }
        ]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "status": "ok", "models": ["Base Model/CLIP", "zscl/dtd_final.pth"] })
    );

    let (status, body) = get_json(&app, "/predictsequential").await;
    assert_eq!(status, StatusCode::OK);
    let models = body.as_object().unwrap();
    assert_eq!(models.len(), 2);
    assert!(models.contains_key("Base Model/CLIP"));
    assert!(models.contains_key("zscl/dtd_final.pth"));
}

#[tokio::test]
async fn test_sequential_not_found() {
    let (_dir, app) = setup();

    let (status, body) = post_json(
        &app,
        "/setsequentialmodels",
        json!({ "models": [{ "datasetIndex": 4, "dataset": "Flowers", "method": "finetune" }] }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({ "error": "No checkpoint found for dataset Flowers with method finetune" })
    );
}

#[tokio::test]
async fn test_frontend_hosting() {
    let (_dir, app) = setup();

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"<html>clipscope</html>");

    let request = Request::builder().uri("/assets/app.js").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"console.log(1)");
}

#[tokio::test]
async fn test_metrics_without_recorder() {
    let (_dir, app) = setup();
    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
