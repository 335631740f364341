use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use virality_compare::{
    gemini::GeminiClient,
    image_lookup::{DEFAULT_IMAGE_LOOKUP_URL, ImageLookup},
    pipeline::ImagePipeline,
    store::{ImageRegistry, LocalFileStorage},
    web_api::{AppState, build_router},
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

struct TestApp {
    router: Router,
    _cache_dir: TempDir,
}

fn app(upstream: &MockServer) -> TestApp {
    let cache_dir = tempfile::tempdir().unwrap();
    let client = GeminiClient::new(upstream.uri(), "test-key");
    let lookup = ImageLookup::parse(DEFAULT_IMAGE_LOOKUP_URL).unwrap();
    let pipeline = ImagePipeline::new(client, lookup);
    let storage = LocalFileStorage::new(
        cache_dir.path().to_path_buf(),
        "http://localhost:5000/cache".to_string(),
    );
    let state = AppState {
        pipeline: Arc::new(pipeline),
        registry: Arc::new(ImageRegistry::new(storage)),
    };
    TestApp {
        router: build_router(state),
        _cache_dir: cache_dir,
    }
}

async fn mount_catalog(server: &MockServer, names: &[&str]) {
    let models: Vec<Value> = names
        .iter()
        .map(|name| {
            json!({
                "name": format!("models/{name}"),
                "displayName": name,
                "supportedGenerationMethods": ["generateContent"]
            })
        })
        .collect();
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": models })))
        .mount(server)
        .await;
}

async fn send_raw(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send_raw(router, request).await;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn missing_or_blank_prompt_is_bad_request() {
    let upstream = MockServer::start().await;
    let app = app(&upstream);

    for body in [json!({}), json!({ "prompt": "   " })] {
        let (status, body) = send(&app.router, post_json("/api/generate-image", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Prompt is required");
    }
    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn generate_image_returns_description_and_lookup_url() {
    let upstream = MockServer::start().await;
    mount_catalog(&upstream, &["gemini-pro", "gemini-1.5-flash-latest"]).await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash-latest:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [ { "content": { "parts": [ { "text": "A cat among tulips." } ] } } ]
        })))
        .mount(&upstream)
        .await;
    let app = app(&upstream);

    let (status, body) = send(
        &app.router,
        post_json("/api/generate-image", json!({ "prompt": "a cute cat playing in a garden" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["modelUsed"], "gemini-1.5-flash-latest");
    assert_eq!(body["description"], "A cat among tulips.");
    assert!(body["imageUrl"].as_str().unwrap().contains("?a+cute+cat&t="));
    assert_eq!(body["progress"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn exhausted_candidates_report_failure_with_fallback() {
    let upstream = MockServer::start().await;
    mount_catalog(&upstream, &["gemini-pro", "gemini-1.5-pro"]).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": { "code": 503, "message": "The model is overloaded." }
        })))
        .expect(2)
        .mount(&upstream)
        .await;
    let app = app(&upstream);

    let (status, body) = send(
        &app.router,
        post_json("/api/generate-image", json!({ "prompt": "mountain lake" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "MODEL_OVERLOADED");
    assert_eq!(body["retryable"], true);
    assert_eq!(body["fallback"]["modelUsed"], "fallback");
    assert_eq!(
        body["fallback"]["imageUrl"],
        "https://source.unsplash.com/512x512/?mountain+lake"
    );
    assert_eq!(
        body["fallback"]["description"],
        "AI generated concept for: mountain lake"
    );
}

#[tokio::test]
async fn empty_success_body_is_no_description() {
    let upstream = MockServer::start().await;
    mount_catalog(&upstream, &["gemini-pro"]).await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-pro:generateContent"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&upstream)
        .await;
    let app = app(&upstream);

    let (status, body) = send(
        &app.router,
        post_json("/api/generate-image", json!({ "prompt": "a cat" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "NO_DESCRIPTION_GENERATED");
}

#[tokio::test]
async fn no_models_is_service_unavailable() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&upstream)
        .await;
    let app = app(&upstream);

    let (status, body) = send(
        &app.router,
        post_json("/api/generate-image", json!({ "prompt": "sunset" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "NO_WORKING_MODEL");
    assert_eq!(body["progress"][0], "Generating..");

    let (status, body) = send(&app.router, get("/api/models")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], false);
    assert!(body["reason"].as_str().unwrap().contains("401"));
}

#[tokio::test]
async fn score_endpoint_respects_bounds() {
    let upstream = MockServer::start().await;
    let app = app(&upstream);

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/score",
            json!({
                "imageUrl": "blob:x",
                "prompt": "a cute cat playing in a garden",
                "aiGenerated": true
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let metrics = &body["metrics"];
    let engagement = metrics["engagement"].as_u64().unwrap();
    let shareability = metrics["shareability"].as_u64().unwrap();
    let appeal = metrics["appeal"].as_u64().unwrap();
    assert!((66..=91).contains(&engagement));
    assert!((64..=84).contains(&shareability));
    assert!((68..=95).contains(&appeal));
    let mean = (engagement + shareability + appeal) as f64 / 3.0;
    assert_eq!(body["total"].as_u64().unwrap(), mean.round() as u64);
}

#[tokio::test]
async fn saved_images_round_trip() {
    let upstream = MockServer::start().await;
    let app = app(&upstream);

    let first_url = "blob:http://localhost:5173/0b6e4c1e";
    let second_url = "https://example.com/photos/dog.jpg?size=large";
    let (status, first) = send(
        &app.router,
        post_json("/api/images", json!({ "url": first_url })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, second) = send(
        &app.router,
        post_json("/api/images", json!({ "url": second_url })),
    )
    .await;
    assert_ne!(first["id"], second["id"]);

    let (status, records) = send(&app.router, get("/api/images")).await;
    assert_eq!(status, StatusCode::OK);
    let urls: Vec<&str> = records
        .as_array()
        .unwrap()
        .iter()
        .map(|record| record["url"].as_str().unwrap())
        .collect();
    assert_eq!(urls, [first_url, second_url]);
    assert_eq!(records[0]["type"], "uploaded");
    assert_eq!(records[0]["prompt"], "user_uploaded");

    let id = second["id"].as_str().unwrap();
    let (status, record) = send(&app.router, get(&format!("/api/images/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["url"], second_url);

    let (status, _) = send(&app.router, get("/api/images/1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app.router,
        post_json("/api/images", json!({ "url": "ftp://x/y.png" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

fn png_bytes() -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(4, 3, image::Rgba([10, 120, 200, 255]));
    let mut output = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut std::io::Cursor::new(&mut output), image::ImageFormat::Png)
        .unwrap();
    output
}

fn multipart_upload(file: &[u8]) -> Request<Body> {
    let boundary = "virality-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"photo.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(file);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn upload_stores_file_registers_and_scores_it() {
    let upstream = MockServer::start().await;
    let app = app(&upstream);

    let (status, body) = send(&app.router, multipart_upload(&png_bytes())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["width"], 4);
    assert_eq!(body["height"], 3);
    let key = body["key"].as_str().unwrap();
    assert!(key.starts_with("uploads/") && key.ends_with(".png"));
    assert_eq!(
        body["url"],
        format!("http://localhost:5000/cache/{key}").as_str()
    );
    // "uploaded image": 2 words, not AI generated.
    let engagement = body["score"]["metrics"]["engagement"].as_u64().unwrap();
    assert!((43..=73).contains(&engagement));

    let (_, records) = send(&app.router, get("/api/images")).await;
    assert_eq!(records[0]["url"], body["url"]);

    let (_, uploads) = send(&app.router, get("/api/uploads")).await;
    assert_eq!(uploads[0]["key"], key);

    let (status, served) = send_raw(&app.router, get(&format!("/cache/{key}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(served, png_bytes());

    let (status, _) = send_raw(
        &app.router,
        get("/cache/registry/virality_app_images.json"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_rejects_non_images() {
    let upstream = MockServer::start().await;
    let app = app(&upstream);

    let (status, body) = send(&app.router, multipart_upload(b"%PDF-1.7 not an image")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "file is not a supported image");
}
