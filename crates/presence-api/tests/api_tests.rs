//! API integration tests.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use presence_api::{create_router, ApiConfig, AppState};
use presence_models::BackendKind;
use presence_vision::{
    BackendBuilder, BackendError, BackendHandle, DecodeError, DecodedImage, DetectionBackend,
    DetectionService, ImageDecoder, RasterDecoder, RawDetection, RawRegion, ResultNormalizer,
    UploadedImage,
};
use serde_json::{json, Value};
use tower::ServiceExt;

const BOUNDARY: &str = "presence-test-boundary";

/// Backend returning a fixed set of detections.
struct FixedBackend(Vec<RawDetection>);

#[async_trait]
impl DetectionBackend for FixedBackend {
    async fn detect(&self, _image: DecodedImage) -> Result<Vec<RawDetection>, BackendError> {
        Ok(self.0.clone())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Neural
    }
}

/// Cloud-like backend whose first call fails with a network error.
struct FlakyCloud {
    calls: AtomicUsize,
}

#[async_trait]
impl DetectionBackend for FlakyCloud {
    async fn detect(&self, _image: DecodedImage) -> Result<Vec<RawDetection>, BackendError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(BackendError::transient("cloud", "dns error: vision.googleapis.com"));
        }
        Ok(vec![RawDetection::new(
            "Person",
            0.66,
            RawRegion::NormalizedPolygon {
                vertices: vec![(0.25, 0.25), (0.75, 0.25), (0.75, 0.75), (0.25, 0.75)],
            },
        )])
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Cloud
    }
}

/// Decoder that counts calls before delegating.
#[derive(Default)]
struct CountingDecoder {
    calls: Arc<AtomicUsize>,
    inner: RasterDecoder,
}

impl ImageDecoder for CountingDecoder {
    fn decode(&self, upload: &UploadedImage) -> Result<DecodedImage, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.decode(upload)
    }
}

fn router_with(backend: BackendHandle) -> Router {
    let service = DetectionService::new(
        Arc::new(RasterDecoder::default()),
        backend,
        ResultNormalizer::default(),
        4,
    );
    create_router(AppState::new(ApiConfig::default(), service), None)
}

fn png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb(color));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageOutputFormat::Png).unwrap();
    out.into_inner()
}

/// Build a multipart body with one file field.
fn multipart_body(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

/// Test health endpoint.
#[tokio::test]
async fn test_health_endpoint() {
    let app = router_with(BackendHandle::ready(Arc::new(FixedBackend(vec![]))));

    let (status, body) = send(
        app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_ready_reflects_backend_availability() {
    let ready = router_with(BackendHandle::ready(Arc::new(FixedBackend(vec![]))));
    let (status, body) = send(
        ready,
        Request::builder().uri("/ready").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["backend"]["name"], "neural");

    let unavailable = router_with(BackendHandle::unavailable(BackendKind::Cloud, "no credentials"));
    let (status, body) = send(
        unavailable,
        Request::builder().uri("/ready").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["checks"]["backend"]["error"], "Detection backend failed to load.");
    assert!(!body.to_string().contains("no credentials"));
}

/// Metrics route is absent when no handle is installed.
#[tokio::test]
async fn test_metrics_endpoint_disabled() {
    let app = router_with(BackendHandle::ready(Arc::new(FixedBackend(vec![]))));

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_index_page() {
    let app = router_with(BackendHandle::ready(Arc::new(FixedBackend(vec![]))));

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("name=\"image\""));
}

#[tokio::test]
async fn test_missing_image_field() {
    let app = router_with(BackendHandle::ready(Arc::new(FixedBackend(vec![]))));
    let body = multipart_body("file", "a.png", "image/png", &png(4, 4, [0, 0, 0]));

    let (status, body) = send(app, upload_request("/api/detect", body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "No image file provided."}));
}

#[tokio::test]
async fn test_text_field_named_image_is_not_a_file() {
    let app = router_with(BackendHandle::ready(Arc::new(FixedBackend(vec![]))));
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"image\"\r\n\r\nhello\r\n--{b}--\r\n",
        b = BOUNDARY
    );

    let (status, body) = send(app, upload_request("/api/detect", body.into_bytes())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "No image file provided."}));
}

#[tokio::test]
async fn test_oversized_upload_rejected() {
    let config = ApiConfig {
        max_body_size: 1024,
        ..ApiConfig::default()
    };
    let service = DetectionService::new(
        Arc::new(RasterDecoder::default()),
        BackendHandle::ready(Arc::new(FixedBackend(vec![]))),
        ResultNormalizer::default(),
        1,
    );
    let app = create_router(AppState::new(config, service), None);

    let body = multipart_body("image", "big.png", "image/png", &vec![0u8; 8 * 1024]);
    let mut request = upload_request("/api/detect", body.clone());
    request
        .headers_mut()
        .insert("Content-Length", body.len().to_string().parse().unwrap());

    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body, json!({"error": "Upload exceeds the size limit."}));
}

#[tokio::test]
async fn test_non_multipart_request() {
    let app = router_with(BackendHandle::ready(Arc::new(FixedBackend(vec![]))));
    let request = Request::builder()
        .method("POST")
        .uri("/api/detect")
        .header("Content-Type", "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No image file provided.");
}

#[tokio::test]
async fn test_empty_file() {
    let app = router_with(BackendHandle::ready(Arc::new(FixedBackend(vec![]))));
    let body = multipart_body("image", "empty.png", "image/png", &[]);

    let (status, body) = send(app, upload_request("/api/detect", body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "No selected file."}));
}

#[tokio::test]
async fn test_empty_filename() {
    let app = router_with(BackendHandle::ready(Arc::new(FixedBackend(vec![]))));
    let body = multipart_body("image", "", "image/png", &png(4, 4, [0, 0, 0]));

    let (status, body) = send(app, upload_request("/api/detect", body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No selected file.");
}

#[tokio::test]
async fn test_invalid_image() {
    let app = router_with(BackendHandle::ready(Arc::new(FixedBackend(vec![]))));
    let body = multipart_body("image", "notes.png", "image/png", b"this is not a png");

    let (status, body) = send(app, upload_request("/api/detect", body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Uploaded file is not a valid image."}));
}

#[tokio::test]
async fn test_unavailable_backend_never_decodes() {
    let decoder = CountingDecoder::default();
    let calls = Arc::clone(&decoder.calls);
    let service = DetectionService::new(
        Arc::new(decoder),
        BackendHandle::unavailable(BackendKind::Cloud, "GOOGLE_APPLICATION_CREDENTIALS not set"),
        ResultNormalizer::default(),
        4,
    );
    let app = create_router(AppState::new(ApiConfig::default(), service), None);

    for _ in 0..3 {
        let body = multipart_body("image", "a.png", "image/png", &png(8, 8, [0, 0, 0]));
        let (status, body) = send(app.clone(), upload_request("/api/detect", body)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, json!({"error": "Cloud Vision service is unavailable."}));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_detection_filters_and_counts() {
    let raw = vec![
        RawDetection::new(
            "Person",
            0.91,
            RawRegion::PixelCorners { x_min: 1.2, y_min: 2.0, x_max: 10.0, y_max: 20.4 },
        ),
        RawDetection::new(
            "dog",
            0.88,
            RawRegion::PixelCorners { x_min: 0.0, y_min: 0.0, x_max: 5.0, y_max: 5.0 },
        ),
    ];
    let app = router_with(BackendHandle::ready(Arc::new(FixedBackend(raw))));
    let body = multipart_body("image", "street.png", "image/png", &png(32, 32, [40, 40, 40]));

    let (status, body) = send(app, upload_request("/api/detect", body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["person_detected"], true);
    assert_eq!(body["number_of_people"], 1);
    let detections = body["detections"].as_array().unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0]["class"], "Person");
    assert_eq!(detections[0]["bounding_box"], json!([1, 2, 10, 20]));
}

#[tokio::test]
async fn test_predict_alias() {
    let app = router_with(BackendHandle::ready(Arc::new(FixedBackend(vec![]))));
    let body = multipart_body("image", "a.png", "image/png", &png(4, 4, [0, 0, 0]));

    let (status, body) = send(app, upload_request("/api/predict", body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"person_detected": false, "number_of_people": 0, "detections": []})
    );
}

#[tokio::test]
async fn test_backend_failure_is_generic_and_recoverable() {
    let app = router_with(BackendHandle::ready(Arc::new(FlakyCloud {
        calls: AtomicUsize::new(0),
    })));

    let body = multipart_body("image", "a.png", "image/png", &png(100, 100, [0, 0, 0]));
    let (status, first) = send(app.clone(), upload_request("/api/detect", body)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(first, json!({"error": "An error occurred during detection."}));

    let body = multipart_body("image", "a.png", "image/png", &png(100, 100, [0, 0, 0]));
    let (status, second) = send(app, upload_request("/api/detect", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["number_of_people"], 1);
    assert_eq!(second["detections"][0]["bounding_box"], json!([25, 25, 75, 75]));
}

/// Black image on the HOG backend yields an empty result.
#[tokio::test]
async fn test_black_image_on_classical_backend() {
    let handle = BackendBuilder::for_kind(BackendKind::Classical).build();
    if !handle.is_ready() {
        eprintln!("skipping: classical backend unavailable in this build");
        return;
    }
    let app = router_with(handle);
    let body = multipart_body("image", "black.png", "image/png", &png(100, 100, [0, 0, 0]));

    let (status, body) = send(app, upload_request("/api/detect", body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"person_detected": false, "number_of_people": 0, "detections": []})
    );
}

#[tokio::test]
async fn test_security_headers_and_request_id() {
    let app = router_with(BackendHandle::ready(Arc::new(FixedBackend(vec![]))));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("X-Request-ID", "abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["X-Request-ID"], "abc-123");
    assert_eq!(response.headers()["X-Content-Type-Options"], "nosniff");
}

#[tokio::test]
async fn test_rate_limiting() {
    let config = ApiConfig {
        rate_limit_rps: 1,
        rate_limit_burst: 1,
        ..ApiConfig::default()
    };
    let service = DetectionService::new(
        Arc::new(RasterDecoder::default()),
        BackendHandle::ready(Arc::new(FixedBackend(vec![]))),
        ResultNormalizer::default(),
        1,
    );
    let app = create_router(AppState::new(config, service), None);

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let body = multipart_body("image", "a.png", "image/png", &png(4, 4, [0, 0, 0]));
        let mut request = upload_request("/api/detect", body);
        request
            .headers_mut()
            .insert("X-Forwarded-For", "192.168.1.100".parse().unwrap());
        let (status, _) = send(app.clone(), request).await;
        statuses.push(status);
    }

    assert_eq!(statuses[0], StatusCode::OK);
    assert!(statuses.contains(&StatusCode::TOO_MANY_REQUESTS));
}
