use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use anyhow::Result;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use detect_server::{
    annotate::Annotator,
    endpoints::router,
    error::DetectError,
    nn::{Detection, Detector, InferModel},
    pipeline::Pipeline,
    response::DATA_URI_PREFIX,
    sensors::{Frame, FrameSource},
};
use image::{Rgb, RgbImage};
use serde_json::Value;
use tower::ServiceExt;

/// Camera replacement which either hands out a fixed frame or fails to open.
struct FakeCamera {
    available: bool,
    captures: AtomicUsize,
}

impl FakeCamera {
    fn new(available: bool) -> Self {
        Self {
            available,
            captures: AtomicUsize::new(0),
        }
    }
}

impl FrameSource for FakeCamera {
    fn capture(&self) -> Result<Frame, DetectError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        match self.available {
            true => Ok(Frame::from_pixel(64, 48, Rgb([40, 40, 40]))),
            false => Err(DetectError::DeviceUnavailable("/dev/video0".into())),
        }
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

/// Camera handing out frames without any pixels.
struct EmptyCamera;

impl FrameSource for EmptyCamera {
    fn capture(&self) -> Result<Frame, DetectError> {
        Ok(Frame::new(0, 0))
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Camera whose availability check crashes.
struct PanickingCamera;

impl FrameSource for PanickingCamera {
    fn capture(&self) -> Result<Frame, DetectError> {
        Err(DetectError::CaptureFailed("no frame".into()))
    }

    fn is_available(&self) -> bool {
        panic!("driver exploded");
    }
}

/// Model replacement returning a fixed set of detections.
struct FakeModel(Vec<Detection>);

impl InferModel for FakeModel {
    fn run(&self, _input: &RgbImage) -> Result<Vec<Detection>> {
        Ok(self.0.clone())
    }
}

struct BrokenModel;

impl InferModel for BrokenModel {
    fn run(&self, _input: &RgbImage) -> Result<Vec<Detection>> {
        anyhow::bail!("tensor shape mismatch")
    }
}

fn detection(label: &str, class_id: usize, confidence: f32, bbox: [f32; 4]) -> Detection {
    Detection {
        label: label.into(),
        class_id,
        confidence,
        bbox,
    }
}

fn sample_detections() -> Vec<Detection> {
    vec![
        detection("person", 0, 0.8675, [1.234, 2.0, 30.5, 40.0]),
        detection("dog", 16, 0.51, [20.0, 10.0, 60.0, 47.0]),
        detection("person", 0, 0.3333, [0.0, 0.0, 10.0, 10.0]),
    ]
}

fn app(camera: impl FrameSource + 'static, model: Option<Box<dyn InferModel>>) -> Router {
    let pipeline = Pipeline::new(Box::new(camera), Detector::new(model), Annotator::new(None));
    router(Arc::new(pipeline))
}

async fn call(app: Router, method: &str, uri: &str) -> Result<(StatusCode, Value)> {
    let response = app
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty())?)
        .await?;
    let status = response.status();
    let body = hyper::body::to_bytes(response.into_body()).await?;

    Ok((status, serde_json::from_slice(&body)?))
}

#[tokio::test]
async fn test_root() -> Result<()> {
    let (status, body) = call(app(FakeCamera::new(true), None), "GET", "/").await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Raspberry Pi Object Detection API");
    assert_eq!(body["endpoint"], "/detect");

    Ok(())
}

#[tokio::test]
async fn test_detect_response() -> Result<()> {
    let model = FakeModel(sample_detections());
    let (status, body) = call(
        app(FakeCamera::new(true), Some(Box::new(model))),
        "POST",
        "/detect",
    )
    .await?;

    assert_eq!(status, StatusCode::OK);

    let detections = body["detections"].as_array().unwrap();
    let total = body["total_objects"].as_u64().unwrap();
    let counted: u64 = body["object_counts"]
        .as_object()
        .unwrap()
        .values()
        .map(|count| count.as_u64().unwrap())
        .sum();
    assert_eq!(total, 3);
    assert_eq!(detections.len() as u64, total);
    assert_eq!(counted, total);
    assert_eq!(body["object_counts"]["person"], 2);
    assert_eq!(body["object_counts"]["dog"], 1);

    // Detector order is kept, numbers are rounded to two decimals
    assert_eq!(detections[0]["class"], "person");
    assert_eq!(detections[0]["confidence"].as_f64(), Some(0.87));
    assert_eq!(detections[0]["bounding_box"]["x1"].as_f64(), Some(1.23));
    assert_eq!(detections[1]["class"], "dog");
    assert_eq!(detections[2]["confidence"].as_f64(), Some(0.33));

    let image = body["annotated_image"].as_str().unwrap();
    let encoded = image.strip_prefix(DATA_URI_PREFIX).unwrap();
    let jpeg = STANDARD.decode(encoded)?;
    let decoded: RgbImage = turbojpeg::decompress_image(&jpeg)?;
    assert_eq!(decoded.dimensions(), (64, 48));

    assert!(body["timestamp"].as_str().unwrap().contains('T'));

    Ok(())
}

#[tokio::test]
async fn test_detect_without_objects() -> Result<()> {
    let model = FakeModel(vec![]);
    let (status, body) = call(
        app(FakeCamera::new(true), Some(Box::new(model))),
        "POST",
        "/detect",
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_objects"], 0);
    assert_eq!(body["object_counts"], serde_json::json!({}));
    assert!(body["annotated_image"]
        .as_str()
        .unwrap()
        .starts_with(DATA_URI_PREFIX));

    Ok(())
}

#[tokio::test]
async fn test_detect_without_camera() -> Result<()> {
    let model = FakeModel(sample_detections());
    let (status, body) = call(
        app(FakeCamera::new(false), Some(Box::new(model))),
        "POST",
        "/detect",
    )
    .await?;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Could not open webcam"));
    assert!(body.get("detections").is_none());

    Ok(())
}

#[tokio::test]
async fn test_detect_without_model() -> Result<()> {
    let (status, body) = call(app(FakeCamera::new(true), None), "POST", "/detect").await?;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["detail"], "YOLO model not loaded");

    Ok(())
}

#[tokio::test]
async fn test_detect_with_failing_model() -> Result<()> {
    let (status, body) = call(
        app(FakeCamera::new(true), Some(Box::new(BrokenModel))),
        "POST",
        "/detect",
    )
    .await?;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("tensor shape mismatch"));

    Ok(())
}

#[tokio::test]
async fn test_every_request_captures_a_new_frame() -> Result<()> {
    let camera = Arc::new(FakeCamera::new(true));

    struct SharedCamera(Arc<FakeCamera>);
    impl FrameSource for SharedCamera {
        fn capture(&self) -> Result<Frame, DetectError> {
            self.0.capture()
        }
        fn is_available(&self) -> bool {
            self.0.is_available()
        }
    }

    let app = app(
        SharedCamera(Arc::clone(&camera)),
        Some(Box::new(FakeModel(vec![]))),
    );
    for _ in 0..3 {
        let (status, _) = call(app.clone(), "POST", "/detect").await?;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(camera.captures.load(Ordering::SeqCst), 3);

    Ok(())
}

#[tokio::test]
async fn test_health_all_ok() -> Result<()> {
    let model = FakeModel(vec![]);
    let (status, body) = call(
        app(FakeCamera::new(true), Some(Box::new(model))),
        "GET",
        "/health",
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"camera": "ok", "model": "ok"}));

    Ok(())
}

#[tokio::test]
async fn test_health_checks_are_independent() -> Result<()> {
    let (status, body) = call(app(FakeCamera::new(true), None), "GET", "/health").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"camera": "ok", "model": "error"}));

    let model = FakeModel(vec![]);
    let (status, body) = call(
        app(FakeCamera::new(false), Some(Box::new(model))),
        "GET",
        "/health",
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"camera": "error", "model": "ok"}));

    Ok(())
}

#[tokio::test]
async fn test_health_survives_crashing_camera_check() -> Result<()> {
    let model = FakeModel(vec![]);
    let (status, body) = call(
        app(PanickingCamera, Some(Box::new(model))),
        "GET",
        "/health",
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"camera": "error", "model": "ok"}));

    Ok(())
}

#[tokio::test]
async fn test_detect_encoding_failure() -> Result<()> {
    let model = FakeModel(sample_detections());
    let (status, body) = call(
        app(EmptyCamera, Some(Box::new(model))),
        "POST",
        "/detect",
    )
    .await?;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Could not encode image"));
    // No detections without an image
    assert!(body.get("detections").is_none());
    assert!(body.get("annotated_image").is_none());

    Ok(())
}

#[tokio::test]
async fn test_unknown_route_and_method() -> Result<()> {
    let app = app(FakeCamera::new(true), Some(Box::new(FakeModel(vec![]))));

    let (status, body) = call(app.clone(), "GET", "/detections").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, serde_json::json!({"detail": "Not Found"}));

    let (status, body) = call(app, "GET", "/detect").await?;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body, serde_json::json!({"detail": "Method Not Allowed"}));

    Ok(())
}
