//! Detection server binary.
//!
use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use clap::Parser;
use detect_server::{
    annotate::Annotator,
    endpoints::router,
    nn::{Detector, YoloParams},
    pipeline::Pipeline,
    response::DEFAULT_JPEG_QUALITY,
    sensors::{parse_resolution, CameraSettings, V4lCamera},
};

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address to serve the HTTP API on
    #[clap(long, default_value = "0.0.0.0:8000")]
    server_address: String,

    /// Video device to capture frames from
    #[clap(long, default_value = "/dev/video0")]
    device: String,

    /// Pixel format requested from the camera (MJPG or RGB3)
    #[clap(long, default_value = "MJPG")]
    format: String,

    /// Capture resolution as <width>x<height>, the highest supported if omitted
    #[clap(long, value_parser = parse_resolution)]
    resolution: Option<(u32, u32)>,

    /// Capture frame rate, the highest supported if omitted
    #[clap(long, value_parser = clap::value_parser!(u32).range(1..))]
    frame_rate: Option<u32>,

    /// YOLO network in ONNX format
    #[clap(long, default_value = "yolov8n.onnx")]
    model_path: String,

    /// Side length of the square network input
    #[clap(long, default_value_t = 640)]
    input_size: u32,

    /// Minimum confidence of reported objects
    #[clap(long, default_value_t = 0.25)]
    confidence: f32,

    /// Maximum overlap of two objects of the same class
    #[clap(long, default_value_t = 0.7)]
    iou: f32,

    /// Maximum number of objects per frame
    #[clap(long, default_value_t = 300)]
    max_detections: usize,

    /// TrueType font for the labels of the annotated image
    #[clap(long, default_value = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf")]
    font_path: String,

    /// Quality of the annotated JPEG image
    #[clap(long, default_value_t = DEFAULT_JPEG_QUALITY)]
    jpeg_quality: i32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logger
    common::init_logger();

    let camera = V4lCamera::new(CameraSettings {
        device: args.device,
        format: args.format,
        resolution: args.resolution,
        frame_rate: args.frame_rate.map(|fps| (1, fps)),
    })?;

    // A missing model is reported per request and by the health check, not fatal
    let detector = Detector::load(
        &args.model_path,
        YoloParams {
            input_size: args.input_size,
            min_confidence: args.confidence,
            max_iou: args.iou,
            max_detections: args.max_detections,
        },
    );

    let annotator = Annotator::load(&args.font_path);

    let pipeline = Pipeline::new(Box::new(camera), detector, annotator)
        .with_jpeg_quality(args.jpeg_quality);

    // Serve HTTP server
    let addr: SocketAddr = args.server_address.parse()?;
    common::http::serve(router(Arc::new(pipeline)), addr).await
}
