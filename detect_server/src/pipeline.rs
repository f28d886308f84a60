//! Capture, detect, annotate and assemble, plus the device status check.
//!
use std::time::Instant;

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::{
    annotate::Annotator,
    error::DetectError,
    nn::Detector,
    response::{self, DetectionResponse, DEFAULT_JPEG_QUALITY},
    sensors::FrameSource,
};

/// Result of a single device check.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

impl From<bool> for Status {
    fn from(ok: bool) -> Self {
        match ok {
            true => Status::Ok,
            false => Status::Error,
        }
    }
}

#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HealthStatus {
    pub camera: Status,
    pub model: Status,
}

/// Everything a detect request needs, built once at startup.
pub struct Pipeline {
    camera: Box<dyn FrameSource>,
    detector: Detector,
    annotator: Annotator,
    jpeg_quality: i32,
}

impl Pipeline {
    pub fn new(camera: Box<dyn FrameSource>, detector: Detector, annotator: Annotator) -> Self {
        Self {
            camera,
            detector,
            annotator,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// Override the default JPEG quality of the annotated image.
    pub fn with_jpeg_quality(mut self, quality: i32) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Capture one frame and build the detection response for it. Blocks on the camera.
    pub fn run(&self) -> Result<DetectionResponse, DetectError> {
        let start = Instant::now();

        let frame = self.camera.capture()?;
        let timestamp = Local::now();
        log::debug!("Image captured after {:?}", start.elapsed());

        let detections = self.detector.detect(&frame)?;
        log::debug!("Inference done after {:?}", start.elapsed());

        let annotated = self.annotator.annotate(&frame, &detections);
        log::debug!("Image annotated after {:?}", start.elapsed());

        let response = response::assemble(&timestamp, &detections, &annotated, self.jpeg_quality)?;
        log::info!(
            "Detected {} objects in {:?}: {:?}",
            response.total_objects,
            start.elapsed(),
            response.object_counts
        );

        Ok(response)
    }

    /// Open and release the camera. Blocks on the camera.
    pub fn camera_ok(&self) -> bool {
        self.camera.is_available()
    }

    pub fn model_ok(&self) -> bool {
        self.detector.is_ready()
    }
}
