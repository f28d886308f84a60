//! Assembly of the JSON payload returned by the detect endpoint.
//!
use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize, Serializer};

use crate::{error::DetectError, nn::Detection, sensors::Frame};

/// Prefix turning base64 JPEG data into a data URI.
pub const DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// Default JPEG quality of the annotated image.
pub const DEFAULT_JPEG_QUALITY: i32 = 95;

#[derive(Debug, Deserialize, Serialize)]
pub struct DetectionResponse {
    pub timestamp: String,
    pub total_objects: usize,
    pub object_counts: BTreeMap<String, usize>,
    pub detections: Vec<DetectionEntry>,
    pub annotated_image: String,
}

/// A detection as it appears in the response.
#[derive(Debug, Deserialize, Serialize)]
pub struct DetectionEntry {
    #[serde(rename = "class")]
    pub label: String,
    #[serde(serialize_with = "round2")]
    pub confidence: f64,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BoundingBox {
    #[serde(serialize_with = "round2")]
    pub x1: f64,
    #[serde(serialize_with = "round2")]
    pub y1: f64,
    #[serde(serialize_with = "round2")]
    pub x2: f64,
    #[serde(serialize_with = "round2")]
    pub y2: f64,
}

impl From<&Detection> for DetectionEntry {
    fn from(detection: &Detection) -> Self {
        let [x1, y1, x2, y2] = detection.bbox.map(f64::from);
        Self {
            label: detection.label.clone(),
            confidence: f64::from(detection.confidence),
            bounding_box: BoundingBox { x1, y1, x2, y2 },
        }
    }
}

/// Round to two decimal places, exact halves to the even neighbour.
pub fn round2<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64((value * 100.0).round_ties_even() / 100.0)
}

/// Format a timestamp as ISO 8601 local time with microseconds.
pub fn format_timestamp(timestamp: &DateTime<Local>) -> String {
    timestamp
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Count the occurrences of each label. Labels which do not occur are absent.
pub fn count_objects(detections: &[Detection]) -> BTreeMap<String, usize> {
    let mut object_counts = BTreeMap::new();
    for detection in detections {
        *object_counts.entry(detection.label.clone()).or_insert(0) += 1;
    }

    object_counts
}

/// Encode a frame as JPEG and embed it into a data URI.
pub fn encode_data_uri(frame: &Frame, quality: i32) -> Result<String, DetectError> {
    let jpeg = turbojpeg::compress_image(frame, quality, turbojpeg::Subsamp::Sub2x2)
        .map_err(|err| DetectError::EncodingFailed(err.to_string()))?;

    Ok(format!("{DATA_URI_PREFIX}{}", STANDARD.encode(&jpeg[..])))
}

/// Build the response of one detect request.
pub fn assemble(
    timestamp: &DateTime<Local>,
    detections: &[Detection],
    annotated: &Frame,
    jpeg_quality: i32,
) -> Result<DetectionResponse, DetectError> {
    let object_counts = count_objects(detections);
    let annotated_image = encode_data_uri(annotated, jpeg_quality)?;

    Ok(DetectionResponse {
        timestamp: format_timestamp(timestamp),
        total_objects: detections.len(),
        object_counts,
        detections: detections.iter().map(DetectionEntry::from).collect(),
        annotated_image,
    })
}
