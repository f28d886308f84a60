//! Object detection on frames, backed by a YOLO network in ONNX format.
//!
use std::path::Path;

use anyhow::{ensure, Context, Result};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::{error::DetectError, sensors::Frame};

type NnModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Positive additive constant to avoid divide-by-zero.
const EPS: f32 = 1.0e-7;

/// Bounding box `[x_top_left, y_top_left, x_bottom_right, y_bottom_right]` in pixels.
pub type Bbox = [f32; 4];

/// One recognized object instance.
///
/// Values keep the precision of the network; rounding is up to the serializer.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: Bbox,
}

pub trait InferModel: Send + Sync {
    fn run(&self, input: &RgbImage) -> Result<Vec<Detection>>;
}

/// Tuning knobs of the YOLO post-processing.
#[derive(Clone, Debug)]
pub struct YoloParams {
    pub input_size: u32,
    pub min_confidence: f32,
    pub max_iou: f32,
    pub max_detections: usize,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            min_confidence: 0.25,
            max_iou: 0.7,
            max_detections: 300,
        }
    }
}

/// YOLOv8-style detector with an output of shape `[1, 4 + classes, candidates]`.
pub struct YoloModel {
    model: NnModel,
    params: YoloParams,
}

impl YoloModel {
    pub fn new(model_path: impl AsRef<Path>, params: YoloParams) -> Result<Self> {
        let model = get_yolo_model(model_path.as_ref(), params.input_size)?;
        Ok(Self { model, params })
    }

    fn preproc(&self, input: &RgbImage) -> Tensor {
        let size = self.params.input_size;
        let resized: RgbImage =
            image::imageops::resize(input, size, size, image::imageops::FilterType::Triangle);

        let tensor: Tensor = tract_ndarray::Array4::from_shape_fn(
            (1, 3, size as usize, size as usize),
            |(_, c, y, x)| resized[(x as _, y as _)][c] as f32 / 255.0,
        )
        .into();

        tensor
    }

    fn postproc(&self, raw_nn_out: &Tensor, width: u32, height: u32) -> Result<Vec<Detection>> {
        let output = raw_nn_out
            .to_array_view::<f32>()?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("expected a network output of rank 3")?;
        let predictions = orient_predictions(output.index_axis(tract_ndarray::Axis(0), 0));
        ensure!(
            predictions.nrows() > 4,
            "network output has {} rows, expected box coordinates and class scores",
            predictions.nrows()
        );

        let input_size = self.params.input_size as f32;
        let scale = (width as f32 / input_size, height as f32 / input_size);
        let candidates = decode_predictions(
            predictions,
            scale,
            (width as f32, height as f32),
            self.params.min_confidence,
        );
        log::debug!("{} candidates above confidence threshold", candidates.len());

        Ok(non_maximum_suppression(
            candidates,
            self.params.max_iou,
            self.params.max_detections,
        ))
    }
}

impl InferModel for YoloModel {
    fn run(&self, input: &RgbImage) -> Result<Vec<Detection>> {
        let (width, height) = input.dimensions();
        let raw_nn_out = self.model.run(tvec!(self.preproc(input).into()))?;
        let first: &Tensor = raw_nn_out
            .first()
            .context("network produced no outputs")?;

        self.postproc(first, width, height)
    }
}

fn get_yolo_model(filename: &Path, input_size: u32) -> Result<NnModel> {
    let size = input_size as usize;
    let input_fact = InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size));
    let model = tract_onnx::onnx()
        .model_for_path(filename)
        .with_context(|| format!("failed to load ONNX model from {}", filename.display()))?
        .with_input_fact(0, input_fact)?
        .into_optimized()
        .context("failed to optimize model")?
        .into_runnable()
        .context("failed to make model runnable")?;

    Ok(model)
}

/// Adapter around the model which was (or was not) loaded at startup.
pub struct Detector {
    model: Option<Box<dyn InferModel>>,
}

impl Detector {
    pub fn new(model: Option<Box<dyn InferModel>>) -> Self {
        Self { model }
    }

    /// Load the YOLO model once. A failure is logged and leaves the detector unavailable.
    pub fn load(model_path: impl AsRef<Path>, params: YoloParams) -> Self {
        let model_path = model_path.as_ref();
        match YoloModel::new(model_path, params) {
            Ok(model) => {
                log::info!("Loaded YOLO model {}", model_path.display());
                Self::new(Some(Box::new(model)))
            }
            Err(err) => {
                log::error!("Error loading YOLO model: {err:#}");
                Self::new(None)
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    pub fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
        let model = self.model.as_ref().ok_or(DetectError::ModelUnavailable)?;
        model
            .run(frame)
            .map_err(|err| DetectError::DetectionFailed(format!("{err:#}")))
    }
}

/// Rows of one prediction: box coordinates followed by one score per class.
const PREDICTION_ROWS: usize = 4 + COCO_CLASSES.len();

/// Lay out predictions as `[4 + classes, candidates]`.
///
/// Some exports emit `[candidates, 4 + classes]` instead, which is recognized by the number of
/// classes rather than by comparing the axis lengths.
fn orient_predictions(
    predictions: tract_ndarray::ArrayView2<'_, f32>,
) -> tract_ndarray::ArrayView2<'_, f32> {
    if predictions.nrows() != PREDICTION_ROWS && predictions.ncols() == PREDICTION_ROWS {
        predictions.reversed_axes()
    } else {
        predictions
    }
}

/// Turn raw predictions into candidate detections in frame coordinates.
///
/// Every column of `predictions` holds `cx, cy, w, h` in network input pixels followed by one
/// score per class. Candidates below `min_confidence` are dropped.
pub fn decode_predictions(
    predictions: tract_ndarray::ArrayView2<f32>,
    scale: (f32, f32),
    frame_size: (f32, f32),
    min_confidence: f32,
) -> Vec<Detection> {
    let (scale_x, scale_y) = scale;

    predictions
        .axis_iter(tract_ndarray::Axis(1))
        .filter_map(|candidate| {
            let (class_id, confidence) = candidate
                .iter()
                .skip(4)
                .copied()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (id, score)| {
                    if score > best.1 {
                        (id, score)
                    } else {
                        best
                    }
                });
            if !(confidence >= min_confidence) {
                return None;
            }

            let (cx, cy) = (candidate[0] * scale_x, candidate[1] * scale_y);
            let (half_w, half_h) = (candidate[2] * scale_x / 2.0, candidate[3] * scale_y / 2.0);
            let bbox = clip_bbox(
                [cx - half_w, cy - half_h, cx + half_w, cy + half_h],
                frame_size,
            );

            Some(Detection {
                label: class_label(class_id),
                class_id,
                confidence: confidence.min(1.0),
                bbox,
            })
        })
        .collect()
}

/// Run class-aware non-maximum-suppression on candidate detections.
///
/// Start with the most confident detection and iterate over all others in the order of sinking
/// confidence. A candidate is kept only if its IoU with every already selected detection of the
/// same class is at most `max_iou`. At most `max_detections` are returned, most confident first.
pub fn non_maximum_suppression(
    mut candidates: Vec<Detection>,
    max_iou: f32,
    max_detections: usize,
) -> Vec<Detection> {
    candidates.sort_by(|a, b| a.confidence.total_cmp(&b.confidence));

    let mut selected: Vec<Detection> = vec![];
    'candidates: while selected.len() < max_detections {
        // Get next most confident detection from the back of the ascending-sorted vector.
        let Some(candidate) = candidates.pop() else {
            break 'candidates;
        };

        for kept in selected.iter().filter(|kept| kept.class_id == candidate.class_id) {
            if iou(&candidate.bbox, &kept.bbox) > max_iou {
                continue 'candidates;
            }
        }

        selected.push(candidate);
    }

    selected
}

/// Calculate the intersection-over-union metric for two bounding boxes.
fn iou(bbox_a: &Bbox, bbox_b: &Bbox) -> f32 {
    // If the boxes do not overlap, the corner points of the overlap box are ill defined and its
    // area is zero.
    let overlap_box: Bbox = [
        f32::max(bbox_a[0], bbox_b[0]),
        f32::max(bbox_a[1], bbox_b[1]),
        f32::min(bbox_a[2], bbox_b[2]),
        f32::min(bbox_a[3], bbox_b[3]),
    ];

    let overlap_area = bbox_area(&overlap_box);

    // Avoid division-by-zero with `EPS`
    overlap_area / (bbox_area(bbox_a) + bbox_area(bbox_b) - overlap_area + EPS)
}

/// Calculate the area enclosed by a bounding box, zero if it is ill-defined.
fn bbox_area(bbox: &Bbox) -> f32 {
    let width = bbox[2] - bbox[0];
    let height = bbox[3] - bbox[1];
    if width < 0.0 || height < 0.0 {
        return 0.0;
    }

    width * height
}

/// Clip a bounding box to the frame so that `x1 <= x2` and `y1 <= y2` hold.
fn clip_bbox(bbox: Bbox, (width, height): (f32, f32)) -> Bbox {
    let x1 = bbox[0].clamp(0.0, width);
    let y1 = bbox[1].clamp(0.0, height);
    let x2 = bbox[2].clamp(x1, width);
    let y2 = bbox[3].clamp(y1, height);

    [x1, y1, x2, y2]
}

fn class_label(class_id: usize) -> String {
    COCO_CLASSES
        .get(class_id)
        .map(|label| label.to_string())
        .unwrap_or_else(|| format!("class_{class_id}"))
}

/// Class vocabulary of networks trained on COCO.
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];
