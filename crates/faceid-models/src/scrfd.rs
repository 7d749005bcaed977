//! SCRFD face locator via ONNX Runtime.
//!
//! Letterboxes the probe to 640×640, decodes the score and distance maps of
//! the three stride levels, then suppresses overlapping boxes. Landmark
//! outputs are ignored; the engine only needs the box.

use std::path::Path;
use std::sync::Mutex;

use faceid_core::{BoundingBox, CapabilityError, FaceLocator};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
const SCRFD_REQUIRED_OUTPUTS: usize = 9;

/// Default minimum detector score for a candidate face.
pub const DEFAULT_DETECTOR_CONFIDENCE: f32 = 0.5;

#[derive(Error, Debug)]
pub enum ScrfdError {
    #[error("model file not found: {0} — download det_10g.onnx from insightface and place it in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("detector session lock poisoned")]
    SessionPoisoned,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Metadata for coordinate de-mapping after letterbox resize.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    new_w: usize,
    new_h: usize,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    /// Fit `width × height` inside a square of side `input`, centred.
    fn fit(width: usize, height: usize, input: usize) -> Self {
        let scale = (input as f32 / width as f32).min(input as f32 / height as f32);
        let new_w = ((width as f32 * scale).round() as usize).clamp(1, input);
        let new_h = ((height as f32 * scale).round() as usize).clamp(1, input);
        Self {
            scale,
            new_w,
            new_h,
            pad_x: (input - new_w) as f32 / 2.0,
            pad_y: (input - new_h) as f32 / 2.0,
        }
    }

    /// Map a point in letterboxed input space back to the source image.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Positions of the score and distance tensors for one stride level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrideOutputs {
    score: usize,
    bbox: usize,
}

/// SCRFD-based face locator.
pub struct ScrfdLocator {
    session: Mutex<Session>,
    /// One entry per stride in `SCRFD_STRIDES` order.
    stride_outputs: [StrideOutputs; 3],
    confidence_threshold: f32,
}

impl ScrfdLocator {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(
        model_path: &str,
        confidence_threshold: f32,
        intra_threads: usize,
    ) -> Result<Self, ScrfdError> {
        if !Path::new(model_path).exists() {
            return Err(ScrfdError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < SCRFD_REQUIRED_OUTPUTS {
            return Err(ScrfdError::InferenceFailed(format!(
                "expected {SCRFD_REQUIRED_OUTPUTS} SCRFD outputs, model has {}",
                output_names.len()
            )));
        }

        let stride_outputs = map_stride_outputs(&output_names);
        tracing::debug!(?stride_outputs, "SCRFD output tensor mapping");

        Ok(Self {
            session: Mutex::new(session),
            stride_outputs,
            confidence_threshold,
        })
    }

    /// Detect faces, returning bounding boxes sorted by confidence.
    pub fn detect(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, ScrfdError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let letterbox = Letterbox::fit(width as usize, height as usize, SCRFD_INPUT_SIZE);
        let input = preprocess(image, &letterbox);

        let mut session = self
            .session
            .lock()
            .map_err(|_| ScrfdError::SessionPoisoned)?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (&stride, slot) in SCRFD_STRIDES.iter().zip(&self.stride_outputs) {
            let (_, scores) = outputs[slot.score]
                .try_extract_tensor::<f32>()
                .map_err(|e| ScrfdError::InferenceFailed(format!("score map {stride}: {e}")))?;
            let (_, bboxes) = outputs[slot.bbox]
                .try_extract_tensor::<f32>()
                .map_err(|e| ScrfdError::InferenceFailed(format!("distance map {stride}: {e}")))?;

            candidates.extend(decode_stride(
                scores,
                bboxes,
                stride,
                &letterbox,
                self.confidence_threshold,
            ));
        }

        let faces = nms(candidates, SCRFD_NMS_THRESHOLD);
        tracing::debug!(faces = faces.len(), width, height, "SCRFD detection complete");
        Ok(faces)
    }
}

impl FaceLocator for ScrfdLocator {
    fn locate(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, CapabilityError> {
        self.detect(image).map_err(CapabilityError::from)
    }
}

/// Letterbox an RGB image into a 640×640 NCHW float tensor.
///
/// Padding uses the mean value so it normalizes to 0.0.
fn preprocess(image: &RgbImage, letterbox: &Letterbox) -> Array4<f32> {
    let resized = imageops::resize(
        image,
        letterbox.new_w as u32,
        letterbox.new_h as u32,
        FilterType::Triangle,
    );

    let pad_x = letterbox.pad_x.floor() as usize;
    let pad_y = letterbox.pad_y.floor() as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = (x as usize + pad_x, y as usize + pad_y);
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    tensor
}

/// Locate each stride's score and distance tensors.
///
/// Exports named `score_8`, `bbox_16`, ... are mapped by name in any order.
/// Anything else is read in the insightface export order: the three score
/// maps first, then the three distance maps.
fn map_stride_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let position = |kind: &str, stride: usize| {
        let wanted = format!("{kind}_{stride}");
        names.iter().position(|n| *n == wanted)
    };

    let mut mapped = [StrideOutputs { score: 0, bbox: 0 }; 3];
    for (level, &stride) in SCRFD_STRIDES.iter().enumerate() {
        match (position("score", stride), position("bbox", stride)) {
            (Some(score), Some(bbox)) => mapped[level] = StrideOutputs { score, bbox },
            _ => {
                tracing::info!(?names, "SCRFD output names not recognized, mapping by position");
                return positional_outputs();
            }
        }
    }
    mapped
}

fn positional_outputs() -> [StrideOutputs; 3] {
    let levels = SCRFD_STRIDES.len();
    std::array::from_fn(|level| StrideOutputs {
        score: level,
        bbox: levels + level,
    })
}

/// Turn one stride's score and distance maps into source-image boxes.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<BoundingBox> {
    let grid = SCRFD_INPUT_SIZE / stride;
    let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    let mut boxes = Vec::new();
    for (idx, &score) in scores.iter().enumerate().take(num_anchors) {
        if score <= threshold {
            continue;
        }

        // [left, top, right, bottom] distances from the anchor, in stride units.
        let Some(offsets) = bboxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };

        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_x = (cell % grid) as f32 * step;
        let anchor_y = (cell / grid) as f32 * step;

        let (x1, y1) = letterbox.unmap(anchor_x - offsets[0] * step, anchor_y - offsets[1] * step);
        let (x2, y2) = letterbox.unmap(anchor_x + offsets[2] * step, anchor_y + offsets[3] * step);

        boxes.push(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
        });
    }

    boxes
}

/// Non-Maximum Suppression: keep the most confident of each overlapping group.
fn nms(mut boxes: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BoundingBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|kept| iou(kept, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Intersection-over-Union between two bounding boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let overlap_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let overlap_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let overlap = overlap_w * overlap_h;
    let union = a.area() + b.area() - overlap;

    if union > 0.0 {
        overlap / union
    } else {
        0.0
    }
}
