//! Anchor-free multi-stride face detector (SCRFD family) via ONNX Runtime.

use crate::model::{FaceLocator, ModelError};
use crate::types::FaceRegion;
use image::imageops::FilterType;
use image::{imageops, Rgb, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const DET_INPUT_SIZE: u32 = 640;
const DET_MEAN: f32 = 127.5;
const DET_STD: f32 = 128.0;
const DET_SCORE_THRESHOLD: f32 = 0.5;
const DET_NMS_IOU: f32 = 0.4;
const DET_STRIDES: [u32; 3] = [8, 16, 32];
const DET_ANCHORS_PER_CELL: usize = 2;

/// Scale and padding applied when fitting the frame into the model input.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// A raw detection in frame coordinates, before clamping to image bounds.
#[derive(Clone, Copy)]
struct Detection {
    score: f32,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

/// SCRFD-style face locator.
///
/// The model exports score/bbox/keypoint tensors per stride; this locator
/// consumes scores and boxes only — the downstream encoder is crop-based,
/// so facial landmarks are never decoded.
pub struct OnnxFaceLocator {
    session: Session,
}

impl OnnxFaceLocator {
    /// Load the detection model from the given path.
    pub fn load(model_path: &str) -> Result<Self, ModelError> {
        if !Path::new(model_path).exists() {
            return Err(ModelError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();
        let num_outputs = output_names.len();
        tracing::info!(path = model_path, outputs = ?output_names, "loaded face detection model");

        if num_outputs < 6 {
            return Err(ModelError::InferenceFailed(format!(
                "detector needs score+bbox tensors for 3 strides (>= 6 outputs), got {num_outputs}"
            )));
        }

        Ok(Self { session })
    }

    /// Fit the frame into the square model input, padding with mid-gray so
    /// the padding normalizes to zero.
    fn preprocess(image: &RgbImage) -> (Array4<f32>, Letterbox) {
        let (w, h) = image.dimensions();
        let size = DET_INPUT_SIZE;
        let scale = (size as f32 / w as f32).min(size as f32 / h as f32);
        let new_w = ((w as f32 * scale).round() as u32).max(1);
        let new_h = ((h as f32 * scale).round() as u32).max(1);
        let pad_x = (size - new_w) as f32 / 2.0;
        let pad_y = (size - new_h) as f32 / 2.0;

        let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);
        let mut canvas = RgbImage::from_pixel(size, size, Rgb([DET_MEAN as u8; 3]));
        imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

        let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for (x, y, pixel) in canvas.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = (pixel.0[c] as f32 - DET_MEAN) / DET_STD;
            }
        }

        (tensor, Letterbox { scale, pad_x, pad_y })
    }
}

impl FaceLocator for OnnxFaceLocator {
    fn locate(&mut self, image: &RgbImage) -> Result<Vec<FaceRegion>, ModelError> {
        let (input, letterbox) = Self::preprocess(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        // Standard SCRFD export ordering: [0-2] scores, [3-5] bboxes
        // (keypoint tensors, when present, trail at [6-8] and are ignored).
        let mut detections = Vec::new();
        for (stride_pos, &stride) in DET_STRIDES.iter().enumerate() {
            let (_, scores) = outputs[stride_pos]
                .try_extract_tensor::<f32>()
                .map_err(|e| ModelError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[stride_pos + 3]
                .try_extract_tensor::<f32>()
                .map_err(|e| ModelError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;

            detections.extend(decode_stride(scores, bboxes, stride, &letterbox));
        }

        let kept = nms(detections, DET_NMS_IOU);

        // NMS already ordered by descending score, so the best detection
        // stays first.
        let (w, h) = image.dimensions();
        let regions: Vec<FaceRegion> = kept
            .iter()
            .filter_map(|d| clamp_to_frame(d, w, h))
            .collect();

        tracing::debug!(count = regions.len(), "face detection complete");
        Ok(regions)
    }
}

/// Decode one stride level: each grid cell carries `DET_ANCHORS_PER_CELL`
/// anchor points whose box is expressed as edge offsets in stride units.
fn decode_stride(scores: &[f32], bboxes: &[f32], stride: u32, letterbox: &Letterbox) -> Vec<Detection> {
    let grid = (DET_INPUT_SIZE / stride) as usize;
    let num_anchors = grid * grid * DET_ANCHORS_PER_CELL;
    let s = stride as f32;

    let mut out = Vec::new();
    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= DET_SCORE_THRESHOLD {
            continue;
        }

        let cell = idx / DET_ANCHORS_PER_CELL;
        let anchor_cx = (cell % grid) as f32 * s;
        let anchor_cy = (cell / grid) as f32 * s;

        let off = idx * 4;
        if off + 3 >= bboxes.len() {
            continue;
        }

        // Undo the letterbox to land in original frame coordinates.
        let unmap_x = |v: f32| (v - letterbox.pad_x) / letterbox.scale;
        let unmap_y = |v: f32| (v - letterbox.pad_y) / letterbox.scale;

        out.push(Detection {
            score,
            x1: unmap_x(anchor_cx - bboxes[off] * s),
            y1: unmap_y(anchor_cy - bboxes[off + 1] * s),
            x2: unmap_x(anchor_cx + bboxes[off + 2] * s),
            y2: unmap_y(anchor_cy + bboxes[off + 3] * s),
        });
    }
    out
}

/// Greedy non-maximum suppression by descending score.
fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::new();
    for det in detections {
        if kept.iter().all(|k| iou(k, &det) <= iou_threshold) {
            kept.push(det);
        }
    }
    kept
}

fn iou(a: &Detection, b: &Detection) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = ix * iy;
    let union = (a.x2 - a.x1) * (a.y2 - a.y1) + (b.x2 - b.x1) * (b.y2 - b.y1) - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Clamp a detection to the frame, dropping boxes that end up empty.
fn clamp_to_frame(det: &Detection, width: u32, height: u32) -> Option<FaceRegion> {
    let region = FaceRegion {
        top: det.y1.max(0.0) as u32,
        right: (det.x2.min(width as f32).max(0.0)) as u32,
        bottom: (det.y2.min(height as f32).max(0.0)) as u32,
        left: det.x1.max(0.0) as u32,
    };
    (!region.is_degenerate()).then_some(region)
}
