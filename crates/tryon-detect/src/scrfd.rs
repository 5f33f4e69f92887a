//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes the RGB image into a square input, decodes the three
//! anchor-free stride heads, and merges overlapping boxes with NMS.
//! Landmark heads, if the model has them, are ignored.

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tryon_core::detection::{DetectionError, FaceDetection};
use tryon_core::types::BoundingBox;

/// Model file looked up when a directory is given to `load_models`.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [u32; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
/// Score and bbox heads per stride; kps heads are optional.
const SCRFD_MIN_OUTPUTS: usize = 6;
const SCRFD_INTRA_THREADS: usize = 2;

#[derive(Error, Debug)]
enum ScrfdError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("unexpected model outputs: {0}")]
    Outputs(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Output tensor indices for one stride: (score_idx, bbox_idx).
type StrideOutputIndices = (usize, usize);

/// Scale and offset from original image space into the square input.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    new_w: u32,
    new_h: u32,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, size: u32) -> Self {
        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, size);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, size);
        Self {
            scale,
            new_w,
            new_h,
            pad_x: (size - new_w) / 2,
            pad_y: (size - new_h) / 2,
        }
    }

    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

/// SCRFD-backed implementation of [`FaceDetection`].
///
/// Inference runs on the blocking pool against a shared session, so a
/// panicking or abandoned call leaves the session loaded.
pub struct ScrfdDetector {
    session: Option<Arc<Mutex<Session>>>,
    stride_indices: [StrideOutputIndices; 3],
    confidence_threshold: f32,
    nms_threshold: f32,
}

impl Default for ScrfdDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrfdDetector {
    pub fn new() -> Self {
        Self {
            session: None,
            stride_indices: [(0, 3), (1, 4), (2, 5)],
            confidence_threshold: SCRFD_CONFIDENCE_THRESHOLD,
            nms_threshold: SCRFD_NMS_THRESHOLD,
        }
    }

    pub fn with_thresholds(mut self, confidence: f32, nms: f32) -> Self {
        self.confidence_threshold = confidence;
        self.nms_threshold = nms;
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }
}

#[async_trait]
impl FaceDetection for ScrfdDetector {
    async fn load_models(&mut self, location: &str) -> Result<(), DetectionError> {
        let path = model_path(location);
        let unavailable = |e: String| DetectionError::ModelsUnavailable {
            location: location.to_string(),
            reason: e,
        };

        let (session, indices) = tokio::task::spawn_blocking(move || open_session(&path))
            .await
            .map_err(|e| unavailable(e.to_string()))?
            .map_err(|e| unavailable(e.to_string()))?;

        self.session = Some(Arc::new(Mutex::new(session)));
        self.stride_indices = indices;
        Ok(())
    }

    async fn detect_all_faces(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectionError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DetectionError::Failed("empty image".into()));
        }
        let session = self.session.clone().ok_or(DetectionError::NotLoaded)?;

        let (input, letterbox) = preprocess(image, SCRFD_INPUT_SIZE);
        let indices = self.stride_indices;
        let threshold = self.confidence_threshold;

        let result = run_locked(session, move |session| {
            infer(session, &input, &indices, &letterbox, threshold)
        })
        .await
        .map_err(|e| DetectionError::Failed(format!("inference task: {e}")))?;

        let detections = result.map_err(|e| DetectionError::Failed(e.to_string()))?;
        let faces = nms(detections, self.nms_threshold);
        tracing::debug!(faces = faces.len(), "SCRFD detection complete");
        Ok(faces)
    }
}

/// Run `f` on the blocking pool with exclusive access to `shared`. A panic
/// inside `f` surfaces as the join error and leaves `shared` usable.
async fn run_locked<T, R, F>(shared: Arc<Mutex<T>>, f: F) -> Result<R, tokio::task::JoinError>
where
    T: Send + 'static,
    R: Send + 'static,
    F: FnOnce(&mut T) -> R + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&mut relock(&shared))).await
}

fn relock<T>(shared: &Mutex<T>) -> MutexGuard<'_, T> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn model_path(location: &str) -> PathBuf {
    let path = Path::new(location);
    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("onnx")) {
        path.to_path_buf()
    } else {
        path.join(SCRFD_MODEL_FILE)
    }
}

fn open_session(path: &Path) -> Result<(Session, [StrideOutputIndices; 3]), ScrfdError> {
    if !path.exists() {
        return Err(ScrfdError::ModelNotFound(path.display().to_string()));
    }

    let session = Session::builder()?
        .with_intra_threads(SCRFD_INTRA_THREADS)?
        .commit_from_file(path)?;

    let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
    if output_names.len() < SCRFD_MIN_OUTPUTS {
        return Err(ScrfdError::Outputs(format!(
            "need at least {SCRFD_MIN_OUTPUTS} (3 strides × score/bbox), got {}",
            output_names.len()
        )));
    }

    let indices = discover_output_indices(&output_names);
    tracing::info!(path = %path.display(), outputs = ?output_names, ?indices, "loaded SCRFD model");
    Ok((session, indices))
}

/// Map stride heads to output positions, by name ("score_8", "bbox_16", ...)
/// when the export has them, else positionally (scores first, then bboxes).
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: u32| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&s| Some((find("score", s)?, find("bbox", s)?)))
        .collect();

    match named.as_deref() {
        Some(&[a, b, c]) => [a, b, c],
        _ => [(0, 3), (1, 4), (2, 5)],
    }
}

/// Letterbox an RGB image into a normalized NCHW tensor. Padding
/// normalizes to 0.0.
fn preprocess(image: &RgbImage, size: u32) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::fit(image.width(), image.height(), size);
    let resized = imageops::resize(image, letterbox.new_w, letterbox.new_h, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let tx = (x + letterbox.pad_x) as usize;
        let ty = (y + letterbox.pad_y) as usize;
        for (c, &value) in pixel.0.iter().enumerate() {
            tensor[[0, c, ty, tx]] = (value as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }
    (tensor, letterbox)
}

fn infer(
    session: &mut Session,
    input: &Array4<f32>,
    indices: &[StrideOutputIndices; 3],
    letterbox: &Letterbox,
    threshold: f32,
) -> Result<Vec<BoundingBox>, ScrfdError> {
    let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

    let mut detections = Vec::new();
    for (&stride, &(score_idx, bbox_idx)) in SCRFD_STRIDES.iter().zip(indices) {
        let (_, scores) = outputs[score_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| ScrfdError::Outputs(format!("scores stride {stride}: {e}")))?;
        let (_, bboxes) = outputs[bbox_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| ScrfdError::Outputs(format!("bboxes stride {stride}: {e}")))?;
        detections.extend(decode_stride(scores, bboxes, stride, letterbox, threshold));
    }
    Ok(detections)
}

/// Decode one stride head. Each cell carries two anchors; bbox values are
/// distances from the anchor point to each edge in stride units.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: u32,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<BoundingBox> {
    let grid_w = (SCRFD_INPUT_SIZE / stride) as usize;
    let step = stride as f32;

    scores
        .iter()
        .enumerate()
        .filter(|&(_, &score)| score > threshold)
        .filter_map(|(idx, &score)| {
            let d = bboxes.get(idx * 4..idx * 4 + 4)?;
            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let ax = (cell % grid_w) as f32 * step;
            let ay = (cell / grid_w) as f32 * step;

            let (x1, y1) = letterbox.unmap(ax - d[0] * step, ay - d[1] * step);
            let (x2, y2) = letterbox.unmap(ax + d[2] * step, ay + d[3] * step);
            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
            })
        })
        .collect()
}

/// Non-maximum suppression; output is sorted by descending confidence.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BoundingBox> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| iou(k, &det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let inter_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
