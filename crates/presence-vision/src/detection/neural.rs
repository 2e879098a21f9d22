//! YOLOv8 on ONNX Runtime.
//!
//! The model sees a square RGB input and emits `[1, 84, N]`: box center,
//! box size and 80 class scores per candidate. All classes are reported;
//! target-class filtering happens in the normalizer.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::ArrayView2;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::value::{Tensor, Value};
use presence_models::BackendKind;
use tracing::{debug, info};

use super::backend::DetectionBackend;
use super::raw::{RawDetection, RawRegion};
use crate::decode::DecodedImage;
use crate::error::BackendError;

const NAME: &str = "neural";

/// Rows per candidate in the output tensor.
const ROWS: usize = 4 + COCO_CLASSES.len();

pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
    "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
    "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
    "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
    "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
    "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
    "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

/// One post-NMS candidate, corners in original image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct YoloDetection {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
    /// Index into [`COCO_CLASSES`]
    pub class_id: usize,
    pub confidence: f32,
}

impl YoloDetection {
    pub fn class_name(&self) -> &'static str {
        COCO_CLASSES.get(self.class_id).copied().unwrap_or("unknown")
    }

    fn area(&self) -> f32 {
        (self.x_max - self.x_min).max(0.0) * (self.y_max - self.y_min).max(0.0)
    }

    fn overlap(&self, other: &Self) -> f32 {
        let w = self.x_max.min(other.x_max) - self.x_min.max(other.x_min);
        let h = self.y_max.min(other.y_max) - self.y_min.max(other.y_min);
        let shared = w.max(0.0) * h.max(0.0);
        let total = self.area() + other.area() - shared;
        if total <= 0.0 {
            return 0.0;
        }
        shared / total
    }
}

impl From<YoloDetection> for RawDetection {
    fn from(d: YoloDetection) -> Self {
        let region = RawRegion::PixelCorners {
            x_min: d.x_min.into(),
            y_min: d.y_min.into(),
            x_max: d.x_max.into(),
            y_max: d.y_max.into(),
        };
        RawDetection::new(d.class_name(), d.confidence.into(), region).with_class_id(d.class_id)
    }
}

#[derive(Debug, Clone)]
pub struct NeuralConfig {
    /// ONNX export of a YOLOv8 detection model
    pub model_path: String,
    /// Minimum best-class score for a candidate to survive
    pub confidence_threshold: f32,
    /// Same-class candidates overlapping more than this are suppressed
    pub nms_threshold: f32,
    /// Side of the square model input
    pub input_size: u32,
}

impl Default for NeuralConfig {
    fn default() -> Self {
        Self {
            model_path: "models/yolov8n.onnx".into(),
            confidence_threshold: 0.25,
            nms_threshold: 0.45,
            input_size: 640,
        }
    }
}

struct Model {
    // ort sessions need `&mut` to run
    session: Mutex<Session>,
    config: NeuralConfig,
}

/// YOLOv8 detector. Cheap to clone into blocking tasks.
pub struct NeuralDetector {
    model: Arc<Model>,
}

impl NeuralDetector {
    /// Load the model from `config.model_path`.
    ///
    /// A missing or unparseable file is an `Unavailable` error.
    pub fn new(config: NeuralConfig) -> Result<Self, BackendError> {
        let path = Path::new(&config.model_path);
        if !path.is_file() {
            return Err(BackendError::unavailable(
                NAME,
                format!("Model file {} does not exist", config.model_path),
            ));
        }

        let session = create_session(path)?;
        info!(model = %config.model_path, input_size = config.input_size, "YOLOv8 model loaded");

        Ok(Self {
            model: Arc::new(Model {
                session: Mutex::new(session),
                config,
            }),
        })
    }

    pub fn config(&self) -> &NeuralConfig {
        &self.model.config
    }
}

impl Model {
    fn infer(&self, image: &RgbImage) -> Result<Vec<YoloDetection>, BackendError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(BackendError::invalid_input(NAME, "zero-sized image"));
        }

        let tensor = self.to_tensor(image)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| BackendError::transient(NAME, "Session mutex poisoned"))?;
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| BackendError::transient(NAME, format!("Inference: {}", e)))?;
        let output = outputs
            .get("output0")
            .ok_or_else(|| BackendError::transient(NAME, "Model has no output0"))?;
        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| BackendError::transient(NAME, format!("Reading output0: {}", e)))?;

        postprocess(data, width, height, &self.config)
    }

    /// Stretch to the input square and split into normalized NCHW planes.
    fn to_tensor(&self, image: &RgbImage) -> Result<Value, BackendError> {
        let side = self.config.input_size;
        let resized = image::imageops::resize(image, side, side, FilterType::Triangle);

        let plane = (side * side) as usize;
        let mut planes = vec![0.0f32; 3 * plane];
        for (i, pixel) in resized.pixels().enumerate() {
            for (channel, value) in pixel.0.iter().enumerate() {
                planes[channel * plane + i] = f32::from(*value) / 255.0;
            }
        }

        let shape = vec![1usize, 3, side as usize, side as usize];
        Tensor::from_array((shape, planes.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| BackendError::transient(NAME, format!("Input tensor: {}", e)))
    }
}

/// Turn a flat `[1, 84, N]` output into detections for a `width` x `height` image.
///
/// Keeps candidates whose best class reaches the confidence threshold, then
/// runs per-class NMS. The result is ordered by confidence, descending.
pub fn postprocess(
    output: &[f32],
    width: u32,
    height: u32,
    config: &NeuralConfig,
) -> Result<Vec<YoloDetection>, BackendError> {
    if output.is_empty() || output.len() % ROWS != 0 {
        return Err(BackendError::transient(
            NAME,
            format!("Output of {} values is not [1, {}, N]", output.len(), ROWS),
        ));
    }

    let grid = ArrayView2::from_shape((ROWS, output.len() / ROWS), output)
        .map_err(|e| BackendError::transient(NAME, format!("Output layout: {}", e)))?;

    let sx = width as f32 / config.input_size as f32;
    let sy = height as f32 / config.input_size as f32;
    let (w_max, h_max) = (width as f32, height as f32);

    let candidates = grid.columns().into_iter().filter_map(|col| {
        let (class_id, confidence) = col
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))?;
        if confidence < config.confidence_threshold {
            return None;
        }

        let (cx, cy, half_w, half_h) = (col[0], col[1], col[2] / 2.0, col[3] / 2.0);
        Some(YoloDetection {
            x_min: ((cx - half_w) * sx).clamp(0.0, w_max),
            y_min: ((cy - half_h) * sy).clamp(0.0, h_max),
            x_max: ((cx + half_w) * sx).clamp(0.0, w_max),
            y_max: ((cy + half_h) * sy).clamp(0.0, h_max),
            class_id,
            confidence,
        })
    });

    Ok(suppress_overlaps(candidates.collect(), config.nms_threshold))
}

/// Greedy per-class NMS.
pub fn suppress_overlaps(
    mut candidates: Vec<YoloDetection>,
    iou_threshold: f32,
) -> Vec<YoloDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<YoloDetection> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let dominated = kept
            .iter()
            .filter(|k| k.class_id == candidate.class_id)
            .any(|k| k.overlap(&candidate) > iou_threshold);
        if !dominated {
            kept.push(candidate);
        }
    }
    kept
}

fn load_error<E: std::fmt::Display>(step: &'static str) -> impl FnOnce(E) -> BackendError {
    move |e| BackendError::unavailable(NAME, format!("{}: {}", step, e))
}

/// Build a session on the best available execution provider, CPU last.
fn create_session(path: &Path) -> Result<Session, BackendError> {
    let model = std::fs::read(path).map_err(load_error("Reading model"))?;
    let builder = Session::builder()
        .map_err(load_error("Session builder"))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(load_error("Optimization level"))?;

    if let Some(session) = accelerated_session(&builder, &model) {
        return Ok(session);
    }

    let session = builder
        .commit_from_memory(&model)
        .map_err(load_error("Loading model"))?;
    info!(provider = "cpu", "ONNX Runtime session ready");
    Ok(session)
}

#[allow(unused_variables)]
fn accelerated_session(builder: &SessionBuilder, model: &[u8]) -> Option<Session> {
    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        let session = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
            .ok()
            .and_then(|b| b.commit_from_memory(model).ok());
        if session.is_some() {
            info!(provider = "cuda", "ONNX Runtime session ready");
            return session;
        }
        debug!("CUDA provider rejected, falling back");
    }

    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        let session = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
            .ok()
            .and_then(|b| b.commit_from_memory(model).ok());
        if session.is_some() {
            info!(provider = "coreml", "ONNX Runtime session ready");
            return session;
        }
        debug!("CoreML provider rejected, falling back");
    }

    None
}

#[async_trait]
impl DetectionBackend for NeuralDetector {
    async fn detect(&self, image: DecodedImage) -> Result<Vec<RawDetection>, BackendError> {
        let model = Arc::clone(&self.model);

        let found = tokio::task::spawn_blocking(move || {
            let rgb = image
                .to_rgb_image()
                .ok_or_else(|| {
                    BackendError::invalid_input(NAME, "pixel buffer does not match dimensions")
                })?;
            model.infer(&rgb)
        })
        .await
        .map_err(|e| BackendError::transient(NAME, format!("Inference task: {}", e)))??;

        debug!(count = found.len(), "YOLOv8 pass finished");
        Ok(found.into_iter().map(RawDetection::from).collect())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Neural
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendErrorKind;

    /// Lay candidates out column-wise the way the model does.
    fn model_output(candidates: &[(f32, f32, f32, f32, usize, f32)]) -> Vec<f32> {
        let n = candidates.len();
        let mut out = vec![0.0f32; ROWS * n];
        for (col, &(cx, cy, w, h, class, score)) in candidates.iter().enumerate() {
            for (row, value) in [cx, cy, w, h].into_iter().enumerate() {
                out[row * n + col] = value;
            }
            out[(4 + class) * n + col] = score;
        }
        out
    }

    fn boxed(class_id: usize, confidence: f32) -> YoloDetection {
        YoloDetection { x_min: 0.0, y_min: 0.0, x_max: 10.0, y_max: 10.0, class_id, confidence }
    }

    #[test]
    fn test_class_table() {
        assert_eq!(ROWS, 84);
        assert_eq!(COCO_CLASSES[0], "person");
        assert_eq!(boxed(16, 0.5).class_name(), "dog");
        assert_eq!(boxed(500, 0.5).class_name(), "unknown");
    }

    #[test]
    fn test_boxes_scaled_back_to_image() {
        // 64x128 box centered in the 640 input, image is 1280x640
        let out = model_output(&[(320.0, 320.0, 64.0, 128.0, 0, 0.9)]);
        let found = postprocess(&out, 1280, 640, &NeuralConfig::default()).unwrap();

        assert_eq!(found.len(), 1);
        let d = &found[0];
        assert_eq!(d.class_name(), "person");
        assert!((d.x_min - 576.0).abs() < 0.01);
        assert!((d.x_max - 704.0).abs() < 0.01);
        assert!((d.y_min - 256.0).abs() < 0.01);
        assert!((d.y_max - 384.0).abs() < 0.01);
    }

    #[test]
    fn test_boxes_clamped_to_image() {
        let out = model_output(&[(0.0, 0.0, 100.0, 100.0, 0, 0.9)]);
        let found = postprocess(&out, 640, 640, &NeuralConfig::default()).unwrap();
        assert_eq!((found[0].x_min, found[0].y_min), (0.0, 0.0));
        assert!((found[0].x_max - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_low_scores_dropped_other_classes_kept() {
        let out = model_output(&[
            (100.0, 100.0, 50.0, 50.0, 16, 0.8),
            (400.0, 400.0, 50.0, 50.0, 0, 0.7),
            (200.0, 200.0, 50.0, 50.0, 2, 0.1),
        ]);
        let found = postprocess(&out, 640, 640, &NeuralConfig::default()).unwrap();
        let names: Vec<_> = found.iter().map(YoloDetection::class_name).collect();
        assert_eq!(names, vec!["dog", "person"]);
    }

    #[test]
    fn test_overlaps_suppressed_within_class() {
        let kept = suppress_overlaps(vec![boxed(0, 0.8), boxed(5, 0.7), boxed(0, 0.9)], 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].class_id, 5);
    }

    #[test]
    fn test_malformed_output_is_transient() {
        let err = postprocess(&[0.0; 85], 10, 10, &NeuralConfig::default()).unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Transient);
    }

    #[test]
    fn test_missing_model_is_unavailable() {
        let config = NeuralConfig {
            model_path: "/nonexistent/yolov8n.onnx".into(),
            ..NeuralConfig::default()
        };
        let err = NeuralDetector::new(config).err().unwrap();
        assert_eq!(err.kind, BackendErrorKind::Unavailable);
    }

    #[test]
    fn test_raw_conversion_keeps_class_id() {
        let raw = RawDetection::from(boxed(16, 0.5));
        assert_eq!(raw.class_name, "dog");
        assert_eq!(raw.class_id, Some(16));
    }
}
