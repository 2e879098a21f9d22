//! Presence detection backends and the pipeline around them.
//!
//! | Backend | Engine | Raw region |
//! |---------|--------|------------|
//! | `Classical` | OpenCV HOG + linear SVM | pixel `(x, y, w, h)` |
//! | `Cloud` | Google Cloud Vision object localization | normalized polygon |
//! | `Neural` | YOLOv8 on ONNX Runtime | pixel corners |
//!
//! Use `DetectionService::from_settings` to build the configured backend and
//! the pipeline around it.

pub mod backend;
pub mod builder;
pub mod classical;
pub mod cloud;
pub mod neural;
pub mod normalizer;
pub mod raw;
pub mod service;

pub use backend::{BackendAvailability, BackendHandle, DetectionBackend};
pub use builder::{BackendBuilder, DetectionSettings};
pub use classical::{ClassicalDetector, HogParams};
pub use cloud::{CloudVisionConfig, CloudVisionDetector};
pub use neural::{NeuralConfig, NeuralDetector};
pub use normalizer::{NormalizerConfig, ResultNormalizer};
pub use raw::{RawDetection, RawRegion};
pub use service::DetectionService;
