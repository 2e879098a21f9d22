#![deny(unreachable_patterns)]
//! Image decoding and person detection.
//!
//! This crate provides:
//! - Upload validation and raster decoding
//! - Three interchangeable detection backends (HOG, Cloud Vision, YOLOv8)
//! - Normalization of backend output into one canonical result
//! - The per-request `DetectionService`

pub mod decode;
pub mod detection;
pub mod error;
pub mod metrics;

pub use decode::{DecodedImage, ImageDecoder, PixelLayout, RasterDecoder, UploadedImage};
pub use detection::{
    BackendAvailability, BackendBuilder, BackendHandle, DetectionBackend, DetectionService,
    DetectionSettings, NormalizerConfig, RawDetection, RawRegion, ResultNormalizer,
};
pub use error::{
    BackendError, BackendErrorKind, DecodeError, InputError, VisionError, VisionResult,
};
