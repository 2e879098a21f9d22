//! Shared data models for the presence detection service.
//!
//! This crate provides Serde-serializable types for:
//! - The canonical detection response (`DetectionResult`, `Detection`)
//! - Pixel bounding boxes
//! - Backend kinds
//! - Error response bodies

pub mod backend_kind;
pub mod bounding_box;
pub mod detection;

// Re-export common types
pub use backend_kind::{BackendKind, BackendKindParseError};
pub use bounding_box::BoundingBox;
pub use detection::{Detection, DetectionResult, ErrorBody};
