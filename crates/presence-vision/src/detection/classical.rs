//! HOG + linear SVM people detector (OpenCV).
//!
//! Runs OpenCV's pretrained Dalal-Triggs people detector over an image
//! pyramid. The sliding-window parameters are deployment constants; callers
//! cannot tune them per request.
//!
//! # Requirements
//! - `opencv` cargo feature (enabled by default)
//! - OpenCV 4.x with the `objdetect` module
//!
//! Without the feature, [`ClassicalDetector::new`] fails and the backend is
//! reported unavailable.

#[cfg(feature = "opencv")]
use std::sync::Arc;

use async_trait::async_trait;
use presence_models::BackendKind;
#[cfg(feature = "opencv")]
use tracing::{debug, info};

use super::backend::DetectionBackend;
use super::raw::RawDetection;
#[cfg(feature = "opencv")]
use super::raw::RawRegion;
use crate::decode::{DecodedImage, PixelLayout};
use crate::error::BackendError;

const NAME: &str = "classical";

/// Label attached to every HOG hit.
pub const HOG_CLASS: &str = "person";

/// Sliding-window parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HogParams {
    /// Window stride in pixels (x, y)
    pub win_stride: (i32, i32),
    /// Padding added around the image (x, y)
    pub padding: (i32, i32),
    /// Pyramid scale step
    pub scale: f64,
    /// SVM decision threshold
    pub hit_threshold: f64,
    /// Minimum overlapping hits to keep a grouped box
    pub group_threshold: f64,
}

impl Default for HogParams {
    fn default() -> Self {
        Self {
            win_stride: (8, 8),
            padding: (8, 8),
            scale: 1.05,
            hit_threshold: 0.0,
            group_threshold: 2.0,
        }
    }
}

/// Classical people detector.
///
/// Holds only the SVM coefficients; a fresh `HOGDescriptor` is built per call
/// so concurrent requests never share OpenCV state.
pub struct ClassicalDetector {
    params: HogParams,
    #[cfg(feature = "opencv")]
    svm: Arc<Vec<f32>>,
}

impl ClassicalDetector {
    /// Load the default people detector.
    #[cfg(feature = "opencv")]
    pub fn new(params: HogParams) -> Result<Self, BackendError> {
        use opencv::objdetect::HOGDescriptor;

        let svm = HOGDescriptor::get_default_people_detector()
            .map_err(|e| {
                BackendError::unavailable(NAME, format!("Failed to load people detector: {}", e))
            })?
            .to_vec();

        // Fail at startup rather than on the first request.
        build_descriptor(&svm)?;

        info!(
            win_stride = ?params.win_stride,
            padding = ?params.padding,
            scale = params.scale,
            "HOG people detector initialized"
        );

        Ok(Self {
            params,
            svm: Arc::new(svm),
        })
    }

    /// Stub for when OpenCV is not available.
    #[cfg(not(feature = "opencv"))]
    pub fn new(_params: HogParams) -> Result<Self, BackendError> {
        Err(BackendError::unavailable(NAME, "OpenCV feature not enabled"))
    }

    pub fn params(&self) -> &HogParams {
        &self.params
    }
}

#[cfg(feature = "opencv")]
fn build_descriptor(svm: &[f32]) -> Result<opencv::objdetect::HOGDescriptor, BackendError> {
    use opencv::core::Vector;
    use opencv::objdetect::HOGDescriptor;
    use opencv::prelude::*;

    let svm = Vector::<f32>::from_slice(svm);
    let mut hog = HOGDescriptor::default()
        .map_err(|e| {
            BackendError::unavailable(NAME, format!("Failed to create HOG descriptor: {}", e))
        })?;
    hog.set_svm_detector(&svm)
        .map_err(|e| {
            BackendError::unavailable(NAME, format!("Failed to set SVM detector: {}", e))
        })?;
    Ok(hog)
}

#[cfg(feature = "opencv")]
fn run_hog(
    svm: &[f32],
    params: &HogParams,
    image: &DecodedImage,
) -> Result<Vec<RawDetection>, BackendError> {
    use opencv::core::{Mat, Rect, Size, Vector, CV_8UC3};
    use opencv::prelude::*;

    if image.width == 0 || image.height == 0 {
        return Err(BackendError::invalid_input(NAME, "zero-sized image"));
    }

    let mut frame = Mat::zeros(image.height as i32, image.width as i32, CV_8UC3)
        .and_then(|m| m.to_mat())
        .map_err(|e| BackendError::transient(NAME, format!("Buffer alloc failed: {}", e)))?;
    frame
        .data_bytes_mut()
        .map_err(|e| BackendError::transient(NAME, format!("Buffer access failed: {}", e)))?
        .copy_from_slice(&image.pixels);

    let hog = build_descriptor(svm).map_err(|e| BackendError::transient(NAME, e.message))?;

    let mut found = Vector::<Rect>::new();
    let mut weights = Vector::<f64>::new();
    hog.detect_multi_scale_weights(
        &frame,
        &mut found,
        &mut weights,
        params.hit_threshold,
        Size::new(params.win_stride.0, params.win_stride.1),
        Size::new(params.padding.0, params.padding.1),
        params.scale,
        params.group_threshold,
        false,
    )
    .map_err(|e| BackendError::transient(NAME, format!("HOG detection failed: {}", e)))?;

    debug!(
        rows = frame.rows(),
        cols = frame.cols(),
        count = found.len(),
        "HOG detection completed"
    );

    Ok(found
        .iter()
        .zip(weights.iter())
        .map(|(rect, weight)| {
            RawDetection::new(
                HOG_CLASS,
                weight,
                RawRegion::PixelRect {
                    x: f64::from(rect.x),
                    y: f64::from(rect.y),
                    width: f64::from(rect.width),
                    height: f64::from(rect.height),
                },
            )
        })
        .collect())
}

#[async_trait]
impl DetectionBackend for ClassicalDetector {
    #[cfg(feature = "opencv")]
    async fn detect(&self, image: DecodedImage) -> Result<Vec<RawDetection>, BackendError> {
        let image = match image.layout {
            PixelLayout::Bgr8 => image,
            PixelLayout::Rgb8 => image.to_bgr(),
        };
        let svm = Arc::clone(&self.svm);
        let params = self.params;

        tokio::task::spawn_blocking(move || run_hog(&svm, &params, &image))
            .await
            .map_err(|e| BackendError::transient(NAME, format!("HOG task failed: {}", e)))?
    }

    #[cfg(not(feature = "opencv"))]
    async fn detect(&self, _image: DecodedImage) -> Result<Vec<RawDetection>, BackendError> {
        Err(BackendError::unavailable(NAME, "OpenCV feature not enabled"))
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Classical
    }

    fn pixel_layout(&self) -> PixelLayout {
        PixelLayout::Bgr8
    }
}
