//! Backend output → canonical response.
//!
//! All coordinate-system differences between backends are resolved here:
//!
//! | Region | Source | Conversion |
//! |--------|--------|------------|
//! | `PixelRect` | classical | `(x, y, x + w, y + h)` |
//! | `PixelCorners` | neural | as is |
//! | `NormalizedPolygon` | cloud | min/max over all vertices, scaled by image size |
//!
//! Boxes are clamped to the image and rounded to whole pixels. The polygon
//! case does not rely on vertex order, so rotated or reordered vertex lists
//! still produce the enclosing axis-aligned box.

use presence_models::{BoundingBox, Detection, DetectionResult};

use super::raw::{RawDetection, RawRegion};

/// Class filtered to and counted by default.
pub const DEFAULT_TARGET_CLASS: &str = "person";

/// Normalizer settings, fixed per deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizerConfig {
    /// Keep only detections of this class. `None` keeps every class.
    pub target_class: Option<String>,
    /// Class that `number_of_people` counts.
    pub counted_class: String,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            target_class: Some(DEFAULT_TARGET_CLASS.to_string()),
            counted_class: DEFAULT_TARGET_CLASS.to_string(),
        }
    }
}

impl NormalizerConfig {
    /// Pass every class through, still counting people.
    pub fn all_classes() -> Self {
        Self {
            target_class: None,
            ..Self::default()
        }
    }

    /// Filter to `class_name` and count it.
    pub fn for_class(class_name: impl Into<String>) -> Self {
        let class_name = class_name.into();
        Self {
            target_class: Some(class_name.clone()),
            counted_class: class_name,
        }
    }
}

/// Pure mapping from raw detections to a [`DetectionResult`].
#[derive(Debug, Clone, Default)]
pub struct ResultNormalizer {
    config: NormalizerConfig,
}

impl ResultNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Filter, convert and count.
    ///
    /// `frame` is the `(width, height)` of the image the detections came from.
    /// Detections with an empty polygon carry no region and are dropped.
    pub fn normalize(&self, raw: &[RawDetection], frame: (u32, u32)) -> DetectionResult {
        let detections: Vec<Detection> = raw
            .iter()
            .filter(|d| match &self.config.target_class {
                Some(target) => d.matches_class(target),
                None => true,
            })
            .filter_map(|d| {
                let bbox = to_pixel_box(&d.region, frame)?;
                Some(Detection::new(
                    d.class_name.clone(),
                    clamp_confidence(d.confidence),
                    bbox,
                ))
            })
            .collect();

        let count = detections
            .iter()
            .filter(|d| d.is_class(&self.config.counted_class))
            .count();

        DetectionResult::new(count, detections)
    }
}

/// Canonical detection back to raw form, for re-normalization.
impl From<&Detection> for RawDetection {
    fn from(d: &Detection) -> Self {
        let b = d.bounding_box;
        RawDetection::new(
            d.class_name.clone(),
            f64::from(d.score),
            RawRegion::PixelCorners {
                x_min: f64::from(b.x_min()),
                y_min: f64::from(b.y_min()),
                x_max: f64::from(b.x_max()),
                y_max: f64::from(b.y_max()),
            },
        )
    }
}

fn clamp_confidence(value: f64) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0) as f32
}

fn to_pixel(value: f64, limit: u32) -> u32 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, f64::from(limit)) as u32
}

fn to_pixel_box(region: &RawRegion, (width, height): (u32, u32)) -> Option<BoundingBox> {
    let (x0, y0, x1, y1) = match region {
        RawRegion::PixelRect { x, y, width: w, height: h } => (*x, *y, x + w, y + h),
        RawRegion::PixelCorners { x_min, y_min, x_max, y_max } => (*x_min, *y_min, *x_max, *y_max),
        RawRegion::NormalizedPolygon { vertices } => {
            if vertices.is_empty() {
                return None;
            }
            let norm = |v: f64| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
            let (mut min_x, mut min_y) = (f64::MAX, f64::MAX);
            let (mut max_x, mut max_y) = (f64::MIN, f64::MIN);
            for &(vx, vy) in vertices {
                let (vx, vy) = (norm(vx), norm(vy));
                min_x = min_x.min(vx);
                min_y = min_y.min(vy);
                max_x = max_x.max(vx);
                max_y = max_y.max(vy);
            }
            let (w, h) = (f64::from(width), f64::from(height));
            (min_x * w, min_y * h, max_x * w, max_y * h)
        }
    };

    Some(BoundingBox::new(
        to_pixel(x0, width),
        to_pixel(y0, height),
        to_pixel(x1, width),
        to_pixel(y1, height),
    ))
}
