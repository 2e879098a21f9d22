//! Backend-native detection output.
//!
//! Each backend reports regions in its own coordinate system; the normalizer
//! is the only place that converts between them.

/// Region as a backend emitted it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRegion {
    /// Absolute pixels, top-left corner plus size.
    PixelRect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    /// Absolute pixels, two opposite corners.
    PixelCorners {
        x_min: f64,
        y_min: f64,
        x_max: f64,
        y_max: f64,
    },
    /// Polygon with vertices in [0, 1] relative to the image size.
    NormalizedPolygon { vertices: Vec<(f64, f64)> },
}

/// One detection in backend-native form.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub class_name: String,
    /// Backend score. Usually in [0, 1]; SVM margins may exceed it.
    pub confidence: f64,
    pub region: RawRegion,
    /// Numeric class id, when the backend has one.
    pub class_id: Option<usize>,
}

impl RawDetection {
    pub fn new(class_name: impl Into<String>, confidence: f64, region: RawRegion) -> Self {
        Self {
            class_name: class_name.into(),
            confidence,
            region,
            class_id: None,
        }
    }

    pub fn with_class_id(mut self, class_id: usize) -> Self {
        self.class_id = Some(class_id);
        self
    }

    /// Case-insensitive label match.
    pub fn matches_class(&self, class_name: &str) -> bool {
        self.class_name.trim().eq_ignore_ascii_case(class_name.trim())
    }
}
