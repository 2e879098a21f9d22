//! Canonical detection response schema.
//!
//! Every backend's output ends up in this shape:
//!
//! ```json
//! {"person_detected": true, "number_of_people": 1,
//!  "detections": [{"bounding_box": [10, 20, 110, 220], "score": 0.91, "class": "person"}]}
//! ```
//!
//! Coordinates are absolute integer pixels in the uploaded image.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::bounding_box::BoundingBox;

/// One detected object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    /// Confidence in [0, 1]
    pub score: f32,
    #[serde(rename = "class")]
    pub class_name: String,
}

impl Detection {
    pub fn new(class_name: impl Into<String>, score: f32, bounding_box: BoundingBox) -> Self {
        Self {
            bounding_box,
            score,
            class_name: class_name.into(),
        }
    }

    /// Case-insensitive class comparison.
    pub fn is_class(&self, class_name: &str) -> bool {
        self.class_name.eq_ignore_ascii_case(class_name)
    }
}

/// Result of one detection request.
///
/// `person_detected` is derived from `number_of_people`; construct through
/// [`DetectionResult::new`] or [`DetectionResult::empty`] to keep them in step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectionResult {
    pub person_detected: bool,
    pub number_of_people: usize,
    /// Backend emission order, not sorted by score.
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(number_of_people: usize, detections: Vec<Detection>) -> Self {
        Self {
            person_detected: number_of_people > 0,
            number_of_people,
            detections,
        }
    }

    pub fn empty() -> Self {
        Self::new(0, Vec::new())
    }
}

impl Default for DetectionResult {
    fn default() -> Self {
        Self::empty()
    }
}

/// JSON body for every non-200 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_result_shape() {
        let value = serde_json::to_value(DetectionResult::empty()).unwrap();
        assert_eq!(
            value,
            json!({"person_detected": false, "number_of_people": 0, "detections": []})
        );
    }

    #[test]
    fn test_detection_field_names() {
        let d = Detection::new("person", 0.5, BoundingBox::new(1, 2, 3, 4));
        let value = serde_json::to_value(&d).unwrap();
        assert_eq!(value["class"], "person");
        assert_eq!(value["score"], 0.5);
        assert_eq!(value["bounding_box"], json!([1, 2, 3, 4]));
        assert!(value.get("class_name").is_none());
    }

    #[test]
    fn test_person_detected_follows_count() {
        let d = Detection::new("Person", 0.9, BoundingBox::new(0, 0, 10, 10));
        let result = DetectionResult::new(1, vec![d]);
        assert!(result.person_detected);
        assert!(result.detections[0].is_class("person"));
    }
}
