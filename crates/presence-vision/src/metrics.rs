//! Detection pipeline metrics.
//!
//! Recorded through the `metrics` facade; the API binary installs the
//! Prometheus recorder.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const DETECTIONS_TOTAL: &str = "presence_detections_total";
    pub const DETECTION_DURATION_SECONDS: &str = "presence_detection_duration_seconds";
    pub const DETECTIONS_PER_IMAGE: &str = "presence_detections_per_image";
    pub const DECODE_FAILURES_TOTAL: &str = "presence_decode_failures_total";
}

/// Record a finished detection request.
pub fn record_detection(backend: &str, outcome: &str, duration_secs: f64) {
    let labels = [
        ("backend", backend.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::DETECTIONS_TOTAL, &labels).increment(1);
    histogram!(names::DETECTION_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record how many detections one image produced.
pub fn record_detection_count(backend: &str, count: usize) {
    let labels = [("backend", backend.to_string())];
    histogram!(names::DETECTIONS_PER_IMAGE, &labels).record(count as f64);
}

pub fn record_decode_failure(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::DECODE_FAILURES_TOTAL, &labels).increment(1);
}
