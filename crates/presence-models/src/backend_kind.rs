//! Detection backend kinds.
//!
//! A deployment runs exactly one backend, selected at startup:
//!
//! - `Classical`: HOG/SVM sliding-window people detector (OpenCV)
//! - `Cloud`: remote object localization (Google Cloud Vision)
//! - `Neural`: local single-shot detector (YOLOv8 via ONNX Runtime)

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which detection backend a deployment is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// HOG descriptor + linear SVM people detector.
    #[default]
    Classical,

    /// Remote object-localization API.
    Cloud,

    /// Local neural network detector.
    Neural,
}

impl BackendKind {
    /// All available backend kinds.
    pub const ALL: &'static [BackendKind] = &[
        BackendKind::Classical,
        BackendKind::Cloud,
        BackendKind::Neural,
    ];

    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Classical => "classical",
            BackendKind::Cloud => "cloud",
            BackendKind::Neural => "neural",
        }
    }

    /// Human-readable service name, used in client-facing availability errors.
    pub fn display_name(&self) -> &'static str {
        match self {
            BackendKind::Classical => "HOG detector",
            BackendKind::Cloud => "Cloud Vision",
            BackendKind::Neural => "Neural detector",
        }
    }

    /// Returns true if this backend needs network access at request time.
    pub fn is_remote(&self) -> bool {
        matches!(self, BackendKind::Cloud)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = BackendKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "classical" | "hog" => Ok(BackendKind::Classical),
            "cloud" | "cloud_vision" | "vision" => Ok(BackendKind::Cloud),
            "neural" | "yolo" | "onnx" => Ok(BackendKind::Neural),
            _ => Err(BackendKindParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown detection backend: {0}")]
pub struct BackendKindParseError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse() {
        assert_eq!("classical".parse::<BackendKind>().unwrap(), BackendKind::Classical);
        assert_eq!("HOG".parse::<BackendKind>().unwrap(), BackendKind::Classical);
        assert_eq!("cloud".parse::<BackendKind>().unwrap(), BackendKind::Cloud);
        assert_eq!(" vision ".parse::<BackendKind>().unwrap(), BackendKind::Cloud);
        assert_eq!("yolo".parse::<BackendKind>().unwrap(), BackendKind::Neural);
        assert!("tfjs".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(BackendKind::Classical.to_string(), "classical");
        assert_eq!(BackendKind::Neural.to_string(), "neural");
    }

    #[test]
    fn test_only_cloud_is_remote() {
        let remote: Vec<_> = BackendKind::ALL.iter().filter(|k| k.is_remote()).collect();
        assert_eq!(remote, vec![&BackendKind::Cloud]);
    }
}
