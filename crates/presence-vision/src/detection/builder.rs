//! Backend selection and startup loading.
//!
//! Exactly one backend is built per process, chosen by
//! `DETECTION_BACKEND`. A load failure does not abort startup: the handle is
//! frozen as unavailable and every request reports it.

use std::time::Duration;

use presence_models::BackendKind;
use tracing::{info, warn};

use super::backend::BackendHandle;
use super::classical::{ClassicalDetector, HogParams};
use super::cloud::{CloudVisionConfig, CloudVisionDetector, DEFAULT_ENDPOINT};
use super::neural::{NeuralConfig, NeuralDetector};
use super::normalizer::NormalizerConfig;
use crate::decode::DEFAULT_MAX_PIXELS;

/// Everything the detection pipeline reads from the environment.
#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub backend: BackendKind,
    pub normalizer: NormalizerConfig,
    /// Maximum detections running at once
    pub max_concurrency: usize,
    /// Decompression bomb guard
    pub max_image_pixels: u64,
    pub hog: HogParams,
    pub neural: NeuralConfig,
    pub cloud: CloudVisionConfig,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            normalizer: NormalizerConfig::default(),
            max_concurrency: default_concurrency(),
            max_image_pixels: DEFAULT_MAX_PIXELS,
            hog: HogParams::default(),
            neural: NeuralConfig::default(),
            cloud: CloudVisionConfig::default(),
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// `*` or an empty value disables class filtering.
fn parse_target_class(value: Option<&str>) -> NormalizerConfig {
    match value.map(str::trim) {
        None => NormalizerConfig::default(),
        Some("") | Some("*") => NormalizerConfig::all_classes(),
        Some(class) => NormalizerConfig::for_class(class),
    }
}

impl DetectionSettings {
    /// Load settings from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let backend = match std::env::var("DETECTION_BACKEND") {
            Ok(value) => value.parse().unwrap_or_else(|e| {
                warn!(error = %e, "Invalid DETECTION_BACKEND, using {}", BackendKind::default());
                BackendKind::default()
            }),
            Err(_) => BackendKind::default(),
        };

        let target_class = std::env::var("DETECTION_TARGET_CLASS").ok();
        let normalizer = parse_target_class(target_class.as_deref());

        let neural = NeuralConfig {
            model_path: std::env::var("NEURAL_MODEL_PATH").unwrap_or(defaults.neural.model_path),
            confidence_threshold: env_parse(
                "NEURAL_CONFIDENCE_THRESHOLD",
                defaults.neural.confidence_threshold,
            ),
            ..defaults.neural
        };

        let cloud = CloudVisionConfig {
            endpoint: std::env::var("CLOUD_VISION_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            api_key: std::env::var("GOOGLE_VISION_API_KEY").ok(),
            timeout: Duration::from_secs(env_parse(
                "CLOUD_VISION_TIMEOUT_SECS",
                defaults.cloud.timeout.as_secs(),
            )),
            max_results: env_parse("CLOUD_VISION_MAX_RESULTS", defaults.cloud.max_results),
        };

        Self {
            backend,
            normalizer,
            max_concurrency: env_parse("DETECT_MAX_CONCURRENCY", defaults.max_concurrency).max(1),
            max_image_pixels: env_parse("MAX_IMAGE_PIXELS", defaults.max_image_pixels),
            hog: defaults.hog,
            neural,
            cloud,
        }
    }

    /// Target class for logging.
    pub fn target_class(&self) -> &str {
        self.normalizer.target_class.as_deref().unwrap_or("*")
    }
}

/// Builds the configured backend into a [`BackendHandle`].
///
/// # Example
///
/// ```ignore
/// let handle = BackendBuilder::for_kind(BackendKind::Neural)
///     .with_settings(settings)
///     .build();
/// ```
pub struct BackendBuilder {
    kind: BackendKind,
    settings: DetectionSettings,
}

impl BackendBuilder {
    pub fn for_kind(kind: BackendKind) -> Self {
        Self {
            kind,
            settings: DetectionSettings::default(),
        }
    }

    /// Builder for the backend named in `settings`.
    pub fn from_settings(settings: DetectionSettings) -> Self {
        Self {
            kind: settings.backend,
            settings,
        }
    }

    pub fn with_settings(mut self, settings: DetectionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Load the backend. Never fails; a load error yields an unavailable handle.
    pub fn build(self) -> BackendHandle {
        info!(
            backend = %self.kind,
            target_class = self.settings.target_class(),
            "Loading {} backend",
            self.kind.display_name()
        );

        match self.kind {
            BackendKind::Classical => {
                BackendHandle::from_load(self.kind, ClassicalDetector::new(self.settings.hog))
            }
            BackendKind::Cloud => {
                BackendHandle::from_load(self.kind, CloudVisionDetector::new(self.settings.cloud))
            }
            BackendKind::Neural => {
                BackendHandle::from_load(self.kind, NeuralDetector::new(self.settings.neural))
            }
        }
    }
}
