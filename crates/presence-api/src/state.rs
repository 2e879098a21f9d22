//! Shared request state.

use std::sync::Arc;

use presence_vision::{DetectionService, DetectionSettings};

use crate::config::ApiConfig;

/// Cloned into every handler; the detection pipeline is shared.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub detector: Arc<DetectionService>,
}

impl AppState {
    pub fn new(config: ApiConfig, detector: DetectionService) -> Self {
        let detector = Arc::new(detector);
        Self { config, detector }
    }

    /// Load the configured backend. Blocks while models or libraries load.
    pub fn from_settings(config: ApiConfig, settings: DetectionSettings) -> Self {
        Self::new(config, DetectionService::from_settings(settings))
    }
}
