//! Detection backend capability and its process-wide handle.
//!
//! A backend is loaded once at startup. The outcome is frozen in a
//! [`BackendHandle`]: either `Ready` with a shared backend instance, or
//! `Unavailable` with the load failure reason. There is no transition back to
//! `Ready` without restarting the process.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use presence_models::BackendKind;
use tracing::{error, info};

use super::raw::RawDetection;
use crate::decode::{DecodedImage, PixelLayout};
use crate::error::BackendError;

/// A pluggable detector.
///
/// Implementations are shared across concurrent requests and must not hold
/// per-request state. CPU-bound work should run on the blocking pool.
#[async_trait]
pub trait DetectionBackend: Send + Sync {
    /// Run detection on one image.
    ///
    /// Zero detections is a valid result, not an error.
    async fn detect(&self, image: DecodedImage) -> Result<Vec<RawDetection>, BackendError>;

    /// Which variant this is.
    fn kind(&self) -> BackendKind;

    /// Provider name for logging.
    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Channel order the backend consumes.
    fn pixel_layout(&self) -> PixelLayout {
        PixelLayout::Rgb8
    }
}

/// Load outcome of a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendAvailability {
    Ready,
    Unavailable { reason: String },
}

impl BackendAvailability {
    pub fn is_ready(&self) -> bool {
        matches!(self, BackendAvailability::Ready)
    }
}

impl fmt::Display for BackendAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendAvailability::Ready => write!(f, "ready"),
            BackendAvailability::Unavailable { reason } => write!(f, "unavailable: {}", reason),
        }
    }
}

enum BackendState {
    Ready(Arc<dyn DetectionBackend>),
    Unavailable(String),
}

/// Immutable, cheaply cloneable handle to the configured backend.
#[derive(Clone)]
pub struct BackendHandle {
    kind: BackendKind,
    state: Arc<BackendState>,
}

impl BackendHandle {
    /// Handle for a successfully loaded backend.
    pub fn ready(backend: Arc<dyn DetectionBackend>) -> Self {
        let kind = backend.kind();
        info!(backend = %kind, "Detection backend ready");
        Self {
            kind,
            state: Arc::new(BackendState::Ready(backend)),
        }
    }

    /// Handle for a backend that failed to load.
    pub fn unavailable(kind: BackendKind, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        error!(backend = %kind, reason = %reason, "Detection backend unavailable");
        Self {
            kind,
            state: Arc::new(BackendState::Unavailable(reason)),
        }
    }

    /// Freeze the outcome of a load attempt.
    pub fn from_load<B, E>(kind: BackendKind, result: Result<B, E>) -> Self
    where
        B: DetectionBackend + 'static,
        E: fmt::Display,
    {
        match result {
            Ok(backend) => Self::ready(Arc::new(backend)),
            Err(e) => Self::unavailable(kind, e.to_string()),
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn availability(&self) -> BackendAvailability {
        match self.state.as_ref() {
            BackendState::Ready(_) => BackendAvailability::Ready,
            BackendState::Unavailable(reason) => BackendAvailability::Unavailable {
                reason: reason.clone(),
            },
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state.as_ref(), BackendState::Ready(_))
    }

    /// The loaded backend, or an `Unavailable` error without touching it.
    pub fn backend(&self) -> Result<&Arc<dyn DetectionBackend>, BackendError> {
        match self.state.as_ref() {
            BackendState::Ready(backend) => Ok(backend),
            BackendState::Unavailable(reason) => {
                Err(BackendError::unavailable(self.kind.as_str(), reason.clone()))
            }
        }
    }

    /// Run detection, failing fast when the backend never loaded.
    pub async fn detect(&self, image: DecodedImage) -> Result<Vec<RawDetection>, BackendError> {
        self.backend()?.detect(image).await
    }
}

impl fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendHandle")
            .field("kind", &self.kind)
            .field("availability", &self.availability())
            .finish()
    }
}
