//! Error types for the detection pipeline.

use std::fmt;

use thiserror::Error;

/// Result type for pipeline operations.
pub type VisionResult<T> = Result<T, VisionError>;

/// Problems with the upload itself, before any decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InputError {
    /// The request carried no image part at all.
    #[error("No image file provided.")]
    MissingFile,

    /// An image part was present but had no filename or no bytes.
    #[error("No selected file.")]
    NoSelectedFile,
}

/// Why an upload could not be turned into pixels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty input")]
    EmptyInput,

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("corrupt image data: {0}")]
    CorruptData(String),
}

impl DecodeError {
    /// Stable machine-readable reason.
    pub fn reason(&self) -> &'static str {
        match self {
            DecodeError::EmptyInput => "empty_input",
            DecodeError::UnsupportedFormat(_) => "unsupported_format",
            DecodeError::CorruptData(_) => "corrupt_data",
        }
    }
}

/// Classification of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendErrorKind {
    /// Backend failed to load at startup; no inference attempted.
    Unavailable,
    /// Remote or inference failure for this request only.
    Transient,
    /// The backend cannot consume this image.
    InvalidInput,
}

impl BackendErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendErrorKind::Unavailable => "unavailable",
            BackendErrorKind::Transient => "transient",
            BackendErrorKind::InvalidInput => "invalid_input",
        }
    }
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a detection backend.
#[derive(Debug, Clone, Error)]
#[error("{backend} backend error ({kind}): {message}")]
pub struct BackendError {
    pub backend: &'static str,
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(backend: &'static str, kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            backend,
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(backend: &'static str, message: impl Into<String>) -> Self {
        Self::new(backend, BackendErrorKind::Unavailable, message)
    }

    pub fn transient(backend: &'static str, message: impl Into<String>) -> Self {
        Self::new(backend, BackendErrorKind::Transient, message)
    }

    pub fn invalid_input(backend: &'static str, message: impl Into<String>) -> Self {
        Self::new(backend, BackendErrorKind::InvalidInput, message)
    }
}

/// Everything `DetectionService::handle` can fail with.
#[derive(Debug, Error)]
pub enum VisionError {
    /// The configured backend never became ready.
    #[error("{service} service is unavailable: {reason}")]
    NoBackend { service: &'static str, reason: String },

    #[error("Bad input: {0}")]
    BadInput(#[from] InputError),

    #[error("Decode failed: {0}")]
    DecodeFailure(#[from] DecodeError),

    #[error("Backend failed: {0}")]
    BackendFailure(#[from] BackendError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VisionError {
    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            VisionError::NoBackend { .. } => "no_backend",
            VisionError::BadInput(_) => "bad_input",
            VisionError::DecodeFailure(_) => "decode_failure",
            VisionError::BackendFailure(_) => "backend_failure",
            VisionError::Internal(_) => "internal",
        }
    }
}
