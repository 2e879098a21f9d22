//! Per-request orchestration: validate, check backend, decode, detect,
//! normalize.
//!
//! Each step short-circuits on failure. Nothing is retried and no request
//! changes the backend's availability.

use std::sync::Arc;
use std::time::Instant;

use presence_models::DetectionResult;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::backend::{BackendAvailability, BackendHandle};
use super::builder::{BackendBuilder, DetectionSettings};
use super::normalizer::ResultNormalizer;
use crate::decode::{DecodedImage, ImageDecoder, RasterDecoder, UploadedImage};
use crate::error::{VisionError, VisionResult};
use crate::metrics;

/// The detection pipeline shared by all requests.
pub struct DetectionService {
    decoder: Arc<dyn ImageDecoder>,
    backend: BackendHandle,
    normalizer: ResultNormalizer,
    permits: Arc<Semaphore>,
}

impl DetectionService {
    pub fn new(
        decoder: Arc<dyn ImageDecoder>,
        backend: BackendHandle,
        normalizer: ResultNormalizer,
        max_concurrency: usize,
    ) -> Self {
        Self {
            decoder,
            backend,
            normalizer,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Build the decoder and the configured backend from settings.
    pub fn from_settings(settings: DetectionSettings) -> Self {
        let decoder = Arc::new(RasterDecoder::new(settings.max_image_pixels));
        let normalizer = ResultNormalizer::new(settings.normalizer.clone());
        let max_concurrency = settings.max_concurrency;
        let backend = BackendBuilder::from_settings(settings).build();
        Self::new(decoder, backend, normalizer, max_concurrency)
    }

    pub fn backend(&self) -> &BackendHandle {
        &self.backend
    }

    pub fn availability(&self) -> BackendAvailability {
        self.backend.availability()
    }

    /// Run one upload through the pipeline.
    pub async fn handle(&self, upload: UploadedImage) -> VisionResult<DetectionResult> {
        let start = Instant::now();
        let backend_name = self.backend.kind().as_str();

        let result = self.run(upload).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(output) => {
                metrics::record_detection(backend_name, "success", elapsed.as_secs_f64());
                metrics::record_detection_count(backend_name, output.detections.len());
                info!(
                    backend = backend_name,
                    count = output.number_of_people,
                    detections = output.detections.len(),
                    latency_ms = elapsed.as_millis() as u64,
                    "Detection completed"
                );
            }
            Err(e) => {
                metrics::record_detection(backend_name, e.label(), elapsed.as_secs_f64());
                warn!(
                    backend = backend_name,
                    error = %e,
                    latency_ms = elapsed.as_millis() as u64,
                    "Detection failed"
                );
            }
        }

        result
    }

    async fn run(&self, upload: UploadedImage) -> VisionResult<DetectionResult> {
        upload.validate()?;

        let backend = match self.backend.backend() {
            Ok(backend) => Arc::clone(backend),
            Err(e) => {
                return Err(VisionError::NoBackend {
                    service: self.backend.kind().display_name(),
                    reason: e.message,
                })
            }
        };

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| VisionError::internal("Detection semaphore closed"))?;

        let image = self.decode(upload).await?;
        let frame = image.dimensions();
        debug!(width = frame.0, height = frame.1, backend = backend.name(), "Running detection");

        let image = image.to_layout(backend.pixel_layout());
        let raw = backend.detect(image).await?;

        Ok(self.normalizer.normalize(&raw, frame))
    }

    async fn decode(&self, upload: UploadedImage) -> VisionResult<DecodedImage> {
        let decoder = Arc::clone(&self.decoder);
        let decoded = tokio::task::spawn_blocking(move || decoder.decode(&upload))
            .await
            .map_err(|e| VisionError::internal(format!("Decode task failed: {}", e)))?;

        decoded.map_err(|e| {
            metrics::record_decode_failure(e.reason());
            VisionError::from(e)
        })
    }
}
