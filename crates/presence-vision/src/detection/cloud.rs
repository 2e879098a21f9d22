//! Google Cloud Vision object localization.
//!
//! Calls `images:annotate` with the `OBJECT_LOCALIZATION` feature and returns
//! every localized object with its normalized bounding polygon. Requests are
//! authenticated with either an API key or a service account token.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use presence_models::BackendKind;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::backend::DetectionBackend;
use super::raw::{RawDetection, RawRegion};
use crate::decode::DecodedImage;
use crate::error::BackendError;

const NAME: &str = "cloud";

pub const DEFAULT_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";
const VISION_SCOPE: &str = "https://www.googleapis.com/auth/cloud-vision";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Cloud Vision client configuration.
#[derive(Debug, Clone)]
pub struct CloudVisionConfig {
    /// Full `images:annotate` URL
    pub endpoint: String,
    /// API key; when absent a service account is loaded from the environment
    pub api_key: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// `maxResults` for the localization feature
    pub max_results: u32,
}

impl Default for CloudVisionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            max_results: 50,
        }
    }
}

#[derive(Clone)]
enum Credentials {
    ApiKey(String),
    ServiceAccount(Arc<dyn TokenProvider>),
}

/// Cloud Vision detector.
pub struct CloudVisionDetector {
    http: Client,
    config: CloudVisionConfig,
    credentials: Credentials,
}

// Request types

#[derive(Debug, Serialize)]
struct AnnotateRequest<'a> {
    requests: [AnnotateImageRequest<'a>; 1],
}

#[derive(Debug, Serialize)]
struct AnnotateImageRequest<'a> {
    image: ImageContent,
    features: [Feature<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Feature<'a> {
    #[serde(rename = "type")]
    feature_type: &'a str,
    max_results: u32,
}

// Response types

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    localized_object_annotations: Vec<LocalizedObjectAnnotation>,
    error: Option<RpcStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalizedObjectAnnotation {
    #[serde(default)]
    name: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    bounding_poly: BoundingPoly,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoundingPoly {
    #[serde(default)]
    normalized_vertices: Vec<NormalizedVertex>,
}

/// Zero coordinates are omitted from proto3 JSON.
#[derive(Debug, Default, Deserialize)]
struct NormalizedVertex {
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
}

#[derive(Debug, Deserialize)]
struct RpcStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

impl From<LocalizedObjectAnnotation> for RawDetection {
    fn from(a: LocalizedObjectAnnotation) -> Self {
        let vertices = a
            .bounding_poly
            .normalized_vertices
            .into_iter()
            .map(|v| (v.x, v.y))
            .collect();
        RawDetection::new(a.name, a.score, RawRegion::NormalizedPolygon { vertices })
    }
}

impl CloudVisionDetector {
    /// Build the client. Fails when no credentials can be found.
    pub fn new(config: CloudVisionConfig) -> Result<Self, BackendError> {
        let credentials = match config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            Some(key) => Credentials::ApiKey(key.to_string()),
            None => Credentials::ServiceAccount(load_service_account()?),
        };
        Self::with_credentials(config, credentials)
    }

    fn with_credentials(
        config: CloudVisionConfig,
        credentials: Credentials,
    ) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                BackendError::unavailable(NAME, format!("Failed to build HTTP client: {}", e))
            })?;

        let auth = match &credentials {
            Credentials::ApiKey(_) => "api_key",
            Credentials::ServiceAccount(_) => "service_account",
        };
        info!(
            endpoint = %config.endpoint,
            auth,
            timeout_secs = config.timeout.as_secs(),
            "Cloud Vision detector initialized"
        );

        Ok(Self {
            http,
            config,
            credentials,
        })
    }

    pub fn config(&self) -> &CloudVisionConfig {
        &self.config
    }

    async fn annotate(&self, content: String) -> Result<AnnotateImageResponse, BackendError> {
        let body = AnnotateRequest {
            requests: [AnnotateImageRequest {
                image: ImageContent { content },
                features: [Feature {
                    feature_type: "OBJECT_LOCALIZATION",
                    max_results: self.config.max_results,
                }],
            }],
        };

        let request = self.http.post(&self.config.endpoint).json(&body);
        let request = match &self.credentials {
            // Never in the URL; reqwest errors include it
            Credentials::ApiKey(key) => request.header(API_KEY_HEADER, key.as_str()),
            Credentials::ServiceAccount(provider) => {
                let token = provider
                    .token(&[VISION_SCOPE])
                    .await
                    .map_err(|e| {
                        BackendError::transient(NAME, format!("Access token unavailable: {}", e))
                    })?;
                request.bearer_auth(token.as_str())
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| {
                BackendError::transient(NAME, format!("Request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(BackendError::transient(
                NAME,
                format!("Cloud Vision API error {}: {}", status, error_text),
            ));
        }

        let parsed: AnnotateResponse = response
            .json()
            .await
            .map_err(|e| {
                let e = e.without_url();
                BackendError::transient(NAME, format!("Failed to parse response: {}", e))
            })?;

        let image_response = parsed.responses.into_iter().next().unwrap_or_default();
        if let Some(err) = &image_response.error {
            return Err(BackendError::transient(
                NAME,
                format!("Cloud Vision returned error {}: {}", err.code, err.message),
            ));
        }

        Ok(image_response)
    }
}

fn load_service_account() -> Result<Arc<dyn TokenProvider>, BackendError> {
    let service_account = CustomServiceAccount::from_env()
        .map_err(|e| {
            BackendError::unavailable(NAME, format!("Failed to load service account: {}", e))
        })?;

    match service_account {
        Some(sa) => Ok(Arc::new(sa)),
        None => Err(BackendError::unavailable(
            NAME,
            "No credentials: set GOOGLE_VISION_API_KEY or GOOGLE_APPLICATION_CREDENTIALS",
        )),
    }
}

/// The original upload bytes, or a PNG re-encode when they are not kept.
fn encoded_content(image: &DecodedImage) -> Result<String, BackendError> {
    if !image.encoded.is_empty() {
        return Ok(BASE64.encode(&image.encoded));
    }

    let rgb = image
        .to_rgb_image()
        .ok_or_else(|| {
            BackendError::invalid_input(NAME, "pixel buffer does not match dimensions")
        })?;
    let mut buf = Cursor::new(Vec::new());
    rgb.write_to(&mut buf, image::ImageOutputFormat::Png)
        .map_err(|e| BackendError::invalid_input(NAME, format!("Failed to encode image: {}", e)))?;
    Ok(BASE64.encode(buf.into_inner()))
}

#[async_trait]
impl DetectionBackend for CloudVisionDetector {
    async fn detect(&self, image: DecodedImage) -> Result<Vec<RawDetection>, BackendError> {
        let content = encoded_content(&image)?;

        let response = self.annotate(content).await.map_err(|e| {
            warn!(error = %e, "Cloud Vision request failed");
            e
        })?;

        let detections: Vec<RawDetection> = response
            .localized_object_annotations
            .into_iter()
            .map(RawDetection::from)
            .collect();

        debug!(count = detections.len(), "Cloud Vision localization completed");
        Ok(detections)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Cloud
    }
}
