//! Image upload and detection.

use axum::extract::multipart::{Field, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use presence_models::DetectionResult;
use presence_vision::{InputError, UploadedImage, VisionError};
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";

/// Detect people in an uploaded image.
///
/// Expects `multipart/form-data` with the file in the `image` field.
pub async fn detect(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<DetectionResult>> {
    let upload = match multipart {
        Ok(multipart) => read_image_field(multipart).await?,
        Err(rejection) => {
            debug!(error = %rejection, "Request is not multipart");
            None
        }
    };

    let upload = upload.ok_or(VisionError::BadInput(InputError::MissingFile))?;
    debug!(
        filename = %upload.filename,
        content_type = ?upload.content_type,
        size = upload.bytes.len(),
        "Received upload"
    );

    let result = state.detector.handle(upload).await?;
    Ok(Json(result))
}

/// Find the first file part named `image`.
///
/// Other fields are skipped, including a plain form value named `image`.
async fn read_image_field(mut multipart: Multipart) -> ApiResult<Option<UploadedImage>> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some(IMAGE_FIELD) && field.file_name().is_some() {
            return read_upload(field).await.map(Some);
        }
    }
    Ok(None)
}

async fn read_upload(field: Field<'_>) -> ApiResult<UploadedImage> {
    let filename = field.file_name().unwrap_or_default().to_string();
    let content_type = field.content_type().map(str::to_string);
    let bytes: Bytes = field.bytes().await.map_err(multipart_error)?;
    Ok(UploadedImage::new(filename, content_type, bytes))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    warn!(error = %err, "Failed to read multipart body");
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::bad_request("Malformed multipart body.")
    }
}
