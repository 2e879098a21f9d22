//! Upload validation and raster decoding.
//!
//! `RasterDecoder` turns the uploaded bytes into packed 8-bit RGB. Backends that
//! want BGR (OpenCV) convert afterwards with [`DecodedImage::to_bgr`].

use std::io::Cursor;

use bytes::Bytes;
use image::io::Reader as ImageReader;
use image::{ImageError, ImageFormat};
use tracing::debug;

use crate::error::{DecodeError, InputError};

/// Default ceiling on decoded pixel count (~40 MP).
pub const DEFAULT_MAX_PIXELS: u64 = 40_000_000;

/// An image as received from the client, before any decoding.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadedImage {
    pub fn new(filename: impl Into<String>, content_type: Option<String>, bytes: Bytes) -> Self {
        Self {
            filename: filename.into(),
            content_type,
            bytes,
        }
    }

    /// Reject uploads with no filename or no content.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.filename.trim().is_empty() || self.bytes.is_empty() {
            return Err(InputError::NoSelectedFile);
        }
        Ok(())
    }
}

/// Channel order of [`DecodedImage::pixels`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Rgb8,
    Bgr8,
}

/// Decoded pixels plus the original payload.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    /// Packed, row-major, 3 bytes per pixel.
    pub pixels: Vec<u8>,
    /// The encoded bytes this image was decoded from. Remote backends send
    /// these instead of re-encoding.
    pub encoded: Bytes,
    pub format: Option<ImageFormat>,
}

impl DecodedImage {
    /// Wrap raw RGB pixels. Fails if the buffer length does not match.
    pub fn from_rgb(
        width: u32,
        height: u32,
        pixels: Vec<u8>,
        encoded: Bytes,
    ) -> Result<Self, DecodeError> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(DecodeError::CorruptData(format!(
                "pixel buffer length {} does not match {}x{}x3",
                pixels.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            layout: PixelLayout::Rgb8,
            pixels,
            encoded,
            format: None,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Copy of the image with the requested channel order.
    pub fn to_layout(&self, layout: PixelLayout) -> DecodedImage {
        let mut out = self.clone();
        if self.layout != layout {
            for px in out.pixels.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            out.layout = layout;
        }
        out
    }

    pub fn to_bgr(&self) -> DecodedImage {
        self.to_layout(PixelLayout::Bgr8)
    }

    pub fn to_rgb(&self) -> DecodedImage {
        self.to_layout(PixelLayout::Rgb8)
    }

    /// RGB view as an `image` buffer.
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        let rgb = self.to_rgb();
        image::RgbImage::from_raw(rgb.width, rgb.height, rgb.pixels)
    }
}

/// Turns uploaded bytes into pixels.
#[cfg_attr(test, mockall::automock)]
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, upload: &UploadedImage) -> Result<DecodedImage, DecodeError>;
}

/// `image`-crate backed decoder for the common raster formats.
#[derive(Debug, Clone)]
pub struct RasterDecoder {
    max_pixels: u64,
}

impl Default for RasterDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PIXELS)
    }
}

impl RasterDecoder {
    pub fn new(max_pixels: u64) -> Self {
        Self { max_pixels }
    }

    fn reader(
        bytes: &Bytes,
        hint: Option<ImageFormat>,
    ) -> Result<ImageReader<Cursor<&[u8]>>, DecodeError> {
        let mut reader = ImageReader::new(Cursor::new(bytes.as_ref()))
            .with_guessed_format()
            .map_err(|e| DecodeError::CorruptData(e.to_string()))?;

        if reader.format().is_none() {
            match hint {
                Some(format) => reader.set_format(format),
                None => {
                    return Err(DecodeError::UnsupportedFormat(
                        "unrecognized image signature".to_string(),
                    ))
                }
            }
        }
        Ok(reader)
    }
}

/// Map a declared MIME type to a format hint. Non-image types are ignored.
fn format_hint(content_type: Option<&str>) -> Option<ImageFormat> {
    let mime = content_type?.split(';').next()?.trim().to_ascii_lowercase();
    if !mime.starts_with("image/") {
        return None;
    }
    ImageFormat::from_mime_type(mime)
}

fn map_image_error(err: ImageError) -> DecodeError {
    match err {
        ImageError::Unsupported(e) => DecodeError::UnsupportedFormat(e.to_string()),
        ImageError::Limits(e) => DecodeError::UnsupportedFormat(e.to_string()),
        other => DecodeError::CorruptData(other.to_string()),
    }
}

impl ImageDecoder for RasterDecoder {
    fn decode(&self, upload: &UploadedImage) -> Result<DecodedImage, DecodeError> {
        self.decode_bytes(&upload.bytes, upload.content_type.as_deref())
    }
}

impl RasterDecoder {
    /// Decode raw bytes. `declared_content_type` is only a fallback hint.
    pub fn decode_bytes(
        &self,
        bytes: &Bytes,
        declared_content_type: Option<&str>,
    ) -> Result<DecodedImage, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::EmptyInput);
        }

        let hint = format_hint(declared_content_type);

        let (width, height) = Self::reader(bytes, hint)?
            .into_dimensions()
            .map_err(map_image_error)?;
        if width == 0 || height == 0 {
            return Err(DecodeError::CorruptData("zero-sized image".to_string()));
        }
        if u64::from(width) * u64::from(height) > self.max_pixels {
            return Err(DecodeError::UnsupportedFormat(format!(
                "{}x{} exceeds the {} pixel limit",
                width, height, self.max_pixels
            )));
        }

        let reader = Self::reader(bytes, hint)?;
        let format = reader.format();
        let rgb = reader.decode().map_err(map_image_error)?.to_rgb8();

        debug!(width, height, ?format, "Decoded upload");

        let (w, h) = rgb.dimensions();
        let mut decoded = DecodedImage::from_rgb(w, h, rgb.into_raw(), bytes.clone())?;
        decoded.format = format;
        Ok(decoded)
    }
}
