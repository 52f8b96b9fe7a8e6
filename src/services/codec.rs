//! Base64 data URL codec for images
//!
//! Transport layers exchange rasters as `data:image/png;base64,...` strings.
//! Encoding always produces PNG, so an encode/decode round trip is lossless.

use crate::error::{Result, TileInpaintError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// Prefix of every data URL produced by [`ImageCodec::encode_data_url`]
pub const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Service for converting images to and from base64 data URLs
pub struct ImageCodec;

impl ImageCodec {
    /// Encode an image as PNG bytes
    ///
    /// # Errors
    /// - `Image` when the encoder rejects the raster
    pub fn encode_png_bytes(image: &DynamicImage) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png)?;
        Ok(buffer.into_inner())
    }

    /// Encode an image as a PNG data URL
    ///
    /// # Examples
    /// ```rust
    /// use tile_inpaint::services::ImageCodec;
    /// use image::{DynamicImage, RgbaImage};
    ///
    /// let image = DynamicImage::ImageRgba8(RgbaImage::new(2, 2));
    /// let url = ImageCodec::encode_data_url(&image)?;
    /// assert!(url.starts_with("data:image/png;base64,"));
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    ///
    /// # Errors
    /// - `Image` when PNG encoding fails
    pub fn encode_data_url(image: &DynamicImage) -> Result<String> {
        let bytes = Self::encode_png_bytes(image)?;
        Ok(format!("{PNG_DATA_URL_PREFIX}{}", STANDARD.encode(bytes)))
    }

    /// Decode a data URL or a bare base64 string into an image
    ///
    /// Anything up to and including the first comma is treated as the data URL
    /// header and discarded. The payload format is sniffed from its bytes.
    ///
    /// # Errors
    /// - `Decode` for invalid base64
    /// - `Image` when the payload is not a decodable image
    pub fn decode(data: &str) -> Result<DynamicImage> {
        let bytes = Self::decode_bytes(data)?;
        let image = image::load_from_memory(&bytes)?;
        Ok(image)
    }

    /// Decode the base64 payload of a data URL without interpreting it
    ///
    /// # Errors
    /// - `Decode` for invalid base64
    pub fn decode_bytes(data: &str) -> Result<Vec<u8>> {
        let payload = data.split_once(',').map_or(data, |(_, payload)| payload);
        let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| TileInpaintError::decode(format!("invalid base64 image data: {e}")))
    }

    /// Decode an image and normalize it to RGB8 or RGBA8
    ///
    /// Images with an alpha channel become RGBA8, all others RGB8.
    ///
    /// # Errors
    /// Same as [`ImageCodec::decode`].
    pub fn decode_normalized(data: &str) -> Result<DynamicImage> {
        let image = Self::decode(data)?;
        Ok(normalize_layout(image))
    }
}

/// Convert any decoded image to RGB8 or RGBA8, keeping those unchanged
#[must_use]
pub fn normalize_layout(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image,
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}
