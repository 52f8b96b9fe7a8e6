//! Deterministic fallback backend
//!
//! Fills every pixel the mask marks for regeneration with a fixed sentinel
//! color. Used in tests and wherever no model is reachable.

use crate::{
    backends::{check_generation_inputs, BackendKind, InpaintingBackend},
    config::GenerationConfig,
    error::Result,
    types::{ChannelLayout, InpaintMask},
    utils::raster,
};
use async_trait::async_trait;
use image::{DynamicImage, GenericImageView};
use tracing::{debug, instrument};

/// Magenta, fully opaque
pub const DEFAULT_SENTINEL: [u8; 4] = [255, 0, 255, 255];

/// Backend that paints masked pixels with a sentinel color
#[derive(Debug, Clone)]
pub struct PlaceholderBackend {
    sentinel: [u8; 4],
}

impl PlaceholderBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::with_sentinel(DEFAULT_SENTINEL)
    }

    /// RGB images use only the first three components
    #[must_use]
    pub fn with_sentinel(sentinel: [u8; 4]) -> Self {
        Self { sentinel }
    }

    #[must_use]
    pub fn sentinel(&self) -> [u8; 4] {
        self.sentinel
    }

    fn fill(&self, image: &DynamicImage, mask: &InpaintMask) -> Result<DynamicImage> {
        let mut result = image.clone();
        let (width, _) = image.dimensions();
        let (bytes, layout) = raster::pixel_bytes_mut(&mut result)?;
        let channels = layout.channels();
        let fill = match layout {
            ChannelLayout::Rgb => &self.sentinel[..3],
            ChannelLayout::Rgba => &self.sentinel[..],
        };

        let mut filled = 0_u64;
        for (index, pixel) in bytes.chunks_exact_mut(channels).enumerate() {
            let x = (index % width as usize) as u32;
            let y = (index / width as usize) as u32;
            if mask.should_regenerate(x, y) {
                pixel.copy_from_slice(fill);
                filled += 1;
            }
        }
        debug!(filled, "placeholder fill complete");
        Ok(result)
    }
}

impl Default for PlaceholderBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InpaintingBackend for PlaceholderBackend {
    #[instrument(skip_all, fields(backend = "placeholder"))]
    async fn generate(
        &self,
        image: &DynamicImage,
        mask: &InpaintMask,
        config: &GenerationConfig,
    ) -> Result<DynamicImage> {
        check_generation_inputs(image, mask, config)?;
        self.fill(image, mask)
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "placeholder"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Placeholder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TileInpaintError;
    use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};

    fn config() -> GenerationConfig {
        GenerationConfig::builder().prompt("stone").build().unwrap()
    }

    #[tokio::test]
    async fn test_fills_only_masked_pixels() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 2, Rgba([10, 20, 30, 255])));
        let mut gray = GrayImage::new(4, 2);
        gray.put_pixel(2, 0, Luma([255]));
        gray.put_pixel(3, 1, Luma([129]));
        gray.put_pixel(0, 1, Luma([128]));
        let mask = InpaintMask::new(gray);

        let result = PlaceholderBackend::new()
            .generate(&image, &mask, &config())
            .await
            .unwrap();

        assert_eq!(result.dimensions(), (4, 2));
        assert_eq!(result.get_pixel(2, 0), Rgba(DEFAULT_SENTINEL));
        assert_eq!(result.get_pixel(3, 1), Rgba(DEFAULT_SENTINEL));
        assert_eq!(result.get_pixel(0, 1), Rgba([10, 20, 30, 255]));
        assert_eq!(result.get_pixel(0, 0), Rgba([10, 20, 30, 255]));
    }

    #[tokio::test]
    async fn test_rgb_images_stay_rgb() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])));
        let mask = InpaintMask::filled(2, 2, 255);

        let result = PlaceholderBackend::with_sentinel([0, 255, 0, 255])
            .generate(&image, &mask, &config())
            .await
            .unwrap();

        assert!(matches!(result, DynamicImage::ImageRgb8(_)));
        assert_eq!(result.to_rgb8().get_pixel(1, 1), &Rgb([0, 255, 0]));
    }

    #[tokio::test]
    async fn test_rejects_empty_prompt_and_mismatched_mask() {
        let backend = PlaceholderBackend::new();
        let image = DynamicImage::ImageRgba8(RgbaImage::new(4, 4));

        let err = backend
            .generate(&image, &InpaintMask::filled(4, 4, 0), &GenerationConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TileInpaintError::GenerationFailure(_)));

        let err = backend
            .generate(&image, &InpaintMask::filled(4, 3, 0), &config())
            .await
            .unwrap_err();
        assert!(matches!(err, TileInpaintError::DimensionMismatch(_)));
    }

    #[test]
    fn test_always_available() {
        let backend = PlaceholderBackend::default();
        assert!(backend.is_available());
        assert_eq!(backend.kind(), BackendKind::Placeholder);
        assert_eq!(backend.sentinel(), DEFAULT_SENTINEL);
    }
}
