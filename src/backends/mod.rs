//! Inpainting backends
//!
//! Every backend implements [`InpaintingBackend`]: given an image, a mask and
//! generation parameters it produces a same-size image in which only pixels the
//! mask marks for regeneration differ from the input.
//! - Placeholder backend (deterministic sentinel fill, always available)
//! - Remote backend (stable-diffusion-webui compatible HTTP service)
//! - ONNX backend (local LaMa-style model through ONNX Runtime)

pub mod factory;
pub mod placeholder;

#[cfg(feature = "remote")]
pub mod remote;

#[cfg(feature = "onnx")]
pub mod onnx;

// Test utilities for backend testing
#[cfg(test)]
pub mod test_utils;

pub use self::factory::{BackendFactory, DefaultBackendFactory};
pub use self::placeholder::{PlaceholderBackend, DEFAULT_SENTINEL};

#[cfg(feature = "remote")]
pub use self::remote::RemoteBackend;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxInpaintBackend;

use crate::{
    config::GenerationConfig,
    error::{Result, TileInpaintError},
    types::{ChannelLayout, InpaintMask},
    utils::raster,
};
use async_trait::async_trait;
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};

/// Backend variant enumeration for runtime selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum BackendKind {
    /// Deterministic sentinel fill
    Placeholder,
    /// HTTP inpainting service
    Remote,
    /// Local ONNX Runtime model
    Onnx,
}

impl BackendKind {
    /// All variants in preference order (model-backed first)
    pub const ALL: [Self; 3] = [Self::Onnx, Self::Remote, Self::Placeholder];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Placeholder => "placeholder",
            Self::Remote => "remote",
            Self::Onnx => "onnx",
        }
    }

    /// Whether support for this variant was compiled in
    #[must_use]
    pub const fn is_compiled(self) -> bool {
        match self {
            Self::Placeholder => true,
            Self::Remote => cfg!(feature = "remote"),
            Self::Onnx => cfg!(feature = "onnx"),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = TileInpaintError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "placeholder" => Ok(Self::Placeholder),
            "remote" => Ok(Self::Remote),
            "onnx" => Ok(Self::Onnx),
            other => Err(TileInpaintError::invalid_config(format!(
                "Unknown backend '{other}' (expected placeholder, remote or onnx)"
            ))),
        }
    }
}

/// Capability shared by every inpainting strategy
///
/// Implementations must tolerate concurrent calls: a single instance is shared
/// by all in-flight requests of a pipeline.
#[async_trait]
pub trait InpaintingBackend: Send + Sync {
    /// Replace the masked pixels of `image` with generated content
    ///
    /// # Errors
    /// - `DimensionMismatch` when the mask and image sizes differ
    /// - `GenerationFailure` when the effective prompt is empty or the backend fails
    /// - `BackendUnavailable` when the backend cannot run at all
    async fn generate(
        &self,
        image: &DynamicImage,
        mask: &InpaintMask,
        config: &GenerationConfig,
    ) -> Result<DynamicImage>;

    /// Whether `generate` can be attempted right now
    fn is_available(&self) -> bool;

    /// Human-readable backend name used in logs and outcomes
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;
}

/// Pick the first candidate that reports itself available
///
/// # Errors
/// - `BackendUnavailable` when no candidate is available
pub fn select_available(
    candidates: &[Arc<dyn InpaintingBackend>],
) -> Result<Arc<dyn InpaintingBackend>> {
    for candidate in candidates {
        if candidate.is_available() {
            tracing::debug!(backend = candidate.name(), "selected inpainting backend");
            return Ok(Arc::clone(candidate));
        }
        tracing::debug!(backend = candidate.name(), "backend unavailable, skipping");
    }
    let names: Vec<&str> = candidates.iter().map(|c| c.name()).collect();
    Err(TileInpaintError::backend_unavailable(format!(
        "none of [{}] is available",
        names.join(", ")
    )))
}

/// Check the shared generation preconditions and return the effective prompt
///
/// # Errors
/// - `UnsupportedLayout` for images other than RGB8/RGBA8
/// - `DimensionMismatch` when mask and image sizes differ
/// - `GenerationFailure` when the effective prompt is empty
pub fn check_generation_inputs(
    image: &DynamicImage,
    mask: &InpaintMask,
    config: &GenerationConfig,
) -> Result<String> {
    ChannelLayout::of(image)?;
    if mask.dimensions() != image.dimensions() {
        return Err(TileInpaintError::dimension_mismatch(
            "mask",
            image.dimensions(),
            mask.dimensions(),
        ));
    }
    let prompt = config.effective_prompt();
    if prompt.is_empty() {
        return Err(TileInpaintError::generation_failure(
            "effective prompt is empty (no prompt text or keywords)",
        ));
    }
    Ok(prompt)
}

/// Merge model output into the source so only regenerated pixels change
///
/// Models are free to touch the whole frame; this restores every pixel the mask
/// preserves. `generated` is converted to the source layout first.
///
/// # Errors
/// - `GenerationFailure` when the generated image has a different size
#[cfg_attr(not(any(feature = "remote", feature = "onnx")), allow(dead_code))]
pub(crate) fn keep_unmasked(
    source: &DynamicImage,
    generated: DynamicImage,
    mask: &InpaintMask,
) -> Result<DynamicImage> {
    if generated.dimensions() != source.dimensions() {
        let (gw, gh) = generated.dimensions();
        let (sw, sh) = source.dimensions();
        return Err(TileInpaintError::generation_failure(format!(
            "backend returned a {gw}x{gh} image for a {sw}x{sh} input"
        )));
    }

    let layout = ChannelLayout::of(source)?;
    let generated = match layout {
        ChannelLayout::Rgb => DynamicImage::ImageRgb8(generated.into_rgb8()),
        ChannelLayout::Rgba => DynamicImage::ImageRgba8(generated.into_rgba8()),
    };

    let mut result = source.clone();
    let (width, _) = source.dimensions();
    let (src, _) = raster::pixel_bytes(&generated)?;
    let (dst, _) = raster::pixel_bytes_mut(&mut result)?;
    let channels = layout.channels();
    for (index, (dst_px, src_px)) in dst
        .chunks_exact_mut(channels)
        .zip(src.chunks_exact(channels))
        .enumerate()
    {
        let x = (index % width as usize) as u32;
        let y = (index / width as usize) as u32;
        if mask.should_regenerate(x, y) {
            dst_px.copy_from_slice(src_px);
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockInpaintBackend;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_backend_kind_parse_and_display() {
        assert_eq!("ONNX".parse::<BackendKind>().unwrap(), BackendKind::Onnx);
        assert_eq!(" remote ".parse::<BackendKind>().unwrap(), BackendKind::Remote);
        assert!("gpu".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Placeholder.to_string(), "placeholder");
        assert!(BackendKind::Placeholder.is_compiled());
    }

    #[test]
    fn test_select_available_takes_first_available() {
        let offline: Arc<dyn InpaintingBackend> = Arc::new(MockInpaintBackend::new_unavailable());
        let online: Arc<dyn InpaintingBackend> = Arc::new(PlaceholderBackend::new());

        let chosen = select_available(&[offline, online]).unwrap();
        assert_eq!(chosen.kind(), BackendKind::Placeholder);
    }

    #[test]
    fn test_select_available_none() {
        let offline: Arc<dyn InpaintingBackend> = Arc::new(MockInpaintBackend::new_unavailable());
        let err = select_available(&[offline]).err().unwrap();
        assert!(matches!(err, TileInpaintError::BackendUnavailable(_)));
        assert!(select_available(&[]).is_err());
    }

    #[test]
    fn test_check_generation_inputs() {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(4, 4));
        let mask = InpaintMask::filled(4, 4, 255);
        let config = GenerationConfig::builder().keyword("rpg").prompt("grass").build().unwrap();
        assert_eq!(
            check_generation_inputs(&image, &mask, &config).unwrap(),
            "rpg grass"
        );

        let small_mask = InpaintMask::filled(2, 4, 255);
        assert!(matches!(
            check_generation_inputs(&image, &small_mask, &config),
            Err(TileInpaintError::DimensionMismatch(_))
        ));

        let empty = GenerationConfig::default();
        assert!(matches!(
            check_generation_inputs(&image, &mask, &empty),
            Err(TileInpaintError::GenerationFailure(_))
        ));
    }

    #[test]
    fn test_keep_unmasked_restores_preserved_pixels() {
        let source = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 1, Rgba([1, 1, 1, 255])));
        let generated =
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 1, Rgba([9, 9, 9, 255])));
        let mut gray = image::GrayImage::new(2, 1);
        gray.put_pixel(1, 0, image::Luma([255]));
        let mask = InpaintMask::new(gray);

        let merged = keep_unmasked(&source, generated, &mask).unwrap();
        assert_eq!(merged.get_pixel(0, 0), Rgba([1, 1, 1, 255]));
        assert_eq!(merged.get_pixel(1, 0), Rgba([9, 9, 9, 255]));

        let wrong = DynamicImage::ImageRgba8(RgbaImage::new(3, 1));
        assert!(keep_unmasked(&source, wrong, &mask).is_err());
    }
}
