//! Raster precondition checks shared by every pipeline stage

use crate::{
    error::{Result, TileInpaintError},
    types::{ChannelLayout, GenerationBounds, GridCoord, InpaintMask},
};
use image::{DynamicImage, GenericImageView};

/// Validator for raster shapes and grid extents
pub struct RasterValidator;

impl RasterValidator {
    /// Ensure an image is RGB8/RGBA8 and not empty
    ///
    /// # Errors
    /// - `UnsupportedLayout` for other pixel formats
    /// - `DimensionMismatch` for a zero-sized raster
    pub fn ensure_supported(image: &DynamicImage) -> Result<ChannelLayout> {
        let layout = ChannelLayout::of(image)?;
        if image.width() == 0 || image.height() == 0 {
            return Err(TileInpaintError::DimensionMismatch(
                "image has zero width or height".to_string(),
            ));
        }
        Ok(layout)
    }

    /// Ensure a mask matches its paired image
    ///
    /// # Errors
    /// - `DimensionMismatch` when the sizes differ
    pub fn ensure_mask_matches(image: &DynamicImage, mask: &InpaintMask) -> Result<()> {
        if image.dimensions() != mask.dimensions() {
            return Err(TileInpaintError::dimension_mismatch(
                "mask",
                image.dimensions(),
                mask.dimensions(),
            ));
        }
        Ok(())
    }

    /// Ensure the tile size is usable
    ///
    /// # Errors
    /// - `InvalidConfig` for a zero tile size
    pub fn ensure_tile_size(tile_size: u32) -> Result<()> {
        if tile_size == 0 {
            return Err(TileInpaintError::invalid_config("tile size must be > 0"));
        }
        Ok(())
    }

    /// Ensure the raster covers every tile in `bounds`
    ///
    /// `origin` is the grid coordinate of the raster's top-left tile.
    ///
    /// # Errors
    /// - `InvalidConfig` for inverted bounds or a zero tile size
    /// - `OutOfBounds` when the pixel extent exceeds the raster
    pub fn ensure_bounds_within(
        image: &DynamicImage,
        bounds: &GenerationBounds,
        origin: GridCoord,
        tile_size: u32,
    ) -> Result<()> {
        bounds.validate()?;
        Self::ensure_tile_size(tile_size)?;
        let region = bounds.pixel_region_from(origin, tile_size)?;
        let (width, height) = image.dimensions();
        if !region.fits_within(width, height) {
            return Err(TileInpaintError::out_of_bounds_extent(
                (region.right(), region.bottom()),
                (width, height),
            ));
        }
        Ok(())
    }
}
