//! Edge-pixel extraction from locked rasters

use crate::{
    error::{Result, TileInpaintError},
    types::{ChannelLayout, PixelRegion},
};
use image::{DynamicImage, GenericImageView};

/// Copy the pixels of `region` out of `image`
///
/// The returned raster keeps the source's channel layout, so it can be used
/// directly as an [`crate::types::EdgeConstraint`] buffer against the same
/// kind of image.
///
/// # Errors
/// - `InvalidConstraint` when the region is empty or leaves the image
/// - `UnsupportedLayout` for non RGB8/RGBA8 sources
pub fn extract_edge_pixels(image: &DynamicImage, region: PixelRegion) -> Result<DynamicImage> {
    ChannelLayout::of(image)?;
    let (width, height) = image.dimensions();
    if region.is_empty() || !region.fits_within(width, height) {
        return Err(TileInpaintError::invalid_constraint(format!(
            "edge strip {region} is not inside the {width}x{height} source"
        )));
    }
    Ok(image.crop_imm(region.x, region.y, region.width, region.height))
}
