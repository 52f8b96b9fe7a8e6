//! Region-to-mask rasterization

use crate::types::PixelRegion;
use image::{GrayImage, Luma};

/// Mask value for pixels to regenerate
pub const REGENERATE: u8 = 255;

/// Mask value for pixels to preserve
pub const PRESERVE: u8 = 0;

/// Rasterize regions onto a `width × height` luma mask
///
/// Pixels inside any region are set to [`REGENERATE`], all others to
/// [`PRESERVE`]. Regions are clipped to the raster, so a region partly outside
/// still marks its visible part.
#[must_use]
pub fn rasterize_regions(width: u32, height: u32, regions: &[PixelRegion]) -> GrayImage {
    let mut mask = GrayImage::from_pixel(width, height, Luma([PRESERVE]));

    for region in regions.iter().filter(|r| !r.is_empty()) {
        let x_end = region.right().min(u64::from(width)) as u32;
        let y_end = region.bottom().min(u64::from(height)) as u32;
        for y in region.y.min(height)..y_end {
            for x in region.x.min(width)..x_end {
                mask.put_pixel(x, y, Luma([REGENERATE]));
            }
        }
    }

    mask
}
