//! Byte-level access to RGB8/RGBA8 rasters

use crate::{
    error::{Result, TileInpaintError},
    types::{ChannelLayout, PixelRegion},
};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage, Rgba, RgbaImage};

/// Borrow the packed pixel bytes of an RGB8/RGBA8 image
///
/// # Errors
/// - `UnsupportedLayout` for any other pixel format
pub fn pixel_bytes(image: &DynamicImage) -> Result<(&[u8], ChannelLayout)> {
    match image {
        DynamicImage::ImageRgb8(buffer) => Ok((buffer.as_raw().as_slice(), ChannelLayout::Rgb)),
        DynamicImage::ImageRgba8(buffer) => Ok((buffer.as_raw().as_slice(), ChannelLayout::Rgba)),
        other => Err(TileInpaintError::unsupported_layout(format!(
            "{:?} (expected RGB8 or RGBA8)",
            other.color()
        ))),
    }
}

/// Mutably borrow the packed pixel bytes of an RGB8/RGBA8 image
///
/// # Errors
/// - `UnsupportedLayout` for any other pixel format
pub fn pixel_bytes_mut(image: &mut DynamicImage) -> Result<(&mut [u8], ChannelLayout)> {
    match image {
        DynamicImage::ImageRgb8(buffer) => Ok((&mut **buffer, ChannelLayout::Rgb)),
        DynamicImage::ImageRgba8(buffer) => Ok((&mut **buffer, ChannelLayout::Rgba)),
        other => Err(TileInpaintError::unsupported_layout(format!(
            "{:?} (expected RGB8 or RGBA8)",
            other.color()
        ))),
    }
}

/// Byte offset of pixel `(x, y)` in a packed raster of the given width
#[must_use]
pub fn offset(width: u32, x: u32, y: u32, layout: ChannelLayout) -> usize {
    (y as usize * width as usize + x as usize) * layout.channels()
}

/// Build an image from packed bytes
///
/// # Errors
/// - `Internal` when the buffer length does not match the dimensions
pub fn from_raw(
    width: u32,
    height: u32,
    layout: ChannelLayout,
    bytes: Vec<u8>,
) -> Result<DynamicImage> {
    let image = match layout {
        ChannelLayout::Rgb => RgbImage::from_raw(width, height, bytes).map(DynamicImage::ImageRgb8),
        ChannelLayout::Rgba => {
            RgbaImage::from_raw(width, height, bytes).map(DynamicImage::ImageRgba8)
        },
    };
    image.ok_or_else(|| {
        TileInpaintError::internal(format!(
            "pixel buffer does not match {width}x{height} {layout}"
        ))
    })
}

/// Allocate a raster filled with one color
///
/// For RGB rasters the alpha component of `fill` is dropped.
#[must_use]
pub fn filled(width: u32, height: u32, layout: ChannelLayout, fill: [u8; 4]) -> DynamicImage {
    match layout {
        ChannelLayout::Rgb => DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            Rgb([fill[0], fill[1], fill[2]]),
        )),
        ChannelLayout::Rgba => {
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(fill)))
        },
    }
}

/// Copy `source` into `target` with its top-left corner at `(x, y)`
///
/// Both rasters must share a channel layout and the source must fit.
///
/// # Errors
/// - `DimensionMismatch` when the source does not fit at `(x, y)`
/// - `UnsupportedLayout` when the layouts differ or are not RGB8/RGBA8
pub fn blit(target: &mut DynamicImage, source: &DynamicImage, x: u32, y: u32) -> Result<()> {
    let (target_width, target_height) = target.dimensions();
    let (source_width, source_height) = source.dimensions();
    let region = PixelRegion::new(x, y, source_width, source_height);
    if !region.fits_within(target_width, target_height) {
        return Err(TileInpaintError::DimensionMismatch(format!(
            "{source_width}x{source_height} raster placed at ({x}, {y}) exceeds {target_width}x{target_height}"
        )));
    }

    let (src, src_layout) = pixel_bytes(source)?;
    let (dst, dst_layout) = pixel_bytes_mut(target)?;
    if src_layout != dst_layout {
        return Err(TileInpaintError::unsupported_layout(format!(
            "cannot copy {src_layout} pixels into a {dst_layout} raster"
        )));
    }

    let row_len = source_width as usize * src_layout.channels();
    for row in 0..source_height {
        let src_start = offset(source_width, 0, row, src_layout);
        let dst_start = offset(target_width, x, y + row, dst_layout);
        let (Some(src_row), Some(dst_row)) = (
            src.get(src_start..src_start + row_len),
            dst.get_mut(dst_start..dst_start + row_len),
        ) else {
            return Err(TileInpaintError::internal("row copy out of range"));
        };
        dst_row.copy_from_slice(src_row);
    }
    Ok(())
}
