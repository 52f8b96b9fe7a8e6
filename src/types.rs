//! Core types for tile generation operations

use crate::{
    error::{ErrorKind, Result, TileInpaintError},
    services::ImageCodec,
    utils::{edges::extract_edge_pixels, mask::rasterize_regions, raster},
};
use chrono::{DateTime, Utc};
use image::{DynamicImage, GenericImageView, GrayImage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mask values strictly above this are eligible for regeneration
pub const REGENERATE_THRESHOLD: u8 = 128;

/// Channel layout of a raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelLayout {
    /// 8-bit RGB
    Rgb,
    /// 8-bit RGBA
    Rgba,
}

impl ChannelLayout {
    /// Number of bytes per pixel
    #[must_use]
    pub const fn channels(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }

    /// Determine the layout of an image, rejecting anything but RGB8/RGBA8
    pub fn of(image: &DynamicImage) -> Result<Self> {
        match image {
            DynamicImage::ImageRgb8(_) => Ok(Self::Rgb),
            DynamicImage::ImageRgba8(_) => Ok(Self::Rgba),
            other => Err(TileInpaintError::unsupported_layout(format!(
                "{:?} (expected RGB8 or RGBA8)",
                other.color()
            ))),
        }
    }
}

impl std::fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rgb => write!(f, "RGB"),
            Self::Rgba => write!(f, "RGBA"),
        }
    }
}

/// A rectangle in pixel coordinates, `[x, x+width) × [y, y+height)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRegion {
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge, widened so it cannot overflow
    #[must_use]
    pub fn right(&self) -> u64 {
        u64::from(self.x) + u64::from(self.width)
    }

    /// Exclusive bottom edge, widened so it cannot overflow
    #[must_use]
    pub fn bottom(&self) -> u64 {
        u64::from(self.y) + u64::from(self.height)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the whole region lies inside a `width × height` raster
    #[must_use]
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= u64::from(width) && self.bottom() <= u64::from(height)
    }

    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && u64::from(x) < self.right() && u64::from(y) < self.bottom()
    }

    /// Chebyshev distance from a pixel to the region (0 inside)
    #[must_use]
    pub fn distance_to(&self, x: u32, y: u32) -> u64 {
        let (px, py) = (u64::from(x), u64::from(y));
        let dx = if px < u64::from(self.x) {
            u64::from(self.x) - px
        } else if px >= self.right() {
            px + 1 - self.right()
        } else {
            0
        };
        let dy = if py < u64::from(self.y) {
            u64::from(self.y) - py
        } else if py >= self.bottom() {
            py + 1 - self.bottom()
        } else {
            0
        };
        dx.max(dy)
    }

    /// The pixel inside the region closest to `(x, y)`
    ///
    /// The region must not be empty.
    #[must_use]
    pub fn clamp_point(&self, x: u32, y: u32) -> (u32, u32) {
        let max_x = self.x + self.width.saturating_sub(1);
        let max_y = self.y + self.height.saturating_sub(1);
        (x.clamp(self.x, max_x), y.clamp(self.y, max_y))
    }
}

impl std::fmt::Display for PixelRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} at ({}, {})",
            self.width, self.height, self.x, self.y
        )
    }
}

/// Single-channel regeneration mask: 0 = preserve, 255 = regenerate
#[derive(Debug, Clone, PartialEq)]
pub struct InpaintMask {
    image: GrayImage,
}

impl InpaintMask {
    /// Wrap an existing luma raster
    #[must_use]
    pub fn new(image: GrayImage) -> Self {
        Self { image }
    }

    /// Mask with every pixel set to `value`
    #[must_use]
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self::new(GrayImage::from_pixel(width, height, image::Luma([value])))
    }

    /// Build a mask from any decoded image (converted to luma)
    #[must_use]
    pub fn from_image(image: &DynamicImage) -> Self {
        Self::new(image.to_luma8())
    }

    /// Rasterize regions to regenerate (255) on a preserve (0) background
    ///
    /// Regions are clipped to the raster.
    #[must_use]
    pub fn from_regions(width: u32, height: u32, regions: &[PixelRegion]) -> Self {
        Self::new(rasterize_regions(width, height, regions))
    }

    /// Mask every tile inside `bounds` on a `width × height` scene
    ///
    /// # Errors
    /// - `OutOfBounds` when the bounds' pixel extent does not fit the scene
    pub fn from_bounds(
        width: u32,
        height: u32,
        bounds: &GenerationBounds,
        tile_size: u32,
    ) -> Result<Self> {
        let region = bounds.pixel_region(tile_size)?;
        if !region.fits_within(width, height) {
            return Err(TileInpaintError::out_of_bounds_extent(
                (region.right(), region.bottom()),
                (width, height),
            ));
        }
        Ok(Self::from_regions(width, height, &[region]))
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Raw mask value, `None` outside the raster
    #[must_use]
    pub fn value(&self, x: u32, y: u32) -> Option<u8> {
        self.image.get_pixel_checked(x, y).map(|p| p.0[0])
    }

    /// Whether the pixel may be replaced by generated content
    #[must_use]
    pub fn should_regenerate(&self, x: u32, y: u32) -> bool {
        self.value(x, y).is_some_and(|v| v > REGENERATE_THRESHOLD)
    }

    #[must_use]
    pub fn as_image(&self) -> &GrayImage {
        &self.image
    }

    #[must_use]
    pub fn into_image(self) -> GrayImage {
        self.image
    }

    /// Count regenerated and preserved pixels
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total = self.image.as_raw().len() as u64;
        let regenerate = self
            .image
            .as_raw()
            .iter()
            .filter(|&&v| v > REGENERATE_THRESHOLD)
            .count() as u64;
        MaskStatistics {
            regenerate_pixels: regenerate,
            preserved_pixels: total - regenerate,
            coverage: if total == 0 {
                0.0
            } else {
                regenerate as f64 / total as f64
            },
        }
    }
}

/// Summary of a mask's regeneration coverage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub regenerate_pixels: u64,
    pub preserved_pixels: u64,
    /// Fraction of pixels eligible for regeneration (0.0 - 1.0)
    pub coverage: f64,
}

/// A strip of locked pixels the final image must reproduce exactly
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeConstraint {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Exactly `width × height` pixels in the target image's layout
    pub pixels: DynamicImage,
}

impl EdgeConstraint {
    #[must_use]
    pub fn new(x: u32, y: u32, width: u32, height: u32, pixels: DynamicImage) -> Self {
        Self {
            x,
            y,
            width,
            height,
            pixels,
        }
    }

    /// Constraint sized to its pixel buffer
    #[must_use]
    pub fn from_image(x: u32, y: u32, pixels: DynamicImage) -> Self {
        let (width, height) = pixels.dimensions();
        Self::new(x, y, width, height, pixels)
    }

    /// Constraint from a decoded, tightly packed pixel buffer
    ///
    /// # Errors
    /// - `InvalidConstraint` when the buffer is not exactly `width × height` pixels
    pub fn from_raw(
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        layout: ChannelLayout,
        bytes: Vec<u8>,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * layout.channels();
        if bytes.len() != expected {
            return Err(TileInpaintError::invalid_constraint(format!(
                "{} buffer for a {}x{} strip must hold {} bytes, got {}",
                layout,
                width,
                height,
                expected,
                bytes.len()
            )));
        }
        let pixels = raster::from_raw(width, height, layout, bytes)?;
        Ok(Self::new(x, y, width, height, pixels))
    }

    /// Copy a strip out of an already locked raster
    ///
    /// # Errors
    /// - `InvalidConstraint` when the region leaves the source raster
    /// - `UnsupportedLayout` for non RGB8/RGBA8 sources
    pub fn extract(image: &DynamicImage, region: PixelRegion) -> Result<Self> {
        let pixels = extract_edge_pixels(image, region)?;
        Ok(Self::new(
            region.x,
            region.y,
            region.width,
            region.height,
            pixels,
        ))
    }

    #[must_use]
    pub fn region(&self) -> PixelRegion {
        PixelRegion::new(self.x, self.y, self.width, self.height)
    }

    /// Check this constraint against the raster it will be applied to
    ///
    /// # Errors
    /// - `InvalidConstraint` for empty, mis-sized, out-of-bounds or
    ///   layout-mismatched constraints
    pub fn validate_against(&self, target: &DynamicImage) -> Result<()> {
        let region = self.region();
        if region.is_empty() {
            return Err(TileInpaintError::invalid_constraint(format!(
                "constraint {region} is empty"
            )));
        }
        if self.pixels.dimensions() != (self.width, self.height) {
            let (pw, ph) = self.pixels.dimensions();
            return Err(TileInpaintError::invalid_constraint(format!(
                "constraint {region} carries {pw}x{ph} pixels"
            )));
        }
        let (width, height) = target.dimensions();
        if !region.fits_within(width, height) {
            return Err(TileInpaintError::invalid_constraint(format!(
                "constraint {region} exceeds the {width}x{height} image"
            )));
        }
        let target_layout = ChannelLayout::of(target)?;
        let layout = ChannelLayout::of(&self.pixels)
            .map_err(|e| TileInpaintError::invalid_constraint(e.message()))?;
        if layout != target_layout {
            return Err(TileInpaintError::invalid_constraint(format!(
                "constraint {region} is {layout} but the image is {target_layout}"
            )));
        }
        Ok(())
    }
}

/// Integer tile address on the grid
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct GridCoord {
    pub x: i32,
    pub y: i32,
}

impl GridCoord {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for GridCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Inclusive rectangle of grid coordinates expected in the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationBounds {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl GenerationBounds {
    /// # Errors
    /// - `InvalidConfig` when `min > max` on either axis
    pub fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Result<Self> {
        let bounds = Self {
            min_x,
            min_y,
            max_x,
            max_y,
        };
        bounds.validate()?;
        Ok(bounds)
    }

    /// Bounds covering exactly one tile
    #[must_use]
    pub const fn single(x: i32, y: i32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    /// Bounds as deserialized are not checked; call this before use
    ///
    /// # Errors
    /// - `InvalidConfig` when `min > max` on either axis
    pub fn validate(&self) -> Result<()> {
        if self.min_x > self.max_x || self.min_y > self.max_y {
            return Err(TileInpaintError::invalid_config(format!(
                "bounds ({}, {})-({}, {}) have min greater than max",
                self.min_x, self.min_y, self.max_x, self.max_y
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn width_tiles(&self) -> u64 {
        (i64::from(self.max_x) - i64::from(self.min_x) + 1).max(0) as u64
    }

    #[must_use]
    pub fn height_tiles(&self) -> u64 {
        (i64::from(self.max_y) - i64::from(self.min_y) + 1).max(0) as u64
    }

    /// Saturates at `u64::MAX` for bounds spanning the whole `i32` grid
    #[must_use]
    pub fn tile_count(&self) -> u64 {
        self.width_tiles().saturating_mul(self.height_tiles())
    }

    #[must_use]
    pub fn contains(&self, coord: GridCoord) -> bool {
        (self.min_x..=self.max_x).contains(&coord.x) && (self.min_y..=self.max_y).contains(&coord.y)
    }

    /// Grid coordinates in row-major order (y outer, x inner)
    pub fn coords(&self) -> impl Iterator<Item = GridCoord> {
        let (min_x, max_x) = (self.min_x, self.max_x);
        (self.min_y..=self.max_y)
            .flat_map(move |y| (min_x..=max_x).map(move |x| GridCoord::new(x, y)))
    }

    /// Pixel rectangle covered by the bounds, relative to grid origin (0, 0)
    ///
    /// # Errors
    /// - `OutOfBounds` when the bounds reach negative pixel coordinates or
    ///   past `u32` pixel space
    pub fn pixel_region(&self, tile_size: u32) -> Result<PixelRegion> {
        self.pixel_region_from(GridCoord::new(0, 0), tile_size)
    }

    /// Pixel rectangle covered by the bounds on a raster whose top-left tile is `origin`
    ///
    /// # Errors
    /// - `OutOfBounds` when the bounds start left of or above `origin`, or
    ///   past `u32` pixel space
    pub fn pixel_region_from(&self, origin: GridCoord, tile_size: u32) -> Result<PixelRegion> {
        let left = i64::from(self.min_x) - i64::from(origin.x);
        let top = i64::from(self.min_y) - i64::from(origin.y);
        if left < 0 || top < 0 {
            return Err(TileInpaintError::out_of_bounds(format!(
                "bounds start at grid ({}, {}) which precedes the raster origin {}",
                self.min_x, self.min_y, origin
            )));
        }
        let ts = i64::from(tile_size);
        let to_u32 = |v: i64| {
            u32::try_from(v).map_err(|_| {
                TileInpaintError::out_of_bounds(format!(
                    "pixel coordinate {v} exceeds the addressable raster size"
                ))
            })
        };
        Ok(PixelRegion::new(
            to_u32(left * ts)?,
            to_u32(top * ts)?,
            to_u32(self.width_tiles() as i64 * ts)?,
            to_u32(self.height_tiles() as i64 * ts)?,
        ))
    }
}

/// A generated or locked tile addressed by grid coordinate
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub grid_x: i32,
    pub grid_y: i32,
    /// Exactly `tile_size × tile_size` pixels
    pub image: DynamicImage,
}

impl Tile {
    #[must_use]
    pub fn new(grid_x: i32, grid_y: i32, image: DynamicImage) -> Self {
        Self {
            grid_x,
            grid_y,
            image,
        }
    }

    #[must_use]
    pub fn coord(&self) -> GridCoord {
        GridCoord::new(self.grid_x, self.grid_y)
    }

    /// Encode the tile as a PNG data URL
    ///
    /// # Errors
    /// - `Image` when PNG encoding fails
    pub fn to_data_url(&self) -> Result<String> {
        ImageCodec::encode_data_url(&self.image)
    }
}

/// Per-stage timings of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationTimings {
    pub validation_ms: u64,
    pub inpainting_ms: u64,
    pub reconcile_ms: u64,
    pub slicing_ms: u64,
    pub total_ms: u64,
}

impl GenerationTimings {
    /// Fraction of the total spent in the backend
    #[must_use]
    pub fn inpainting_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.inpainting_ms as f64 / self.total_ms as f64
        }
    }
}

/// Structured result of a pipeline run: tiles on success, a message on failure
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub request_id: Uuid,
    /// Row-major tiles; always empty when `success` is false
    pub tiles: Vec<Tile>,
    pub success: bool,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub backend: String,
    pub timings: GenerationTimings,
    pub completed_at: DateTime<Utc>,
}

impl GenerationOutcome {
    #[must_use]
    pub fn succeeded(
        request_id: Uuid,
        backend: String,
        tiles: Vec<Tile>,
        timings: GenerationTimings,
    ) -> Self {
        Self {
            request_id,
            tiles,
            success: true,
            error: None,
            error_kind: None,
            backend,
            timings,
            completed_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn failed(
        request_id: Uuid,
        backend: String,
        error: &TileInpaintError,
        timings: GenerationTimings,
    ) -> Self {
        Self {
            request_id,
            tiles: Vec::new(),
            success: false,
            error: Some(error.message()),
            error_kind: Some(error.kind()),
            backend,
            timings,
            completed_at: Utc::now(),
        }
    }
}
