//! Grid slicing and composition
//!
//! Maps between one raster and a grid of square tiles. A raster built by
//! [`TileSlicer::compose`] remembers the grid coordinate of its top-left tile,
//! so scenes whose tiles start at negative or non-zero coordinates slice back
//! to the same addresses.

use crate::{
    error::{Result, TileInpaintError},
    types::{ChannelLayout, EdgeConstraint, GenerationBounds, GridCoord, InpaintMask, PixelRegion, Tile},
    utils::{raster, RasterValidator},
};
use image::{DynamicImage, GenericImageView};
use std::collections::BTreeSet;
use tracing::{debug, instrument};

/// Largest raster `compose` will allocate, in pixels (1 GiB of RGBA8)
pub const MAX_COMPOSED_PIXELS: u64 = 1 << 28;

/// Stateless slicer between rasters and tile grids
pub struct TileSlicer;

impl TileSlicer {
    /// Cut the tiles of `bounds` out of `image`, in row-major order
    ///
    /// Tile `(gx, gy)` is the block whose top-left pixel is
    /// `(gx * tile_size, gy * tile_size)`.
    ///
    /// # Errors
    /// - `InvalidConfig` for inverted bounds or a zero tile size
    /// - `OutOfBounds` when the image is smaller than
    ///   `(max_x + 1) * tile_size` × `(max_y + 1) * tile_size` or the bounds
    ///   reach negative pixel coordinates
    pub fn slice(image: &DynamicImage, bounds: &GenerationBounds, tile_size: u32) -> Result<Vec<Tile>> {
        Self::slice_with_origin(image, bounds, GridCoord::new(0, 0), tile_size)
    }

    /// Like [`TileSlicer::slice`] for a raster whose top-left tile is `origin`
    ///
    /// # Errors
    /// Same as [`TileSlicer::slice`].
    #[instrument(skip(image), fields(tiles = bounds.tile_count()))]
    pub fn slice_with_origin(
        image: &DynamicImage,
        bounds: &GenerationBounds,
        origin: GridCoord,
        tile_size: u32,
    ) -> Result<Vec<Tile>> {
        RasterValidator::ensure_bounds_within(image, bounds, origin, tile_size)?;
        let region = bounds.pixel_region_from(origin, tile_size)?;

        let mut tiles = Vec::with_capacity(bounds.tile_count() as usize);
        for (row, gy) in (bounds.min_y..=bounds.max_y).enumerate() {
            for (col, gx) in (bounds.min_x..=bounds.max_x).enumerate() {
                let px = region.x + col as u32 * tile_size;
                let py = region.y + row as u32 * tile_size;
                tiles.push(Tile::new(gx, gy, image.crop_imm(px, py, tile_size, tile_size)));
            }
        }
        debug!(count = tiles.len(), "sliced tiles");
        Ok(tiles)
    }

    /// Paint tiles onto one RGBA raster sized to their bounding rectangle
    ///
    /// Cells without a tile keep `background`. When two tiles share a
    /// coordinate the later one wins.
    ///
    /// # Errors
    /// - `InvalidConfig` for an empty tile list or a zero tile size
    /// - `DimensionMismatch` when a tile is not `tile_size × tile_size`
    /// - `OutOfBounds` when the composed raster would not fit `u32` pixel
    ///   space or exceeds [`MAX_COMPOSED_PIXELS`]
    #[instrument(skip(tiles), fields(tiles = tiles.len()))]
    pub fn compose(tiles: &[Tile], tile_size: u32, background: [u8; 4]) -> Result<ComposedScene> {
        let extent = tile_extent(tiles)?
            .ok_or_else(|| TileInpaintError::invalid_config("cannot compose an empty tile list"))?;
        compose_over(tiles, extent, tile_size, background)
    }

    /// Compose a scene that covers both the tiles and `bounds`
    ///
    /// This is the scene a regeneration request works on: locked tiles around
    /// (or inside) the area to regenerate, background everywhere else. The
    /// tile list may be empty.
    ///
    /// # Errors
    /// Same as [`TileSlicer::compose`], plus `InvalidConfig` for inverted bounds.
    #[instrument(skip(tiles), fields(tiles = tiles.len()))]
    pub fn compose_with_bounds(
        tiles: &[Tile],
        bounds: &GenerationBounds,
        tile_size: u32,
        background: [u8; 4],
    ) -> Result<ComposedScene> {
        bounds.validate()?;
        let extent = match tile_extent(tiles)? {
            Some(tiles_extent) => GenerationBounds {
                min_x: tiles_extent.min_x.min(bounds.min_x),
                min_y: tiles_extent.min_y.min(bounds.min_y),
                max_x: tiles_extent.max_x.max(bounds.max_x),
                max_y: tiles_extent.max_y.max(bounds.max_y),
            },
            None => *bounds,
        };
        compose_over(tiles, extent, tile_size, background)
    }
}

fn compose_over(
    tiles: &[Tile],
    extent: GenerationBounds,
    tile_size: u32,
    background: [u8; 4],
) -> Result<ComposedScene> {
    RasterValidator::ensure_tile_size(tile_size)?;
    for tile in tiles {
        if tile.image.dimensions() != (tile_size, tile_size) {
            return Err(TileInpaintError::dimension_mismatch(
                &format!("tile {}", tile.coord()),
                (tile_size, tile_size),
                tile.image.dimensions(),
            ));
        }
    }

    let origin = GridCoord::new(extent.min_x, extent.min_y);
    let region = extent.pixel_region_from(origin, tile_size)?;
    let pixels = u64::from(region.width) * u64::from(region.height);
    if pixels > MAX_COMPOSED_PIXELS {
        return Err(TileInpaintError::out_of_bounds(format!(
            "composed scene would be {}x{} pixels, above the {MAX_COMPOSED_PIXELS} pixel limit",
            region.width, region.height
        )));
    }
    let mut image = raster::filled(region.width, region.height, ChannelLayout::Rgba, background);
    for tile in tiles {
        let cell = GenerationBounds::single(tile.grid_x, tile.grid_y)
            .pixel_region_from(origin, tile_size)?;
        let pixels = match &tile.image {
            DynamicImage::ImageRgba8(_) => tile.image.clone(),
            other => DynamicImage::ImageRgba8(other.to_rgba8()),
        };
        raster::blit(&mut image, &pixels, cell.x, cell.y)?;
    }

    Ok(ComposedScene {
        image,
        origin,
        tile_size,
        occupied: tiles.iter().map(Tile::coord).collect(),
    })
}

/// Inclusive grid rectangle covering every tile, `None` for no tiles
fn tile_extent(tiles: &[Tile]) -> Result<Option<GenerationBounds>> {
    let Some(first) = tiles.first() else {
        return Ok(None);
    };
    let mut bounds = GenerationBounds::single(first.grid_x, first.grid_y);
    for tile in tiles {
        bounds.min_x = bounds.min_x.min(tile.grid_x);
        bounds.min_y = bounds.min_y.min(tile.grid_y);
        bounds.max_x = bounds.max_x.max(tile.grid_x);
        bounds.max_y = bounds.max_y.max(tile.grid_y);
    }
    Ok(Some(bounds))
}

/// A raster composed from tiles, anchored on the grid
#[derive(Debug, Clone)]
pub struct ComposedScene {
    /// RGBA8 raster covering the bounding rectangle of the source tiles
    pub image: DynamicImage,
    /// Grid coordinate of the raster's top-left tile
    pub origin: GridCoord,
    pub tile_size: u32,
    occupied: BTreeSet<GridCoord>,
}

impl ComposedScene {
    /// Grid rectangle covered by the raster
    #[must_use]
    pub fn bounds(&self) -> GenerationBounds {
        let (width, height) = self.image.dimensions();
        let cols = (width / self.tile_size).max(1) as i32;
        let rows = (height / self.tile_size).max(1) as i32;
        GenerationBounds {
            min_x: self.origin.x,
            min_y: self.origin.y,
            max_x: self.origin.x + cols - 1,
            max_y: self.origin.y + rows - 1,
        }
    }

    /// Whether a tile was supplied for `coord`
    #[must_use]
    pub fn is_occupied(&self, coord: GridCoord) -> bool {
        self.occupied.contains(&coord)
    }

    /// Coordinates of the supplied tiles, row-major
    pub fn occupied(&self) -> impl Iterator<Item = GridCoord> + '_ {
        let mut coords: Vec<GridCoord> = self.occupied.iter().copied().collect();
        coords.sort_by_key(|c| (c.y, c.x));
        coords.into_iter()
    }

    /// Pixel rectangle of `bounds` inside the raster
    ///
    /// # Errors
    /// - `OutOfBounds` when the bounds leave the raster
    pub fn pixel_region(&self, bounds: &GenerationBounds) -> Result<PixelRegion> {
        RasterValidator::ensure_bounds_within(&self.image, bounds, self.origin, self.tile_size)?;
        bounds.pixel_region_from(self.origin, self.tile_size)
    }

    /// Mask regenerating every cell inside `bounds` that has no supplied tile
    ///
    /// Supplied tiles are locked, so they stay preserved even inside the bounds.
    ///
    /// # Errors
    /// - `OutOfBounds` when the bounds leave the raster
    pub fn mask_for(&self, bounds: &GenerationBounds) -> Result<InpaintMask> {
        self.pixel_region(bounds)?;
        let regions = bounds
            .coords()
            .filter(|coord| !self.is_occupied(*coord))
            .map(|coord| {
                GenerationBounds::single(coord.x, coord.y)
                    .pixel_region_from(self.origin, self.tile_size)
            })
            .collect::<Result<Vec<_>>>()?;
        let (width, height) = self.image.dimensions();
        Ok(InpaintMask::from_regions(width, height, &regions))
    }

    /// Slice `bounds` out of this raster at their grid addresses
    ///
    /// # Errors
    /// Same as [`TileSlicer::slice`].
    pub fn slice(&self, bounds: &GenerationBounds) -> Result<Vec<Tile>> {
        TileSlicer::slice_with_origin(&self.image, bounds, self.origin, self.tile_size)
    }

    /// Strips of supplied tiles that border the regeneration bounds
    ///
    /// For every supplied tile outside `bounds` sharing a side with it, the
    /// `strip_width` pixels of that tile facing the bounds become one
    /// constraint. Diagonal neighbours contribute nothing. Strips wider than a
    /// tile are clamped to the tile. Constraints come out in row-major order of
    /// their source tiles.
    ///
    /// # Errors
    /// - `InvalidConfig` for a zero strip width
    /// - `OutOfBounds` when the bounds leave the raster
    pub fn edge_constraints_for(
        &self,
        bounds: &GenerationBounds,
        strip_width: u32,
    ) -> Result<Vec<EdgeConstraint>> {
        if strip_width == 0 {
            return Err(TileInpaintError::invalid_config("edge strip width must be > 0"));
        }
        self.pixel_region(bounds)?;
        let strip = strip_width.min(self.tile_size);
        let ts = self.tile_size;

        let mut constraints = Vec::new();
        for coord in self.occupied() {
            if bounds.contains(coord) {
                continue;
            }
            let Some(side) = facing_side(bounds, coord) else {
                continue;
            };
            let cell = GenerationBounds::single(coord.x, coord.y)
                .pixel_region_from(self.origin, ts)?;
            let region = match side {
                Side::Left => PixelRegion::new(cell.x + ts - strip, cell.y, strip, ts),
                Side::Right => PixelRegion::new(cell.x, cell.y, strip, ts),
                Side::Above => PixelRegion::new(cell.x, cell.y + ts - strip, ts, strip),
                Side::Below => PixelRegion::new(cell.x, cell.y, ts, strip),
            };
            constraints.push(EdgeConstraint::extract(&self.image, region)?);
        }
        debug!(count = constraints.len(), "derived locked-neighbour constraints");
        Ok(constraints)
    }
}

/// Where a neighbouring tile sits relative to the bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
    Above,
    Below,
}

fn facing_side(bounds: &GenerationBounds, coord: GridCoord) -> Option<Side> {
    let in_rows = (bounds.min_y..=bounds.max_y).contains(&coord.y);
    let in_cols = (bounds.min_x..=bounds.max_x).contains(&coord.x);
    if in_rows && i64::from(coord.x) == i64::from(bounds.min_x) - 1 {
        Some(Side::Left)
    } else if in_rows && i64::from(coord.x) == i64::from(bounds.max_x) + 1 {
        Some(Side::Right)
    } else if in_cols && i64::from(coord.y) == i64::from(bounds.min_y) - 1 {
        Some(Side::Above)
    } else if in_cols && i64::from(coord.y) == i64::from(bounds.max_y) + 1 {
        Some(Side::Below)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn solid(value: u8, size: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(size, size, Rgba([value, value, value, 255])))
    }

    #[test]
    fn test_slice_row_major_with_addresses() {
        let mut raster = RgbaImage::new(32, 32);
        for (x, y, pixel) in raster.enumerate_pixels_mut() {
            *pixel = Rgba([(x / 16) as u8, (y / 16) as u8, 0, 255]);
        }
        let image = DynamicImage::ImageRgba8(raster);
        let bounds = GenerationBounds::new(0, 0, 1, 1).unwrap();

        let tiles = TileSlicer::slice(&image, &bounds, 16).unwrap();
        let order: Vec<_> = tiles.iter().map(|t| (t.grid_x, t.grid_y)).collect();
        assert_eq!(order, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
        for tile in &tiles {
            assert_eq!(tile.image.dimensions(), (16, 16));
            assert_eq!(
                tile.image.get_pixel(5, 5),
                Rgba([tile.grid_x as u8, tile.grid_y as u8, 0, 255])
            );
        }
    }

    #[test]
    fn test_compose_rejects_oversized_scene() {
        let tiles = [
            Tile::new(0, 0, solid(1, 16)),
            Tile::new(1_000_000, 1_000_000, solid(2, 16)),
        ];
        let err = TileSlicer::compose(&tiles, 16, [0; 4]).unwrap_err();
        assert!(matches!(err, TileInpaintError::OutOfBounds(_)));

        let wide = GenerationBounds::new(0, 0, 2_000, 2_000).unwrap();
        let err = TileSlicer::compose_with_bounds(&[], &wide, 16, [0; 4]).unwrap_err();
        assert!(matches!(err, TileInpaintError::OutOfBounds(_)));
    }

    #[test]
    fn test_slice_out_of_bounds() {
        let image = solid(0, 32);
        let bounds = GenerationBounds::new(0, 0, 2, 0).unwrap();
        let err = TileSlicer::slice(&image, &bounds, 16).unwrap_err();
        assert!(matches!(err, TileInpaintError::OutOfBounds(_)));
        assert!(err.to_string().contains("48x16"));

        let negative = GenerationBounds::single(-1, 0);
        assert!(matches!(
            TileSlicer::slice(&image, &negative, 16),
            Err(TileInpaintError::OutOfBounds(_))
        ));
    }

    #[test]
    fn test_compose_negative_coordinates_round_trip() {
        let tiles = vec![
            Tile::new(-1, 0, solid(10, 4)),
            Tile::new(1, 1, solid(20, 4)),
        ];
        let scene = TileSlicer::compose(&tiles, 4, [0, 0, 0, 0]).unwrap();
        assert_eq!(scene.origin, GridCoord::new(-1, 0));
        assert_eq!(scene.image.dimensions(), (12, 8));
        assert_eq!(scene.image.get_pixel(4, 0), Rgba([0, 0, 0, 0]));

        for tile in &tiles {
            let sliced = scene
                .slice(&GenerationBounds::single(tile.grid_x, tile.grid_y))
                .unwrap();
            assert_eq!(sliced[0].image, tile.image);
        }
        assert_eq!(scene.bounds(), GenerationBounds::new(-1, 0, 1, 1).unwrap());
    }

    #[test]
    fn test_compose_converts_rgb_tiles() {
        let rgb = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])));
        let scene = TileSlicer::compose(&[Tile::new(0, 0, rgb)], 2, [0, 0, 0, 0]).unwrap();
        assert_eq!(scene.image.get_pixel(1, 1), Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn test_compose_rejects_bad_input() {
        assert!(TileSlicer::compose(&[], 16, [0; 4]).is_err());
        let err = TileSlicer::compose(&[Tile::new(0, 0, solid(0, 8))], 16, [0; 4]).unwrap_err();
        assert!(matches!(err, TileInpaintError::DimensionMismatch(_)));
    }

    #[test]
    fn test_edge_constraints_for_neighbours() {
        // Locked tiles left of, above and diagonal to the target cell (1, 1)
        let tiles = vec![
            Tile::new(0, 1, solid(10, 4)),
            Tile::new(1, 0, solid(20, 4)),
            Tile::new(0, 0, solid(30, 4)),
            Tile::new(2, 2, solid(40, 4)),
        ];
        let scene = TileSlicer::compose(&tiles, 4, [0, 0, 0, 0]).unwrap();
        let bounds = GenerationBounds::single(1, 1);

        let constraints = scene.edge_constraints_for(&bounds, 1).unwrap();
        assert_eq!(constraints.len(), 2);

        // (1, 0) comes first in row-major order: bottom row of the tile above
        assert_eq!(constraints[0].region(), PixelRegion::new(4, 3, 4, 1));
        assert_eq!(constraints[0].pixels.get_pixel(0, 0), Rgba([20, 20, 20, 255]));
        // (0, 1): right column of the tile to the left
        assert_eq!(constraints[1].region(), PixelRegion::new(3, 4, 1, 4));

        assert!(scene.edge_constraints_for(&bounds, 0).is_err());
        let wide = scene.edge_constraints_for(&bounds, 9).unwrap();
        assert_eq!(wide[0].height, 4);
    }

    #[test]
    fn test_compose_with_bounds_covers_both() {
        let tiles = vec![Tile::new(0, 0, solid(7, 4))];
        let bounds = GenerationBounds::new(1, 0, 2, 1).unwrap();
        let scene = TileSlicer::compose_with_bounds(&tiles, &bounds, 4, [0; 4]).unwrap();
        assert_eq!(scene.origin, GridCoord::new(0, 0));
        assert_eq!(scene.image.dimensions(), (12, 8));

        let empty = TileSlicer::compose_with_bounds(&[], &bounds, 4, [0; 4]).unwrap();
        assert_eq!(empty.origin, GridCoord::new(1, 0));
        assert_eq!(empty.image.dimensions(), (8, 8));
    }

    #[test]
    fn test_mask_for_skips_locked_cells() {
        let tiles = vec![Tile::new(0, 0, solid(1, 4)), Tile::new(1, 0, solid(1, 4))];
        let bounds = GenerationBounds::new(1, 0, 2, 0).unwrap();
        let scene = TileSlicer::compose_with_bounds(&tiles, &bounds, 4, [0; 4]).unwrap();

        let mask = scene.mask_for(&bounds).unwrap();
        assert!(!mask.should_regenerate(3, 0));
        assert!(!mask.should_regenerate(4, 0));
        assert!(mask.should_regenerate(8, 0));
        assert!(scene.mask_for(&GenerationBounds::single(3, 0)).is_err());
    }
}
