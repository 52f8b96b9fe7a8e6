//! Property-based tests for slicing, reconciliation and mask handling

use image::{DynamicImage, GenericImageView, GrayImage, Rgba, RgbaImage};
use proptest::prelude::*;
use std::collections::BTreeMap;
use tile_inpaint::{
    EdgeConstraint, EdgeReconciler, GenerationBounds, GenerationConfig, InpaintMask,
    InpaintingBackend, PlaceholderBackend, Tile, TileInpaintError, TileSlicer,
};

fn patterned(width: u32, height: u32, seed: u8) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        Rgba([
            seed.wrapping_add(x as u8),
            seed.wrapping_mul(3).wrapping_add(y as u8),
            seed ^ 0x5a,
            255,
        ])
    }))
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

/// Distinct grid cells with a seed byte each
fn tile_cells() -> impl Strategy<Value = BTreeMap<(i32, i32), u8>> {
    prop::collection::btree_map((-3_i32..3, -3_i32..3), any::<u8>(), 1..8)
}

/// A rectangle inside a `width × height` raster
fn region_in(width: u32, height: u32) -> impl Strategy<Value = (u32, u32, u32, u32)> {
    (0..width, 0..height).prop_flat_map(move |(x, y)| {
        (Just(x), Just(y), 1..=width - x, 1..=height - y)
    })
}

/// Raster size plus one to three rectangles inside it
fn scene_with_regions() -> impl Strategy<Value = (u32, u32, Vec<(u32, u32, u32, u32)>)> {
    (2_u32..24, 2_u32..24).prop_flat_map(|(width, height)| {
        (
            Just(width),
            Just(height),
            prop::collection::vec(region_in(width, height), 1..4),
        )
    })
}

proptest! {
    #[test]
    fn compose_then_slice_reproduces_tiles(
        cells in tile_cells(),
        tile_size in 1_u32..6,
    ) {
        let tiles: Vec<Tile> = cells
            .iter()
            .map(|(&(x, y), &seed)| Tile::new(x, y, patterned(tile_size, tile_size, seed)))
            .collect();

        let scene = TileSlicer::compose(&tiles, tile_size, [0; 4]).unwrap();
        for tile in &tiles {
            let sliced = scene.slice(&GenerationBounds::single(tile.grid_x, tile.grid_y)).unwrap();
            prop_assert_eq!(sliced.len(), 1);
            prop_assert_eq!((sliced[0].grid_x, sliced[0].grid_y), (tile.grid_x, tile.grid_y));
            prop_assert_eq!(sliced[0].image.to_rgba8(), tile.image.to_rgba8());
        }
    }

    #[test]
    fn slice_order_is_row_major(
        cols in 1_i32..5,
        rows in 1_i32..5,
        tile_size in 1_u32..5,
    ) {
        let image = patterned(cols as u32 * tile_size, rows as u32 * tile_size, 9);
        let bounds = GenerationBounds::new(0, 0, cols - 1, rows - 1).unwrap();
        let tiles = TileSlicer::slice(&image, &bounds, tile_size).unwrap();

        let order: Vec<(i32, i32)> = tiles.iter().map(|t| (t.grid_y, t.grid_x)).collect();
        let mut sorted = order.clone();
        sorted.sort_unstable();
        prop_assert_eq!(order, sorted);
        prop_assert_eq!(tiles.len() as i32, cols * rows);
    }

    #[test]
    fn oversized_bounds_are_rejected(
        width in 1_u32..40,
        height in 1_u32..40,
        tile_size in 1_u32..9,
        extra in 0_i32..3,
    ) {
        let image = patterned(width, height, 1);
        let max_x = (width / tile_size) as i32 + extra;
        let bounds = GenerationBounds::new(0, 0, max_x, 0).unwrap();
        let result = TileSlicer::slice(&image, &bounds, tile_size);
        prop_assert!(matches!(result, Err(TileInpaintError::OutOfBounds(_))));
    }

    #[test]
    fn reconciled_constraints_are_exact(
        (width, height, regions) in scene_with_regions(),
        falloff in 0_u32..5,
        seed in any::<u8>(),
    ) {
        let generated = patterned(width, height, seed);
        let constraints: Vec<EdgeConstraint> = regions
            .iter()
            .enumerate()
            .map(|(i, &(x, y, w, h))| {
                EdgeConstraint::from_image(x, y, patterned(w, h, seed.wrapping_add(40 * i as u8 + 1)))
            })
            .collect();

        let result = EdgeReconciler::new(falloff)
            .reconcile(&generated, &constraints, None)
            .unwrap();

        // Every constrained pixel carries the last constraint covering it
        for y in 0..height {
            for x in 0..width {
                let owner = constraints.iter().rev().find(|c| c.region().contains(x, y));
                if let Some(c) = owner {
                    prop_assert_eq!(result.get_pixel(x, y), c.pixels.get_pixel(x - c.x, y - c.y));
                }
            }
        }
    }

    #[test]
    fn overlap_takes_later_constraint(
        size in 5_u32..16,
        offset in 1_u32..3,
        falloff in 0_u32..4,
    ) {
        let generated = patterned(size, size, 0);
        let a = EdgeConstraint::from_image(0, 0, patterned(3, 3, 100));
        let b = EdgeConstraint::from_image(offset, offset, patterned(3, 3, 200));

        let result = EdgeReconciler::new(falloff)
            .reconcile(&generated, &[a, b.clone()], None)
            .unwrap();

        for y in offset..3 {
            for x in offset..3 {
                prop_assert_eq!(result.get_pixel(x, y), b.pixels.get_pixel(x - offset, y - offset));
            }
        }
    }

    #[test]
    fn only_masked_pixels_change(
        (width, height) in (1_u32..20, 1_u32..20),
        values in prop::collection::vec(any::<u8>(), 400),
        seed in any::<u8>(),
    ) {
        let image = patterned(width, height, seed);
        let mask = InpaintMask::new(GrayImage::from_fn(width, height, |x, y| {
            image::Luma([values[(y * 20 + x) as usize]])
        }));
        let config = GenerationConfig::builder().prompt("moss").build().unwrap();

        let output = block_on(PlaceholderBackend::new().generate(&image, &mask, &config)).unwrap();

        prop_assert_eq!(output.dimensions(), image.dimensions());
        for y in 0..height {
            for x in 0..width {
                let value = values[(y * 20 + x) as usize];
                if value <= 128 {
                    prop_assert_eq!(output.get_pixel(x, y), image.get_pixel(x, y));
                } else {
                    prop_assert_eq!(output.get_pixel(x, y), Rgba([255, 0, 255, 255]));
                }
            }
        }
    }
}
