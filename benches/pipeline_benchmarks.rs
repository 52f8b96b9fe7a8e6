use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use std::sync::Arc;
use tile_inpaint::{
    EdgeConstraint, EdgeReconciler, GenerationBounds, GenerationConfig, GenerationPipeline,
    GenerationRequest, InpaintMask, PlaceholderBackend, Tile, TileSlicer,
};
use tokio::runtime::Runtime;

const TILE_SIZE: u32 = 16;

fn scene(tiles_per_side: u32) -> DynamicImage {
    let side = tiles_per_side * TILE_SIZE;
    DynamicImage::ImageRgba8(RgbaImage::from_fn(side, side, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
    }))
}

/// One strip per tile column along the top edge and per tile row along the left edge
fn border_constraints(tiles_per_side: u32) -> Vec<EdgeConstraint> {
    let strip = DynamicImage::ImageRgba8(RgbaImage::from_pixel(TILE_SIZE, 2, Rgba([9, 9, 9, 255])));
    let column = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, TILE_SIZE, Rgba([9, 9, 9, 255])));
    (0..tiles_per_side)
        .flat_map(|i| {
            [
                EdgeConstraint::from_image(i * TILE_SIZE, 0, strip.clone()),
                EdgeConstraint::from_image(0, i * TILE_SIZE, column.clone()),
            ]
        })
        .collect()
}

fn benchmark_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    for tiles_per_side in [2_u32, 8, 16] {
        let image = scene(tiles_per_side);
        let constraints = border_constraints(tiles_per_side);
        for falloff in [0_u32, 3] {
            let reconciler = EdgeReconciler::new(falloff);
            group.bench_with_input(
                BenchmarkId::new(format!("falloff_{falloff}"), tiles_per_side),
                &tiles_per_side,
                |b, _| {
                    b.iter(|| {
                        reconciler
                            .reconcile(black_box(&image), black_box(&constraints), None)
                            .unwrap()
                    });
                },
            );
        }
    }
    group.finish();
}

fn benchmark_slice_compose(c: &mut Criterion) {
    let mut group = c.benchmark_group("tiling");
    for tiles_per_side in [2_u32, 8, 16] {
        let image = scene(tiles_per_side);
        let max = tiles_per_side as i32 - 1;
        let bounds = GenerationBounds::new(0, 0, max, max).unwrap();

        group.bench_with_input(BenchmarkId::new("slice", tiles_per_side), &bounds, |b, bounds| {
            b.iter(|| TileSlicer::slice(black_box(&image), bounds, TILE_SIZE).unwrap());
        });

        let tiles: Vec<Tile> = TileSlicer::slice(&image, &bounds, TILE_SIZE).unwrap();
        group.bench_with_input(BenchmarkId::new("compose", tiles_per_side), &tiles, |b, tiles| {
            b.iter(|| TileSlicer::compose(black_box(tiles), TILE_SIZE, [0; 4]).unwrap());
        });
    }
    group.finish();
}

fn benchmark_placeholder_pipeline(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let pipeline = GenerationPipeline::new(Arc::new(PlaceholderBackend::new()));
    let tiles_per_side = 8;
    let side = tiles_per_side * TILE_SIZE;
    let request = GenerationRequest::new(
        scene(tiles_per_side),
        InpaintMask::new(GrayImage::from_fn(side, side, |x, _| {
            Luma([if x >= side / 2 { 255 } else { 0 }])
        })),
        GenerationConfig::builder().prompt("benchmark").build().unwrap(),
        GenerationBounds::new(0, 0, tiles_per_side as i32 - 1, tiles_per_side as i32 - 1).unwrap(),
    )
    .with_locked_edges(border_constraints(tiles_per_side));

    c.bench_function("pipeline_placeholder_8x8", |b| {
        b.iter(|| rt.block_on(pipeline.run(black_box(&request))).unwrap());
    });
}

criterion_group!(
    benches,
    benchmark_reconcile,
    benchmark_slice_compose,
    benchmark_placeholder_pipeline
);
criterion_main!(benches);
