#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Tile Inpaint
//!
//! Regenerates a region of a tile grid with AI-generated content while keeping
//! the result pixel-exact against already locked neighbouring tiles.
//!
//! A request flows through four steps:
//! 1. **Compose** locked tiles into a scene raster ([`TileSlicer::compose`])
//! 2. **Inpaint** the masked region with an [`InpaintingBackend`]
//! 3. **Reconcile** edges so every locked strip is reproduced exactly
//!    ([`EdgeReconciler`]), with a short linear blend hiding the seam
//! 4. **Slice** the result back into grid-addressed tiles, row-major
//!
//! ## Features
//!
//! - **Pluggable backends**: deterministic placeholder, a remote
//!   stable-diffusion-webui compatible service, and a local ONNX model
//! - **Availability-based selection**: pick the first backend that can run
//! - **Cancellation**: abort an in-flight request without partial output
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tile_inpaint::{
//!     GenerationBounds, GenerationConfig, GenerationPipeline, GenerationRequest, InpaintMask,
//! };
//!
//! # async fn example(scene: image::DynamicImage) -> anyhow::Result<()> {
//! let (width, height) = (32, 16);
//! let bounds = GenerationBounds::new(1, 0, 1, 0)?;
//! let mask = InpaintMask::from_bounds(width, height, &bounds, 16)?;
//! let config = GenerationConfig::builder()
//!     .keyword("pixel art")
//!     .prompt("mossy stone wall")
//!     .build()?;
//!
//! let pipeline = GenerationPipeline::placeholder();
//! let outcome = pipeline
//!     .generate(&GenerationRequest::new(scene, mask, config, bounds))
//!     .await;
//! for tile in &outcome.tiles {
//!     tile.image.save(format!("tile_{}_{}.png", tile.grid_x, tile.grid_y))?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `remote` (default): HTTP inpainting backend (`reqwest`)
//! - `cli` (default): the `tile-inpaint` binary and its tracing setup
//! - `onnx`: local ONNX Runtime inpainting backend
//! - `tracing-json`: JSON log output for the CLI

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod reconcile;
pub mod services;
pub mod tiling;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

use std::sync::Arc;

// Public API exports
pub use backends::{
    select_available, BackendFactory, BackendKind, DefaultBackendFactory, InpaintingBackend,
    PlaceholderBackend, DEFAULT_SENTINEL,
};
#[cfg(feature = "onnx")]
pub use backends::OnnxInpaintBackend;
#[cfg(feature = "remote")]
pub use backends::RemoteBackend;
pub use config::{
    GenerationConfig, GenerationConfigBuilder, OnnxBackendConfig, PipelineConfig,
    PipelineConfigBuilder, RemoteBackendConfig, DEFAULT_EDGE_FALLOFF, DEFAULT_TILE_SIZE,
};
pub use error::{ErrorKind, Result, TileInpaintError};
pub use pipeline::{GenerationPipeline, GenerationRequest};
pub use reconcile::EdgeReconciler;
pub use services::{
    ImageCodec, NoOpProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
    TracingProgressReporter,
};
pub use tiling::{ComposedScene, TileSlicer, MAX_COMPOSED_PIXELS};
pub use types::{
    ChannelLayout, EdgeConstraint, GenerationBounds, GenerationOutcome, GenerationTimings,
    GridCoord, InpaintMask, MaskStatistics, PixelRegion, Tile,
};
pub use utils::{replace_transparent_color, ColorKey};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Regenerate `bounds` around a set of locked tiles
///
/// Composes the locked tiles into a scene (growing it to cover `bounds`),
/// masks every unlocked cell of `bounds`, derives edge constraints from the
/// locked tiles bordering `bounds` and runs the pipeline over `backend`.
/// Tiles of `bounds` that were supplied as locked are returned unchanged.
///
/// # Examples
/// ```rust,no_run
/// use std::sync::Arc;
/// use tile_inpaint::{
///     generate_around_locked_tiles, GenerationBounds, GenerationConfig, PlaceholderBackend,
///     Tile,
/// };
///
/// # async fn example(locked: Vec<Tile>) -> anyhow::Result<()> {
/// let bounds = GenerationBounds::new(1, 0, 2, 0)?;
/// let config = GenerationConfig::builder().prompt("sand dunes").build()?;
/// let tiles = generate_around_locked_tiles(
///     Arc::new(PlaceholderBackend::new()),
///     &locked,
///     bounds,
///     config,
///     16,
/// )
/// .await?;
/// assert_eq!(tiles.len(), 2);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// Any error raised while composing, generating, reconciling or slicing.
pub async fn generate_around_locked_tiles(
    backend: Arc<dyn InpaintingBackend>,
    locked: &[Tile],
    bounds: GenerationBounds,
    config: GenerationConfig,
    tile_size: u32,
) -> Result<Vec<Tile>> {
    let pipeline_config = PipelineConfig::builder().tile_size(tile_size).build()?;
    let scene =
        TileSlicer::compose_with_bounds(locked, &bounds, tile_size, pipeline_config.background)?;
    let request =
        GenerationRequest::from_scene(&scene, bounds, config, pipeline_config.edge_falloff.max(1))?;
    GenerationPipeline::with_config(backend, pipeline_config)?
        .run(&request)
        .await
}

/// Decode a data-URL request and return PNG data URLs per tile
///
/// This is the shape transport layers exchange: base64 scene and mask in,
/// `(grid_x, grid_y, data URL)` triples out, row-major.
///
/// # Errors
/// Decode errors for the inputs, then any pipeline error.
pub async fn generate_encoded_tiles(
    backend: Arc<dyn InpaintingBackend>,
    scene_image: &str,
    mask: &str,
    config: GenerationConfig,
    bounds: GenerationBounds,
    tile_size: u32,
) -> Result<Vec<(i32, i32, String)>> {
    let scene = ImageCodec::decode_normalized(scene_image)?;
    let mask = InpaintMask::from_image(&ImageCodec::decode(mask)?);
    let request = GenerationRequest::new(scene, mask, config, bounds).with_tile_size(tile_size);

    GenerationPipeline::new(backend)
        .run(&request)
        .await?
        .into_iter()
        .map(|tile| Ok((tile.grid_x, tile.grid_y, tile.to_data_url()?)))
        .collect()
}
