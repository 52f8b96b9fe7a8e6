//! Utility modules for raster operations
//!
//! Pure functions shared by the backends, edge reconciliation and the tiling
//! slicer. None of them hold state.

pub mod color;
pub mod edges;
pub mod mask;
pub mod raster;
pub mod validation;

// Re-export commonly used items for convenience
pub use color::{replace_transparent_color, ColorKey, DEFAULT_TRANSPARENT_KEY};
pub use edges::extract_edge_pixels;
pub use mask::rasterize_regions;
pub use validation::RasterValidator;
