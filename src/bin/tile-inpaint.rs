//! Tile generation CLI tool
//!
//! Regenerates a region of a tile grid through the tile-inpaint pipeline and
//! writes the resulting tiles as PNG files.

#[cfg(feature = "cli")]
use tile_inpaint::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
