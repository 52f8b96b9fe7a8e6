//! Color-key transparency and color parsing

use crate::error::{Result, TileInpaintError};
use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};

/// Magenta, the conventional "transparent" color of generated pixel art
pub const DEFAULT_TRANSPARENT_KEY: ColorKey = ColorKey::new(255, 0, 255);

/// An RGB color treated as transparent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColorKey {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ColorKey {
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` or `#RGB` (the `#` is optional)
    ///
    /// # Errors
    /// - `InvalidConfig` for any other format
    pub fn parse_hex(hex: &str) -> Result<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TileInpaintError::invalid_config(format!(
                "'{hex}' is not a hex color"
            )));
        }

        let component = |range: std::ops::Range<usize>| -> Result<u8> {
            hex.get(range)
                .and_then(|digits| u8::from_str_radix(digits, 16).ok())
                .ok_or_else(|| TileInpaintError::invalid_config(format!("invalid hex color '{hex}'")))
        };

        match hex.len() {
            6 => Ok(Self::new(component(0..2)?, component(2..4)?, component(4..6)?)),
            3 => Ok(Self::new(
                component(0..1)? * 17,
                component(1..2)? * 17,
                component(2..3)? * 17,
            )),
            _ => Err(TileInpaintError::invalid_config(
                "Color must be in #RRGGBB or #RGB format",
            )),
        }
    }

    /// Lowercase `#rrggbb` form
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    #[must_use]
    pub fn matches(&self, rgb: [u8; 3]) -> bool {
        rgb == [self.r, self.g, self.b]
    }
}

impl Default for ColorKey {
    fn default() -> Self {
        DEFAULT_TRANSPARENT_KEY
    }
}

/// Replace a keyed color with real alpha transparency
///
/// The image is converted to RGBA first; every pixel whose RGB equals `key`
/// gets alpha 0 and keeps its color channels. Other pixels are untouched.
#[must_use]
pub fn replace_transparent_color(image: &DynamicImage, key: ColorKey) -> RgbaImage {
    let mut rgba = image.to_rgba8();
    for pixel in rgba.pixels_mut() {
        if key.matches([pixel[0], pixel[1], pixel[2]]) {
            pixel[3] = 0;
        }
    }
    rgba
}
