//! JSON request files accepted by `tile-inpaint generate`
//!
//! The schema is the camelCase shape HTTP transports use: images travel as
//! PNG data URLs (or bare base64) and bounds are inclusive grid coordinates.

use crate::{
    config::{GenerationConfig, DEFAULT_TILE_SIZE},
    error::{Result, TileInpaintError},
    pipeline::GenerationRequest,
    services::{normalize_layout, ImageCodec},
    types::{ChannelLayout, EdgeConstraint, GenerationBounds, GridCoord, InpaintMask},
};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// One locked strip as it appears on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConstraintSpec {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Base64 pixel data: either a tightly packed buffer in the scene's
    /// channel layout or an encoded image
    pub pixels: String,
}

impl EdgeConstraintSpec {
    /// Decode into a constraint matching the scene's channel layout
    ///
    /// Payloads starting with the PNG signature are always decoded as images,
    /// even when their length happens to match a raw buffer.
    ///
    /// # Errors
    /// - `Decode` for invalid base64
    /// - `Image` when the payload is neither a raw buffer nor an image
    pub fn decode(&self, layout: ChannelLayout) -> Result<EdgeConstraint> {
        let bytes = ImageCodec::decode_bytes(&self.pixels)?;
        let raw_len = self.width as usize * self.height as usize * layout.channels();
        if !bytes.starts_with(&PNG_SIGNATURE) && bytes.len() == raw_len {
            return EdgeConstraint::from_raw(
                self.x,
                self.y,
                self.width,
                self.height,
                layout,
                bytes,
            );
        }

        let decoded = normalize_layout(image::load_from_memory(&bytes)?);
        let pixels = match layout {
            ChannelLayout::Rgb => DynamicImage::ImageRgb8(decoded.to_rgb8()),
            ChannelLayout::Rgba => DynamicImage::ImageRgba8(decoded.to_rgba8()),
        };
        Ok(EdgeConstraint::new(
            self.x,
            self.y,
            self.width,
            self.height,
            pixels,
        ))
    }
}

/// Generation request file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFile {
    pub scene_image: String,
    /// White marks pixels to regenerate
    pub mask: String,
    #[serde(default)]
    pub locked_edges: Vec<EdgeConstraintSpec>,
    pub prompt: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
    pub bounds: GenerationBounds,
    /// Grid coordinate of the scene's top-left tile
    #[serde(default)]
    pub origin: Option<GridCoord>,
    #[serde(default)]
    pub steps: Option<u32>,
    #[serde(default)]
    pub guidance_scale: Option<f32>,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_tile_size() -> u32 {
    DEFAULT_TILE_SIZE
}

impl RequestFile {
    /// Read and parse a request file
    ///
    /// # Errors
    /// - `Io` when the file cannot be read
    /// - `InvalidConfig` when the JSON does not match the schema
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// # Errors
    /// - `InvalidConfig` when the JSON does not match the schema
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| TileInpaintError::invalid_config(format!("malformed request: {e}")))
    }

    /// Generation parameters carried by the request
    ///
    /// # Errors
    /// - `InvalidConfig` when steps or guidance are out of range
    pub fn generation_config(&self) -> Result<GenerationConfig> {
        let mut builder = GenerationConfig::builder()
            .prompt(self.prompt.clone())
            .keywords(self.keywords.iter().cloned());
        if let Some(negative) = &self.negative_prompt {
            builder = builder.negative_prompt(negative.clone());
        }
        if let Some(steps) = self.steps {
            builder = builder.steps(steps);
        }
        if let Some(guidance) = self.guidance_scale {
            builder = builder.guidance_scale(guidance);
        }
        if let Some(seed) = self.seed {
            builder = builder.seed(seed);
        }
        builder.build()
    }

    /// Decode every image and build the pipeline request
    ///
    /// # Errors
    /// Any decode, validation or configuration error in the request.
    pub fn into_request(self) -> Result<GenerationRequest> {
        let generation = self.generation_config()?;
        let scene = ImageCodec::decode_normalized(&self.scene_image)?;
        let layout = ChannelLayout::of(&scene)?;
        let mask = InpaintMask::from_image(&ImageCodec::decode(&self.mask)?);
        let locked_edges = self
            .locked_edges
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                spec.decode(layout).map_err(|e| {
                    TileInpaintError::invalid_constraint(format!(
                        "lockedEdges[{index}]: {}",
                        e.message()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(GenerationRequest::new(scene, mask, generation, self.bounds)
            .with_origin(self.origin.unwrap_or_default())
            .with_locked_edges(locked_edges)
            .with_tile_size(self.tile_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::raster;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use image::GenericImageView;

    fn scene_url() -> String {
        ImageCodec::encode_data_url(&raster::filled(32, 16, ChannelLayout::Rgba, [1, 2, 3, 255]))
            .unwrap()
    }

    fn mask_url() -> String {
        ImageCodec::encode_data_url(&DynamicImage::ImageLuma8(image::GrayImage::from_pixel(
            32,
            16,
            image::Luma([255]),
        )))
        .unwrap()
    }

    fn request_json(edges: &str) -> String {
        format!(
            r#"{{
                "sceneImage": "{}",
                "mask": "{}",
                "lockedEdges": {edges},
                "prompt": "grass",
                "keywords": ["pixel art"],
                "bounds": {{"minX": 0, "minY": 0, "maxX": 1, "maxY": 0}}
            }}"#,
            scene_url(),
            mask_url()
        )
    }

    #[test]
    fn test_parses_camel_case_request() {
        let file = RequestFile::from_json(&request_json("[]")).unwrap();
        assert_eq!(file.tile_size, 16);
        assert_eq!(file.bounds, GenerationBounds::new(0, 0, 1, 0).unwrap());
        assert_eq!(
            file.generation_config().unwrap().effective_prompt(),
            "pixel art grass"
        );

        let request = file.into_request().unwrap();
        assert_eq!(request.scene.dimensions(), (32, 16));
        assert_eq!(request.mask.dimensions(), (32, 16));
        assert!(request.mask.should_regenerate(5, 5));
        assert_eq!(request.tile_size, Some(16));
    }

    #[test]
    fn test_raw_and_encoded_edge_pixels() {
        let raw = STANDARD.encode([9_u8; 2 * 4]);
        let png = ImageCodec::encode_data_url(&raster::filled(
            1,
            2,
            ChannelLayout::Rgb,
            [7, 7, 7, 255],
        ))
        .unwrap();
        let edges = format!(
            r#"[{{"x": 0, "y": 0, "width": 1, "height": 2, "pixels": "{raw}"}},
                {{"x": 5, "y": 0, "width": 1, "height": 2, "pixels": "{png}"}}]"#
        );

        let request = RequestFile::from_json(&request_json(&edges))
            .unwrap()
            .into_request()
            .unwrap();

        assert_eq!(request.locked_edges.len(), 2);
        assert_eq!(request.locked_edges[0].pixels.get_pixel(0, 1).0, [9, 9, 9, 9]);
        assert_eq!(
            request.locked_edges[1].pixels.get_pixel(0, 0).0,
            [7, 7, 7, 255]
        );
    }

    #[test]
    fn test_png_payload_with_raw_buffer_length_is_decoded_as_image() {
        let (width, png) = (1..64_u32)
            .map(|width| {
                let image = raster::filled(width, 1, ChannelLayout::Rgba, [width as u8, 3, 5, 255]);
                (width, ImageCodec::encode_png_bytes(&image).unwrap())
            })
            .find(|(_, png)| png.len() % 4 == 0)
            .expect("some small PNG has a length divisible by four");

        let spec = EdgeConstraintSpec {
            x: 0,
            y: 0,
            width: (png.len() / 4) as u32,
            height: 1,
            pixels: STANDARD.encode(&png),
        };
        let constraint = spec.decode(ChannelLayout::Rgba).unwrap();

        assert_eq!(constraint.pixels.dimensions(), (width, 1));
        assert_eq!(constraint.pixels.get_pixel(0, 0).0, [width as u8, 3, 5, 255]);
    }

    #[test]
    fn test_malformed_requests() {
        let err = RequestFile::from_json("{\"prompt\": 3}").unwrap_err();
        assert!(matches!(err, TileInpaintError::InvalidConfig(_)));

        let edges = r#"[{"x": 0, "y": 0, "width": 1, "height": 1, "pixels": "!!"}]"#;
        let err = RequestFile::from_json(&request_json(edges))
            .unwrap()
            .into_request()
            .unwrap_err();
        assert!(err.to_string().contains("lockedEdges[0]"));
    }
}
