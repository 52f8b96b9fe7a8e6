//! Configuration types for tile generation

use crate::error::{Result, TileInpaintError};
use serde::{Deserialize, Serialize};

/// Default tile edge length in pixels
pub const DEFAULT_TILE_SIZE: u32 = 16;

/// Default width of the seam blend outside each edge constraint
pub const DEFAULT_EDGE_FALLOFF: u32 = 3;

/// Largest accepted step count
pub const MAX_STEPS: u32 = 150;

/// Generation parameters handed to the inpainting backend
///
/// Immutable for the duration of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Description of what to generate
    pub prompt: String,

    /// Things the backend should avoid
    pub negative_prompt: Option<String>,

    /// Style keywords placed in front of the prompt
    pub keywords: Vec<String>,

    /// Number of denoising steps
    pub steps: u32,

    /// Classifier-free guidance scale
    pub guidance_scale: f32,

    /// Deterministic seed (None = backend picks one)
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: None,
            keywords: Vec::new(),
            steps: 20,
            guidance_scale: 7.5,
            seed: None,
        }
    }
}

impl GenerationConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use tile_inpaint::GenerationConfig;
    ///
    /// let config = GenerationConfig::builder()
    ///     .prompt("mossy stone wall")
    ///     .keyword("pixel art")
    ///     .steps(30)
    ///     .seed(42)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.effective_prompt(), "pixel art mossy stone wall");
    /// ```
    #[must_use]
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder::new()
    }

    /// Keywords then prompt, joined by single spaces
    ///
    /// Blank parts are skipped and each part is trimmed, so the result is empty
    /// only when every part is blank.
    #[must_use]
    pub fn effective_prompt(&self) -> String {
        self.keywords
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.prompt.as_str()))
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Negative prompt with blank values treated as absent
    #[must_use]
    pub fn effective_negative_prompt(&self) -> Option<&str> {
        self.negative_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    /// Validate numeric parameters
    ///
    /// The prompt is not checked here: an empty effective prompt is a
    /// generation failure reported by the backend.
    ///
    /// # Errors
    /// - `InvalidConfig` for steps outside `1..=150` or a non-positive guidance scale
    pub fn validate(&self) -> Result<()> {
        if self.steps == 0 || self.steps > MAX_STEPS {
            return Err(TileInpaintError::invalid_config(format!(
                "Invalid steps: {} (valid range: 1-{MAX_STEPS})",
                self.steps
            )));
        }
        if !self.guidance_scale.is_finite() || self.guidance_scale <= 0.0 {
            return Err(TileInpaintError::invalid_config(format!(
                "Invalid guidance scale: {} (must be finite and > 0)",
                self.guidance_scale
            )));
        }
        Ok(())
    }
}

/// Builder for [`GenerationConfig`]
pub struct GenerationConfigBuilder {
    config: GenerationConfig,
}

impl GenerationConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: GenerationConfig::default(),
        }
    }

    #[must_use]
    pub fn prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.config.prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn negative_prompt<S: Into<String>>(mut self, negative_prompt: S) -> Self {
        self.config.negative_prompt = Some(negative_prompt.into());
        self
    }

    #[must_use]
    pub fn keyword<S: Into<String>>(mut self, keyword: S) -> Self {
        self.config.keywords.push(keyword.into());
        self
    }

    #[must_use]
    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn steps(mut self, steps: u32) -> Self {
        self.config.steps = steps;
        self
    }

    #[must_use]
    pub fn guidance_scale(mut self, guidance_scale: f32) -> Self {
        self.config.guidance_scale = guidance_scale;
        self
    }

    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Build the generation configuration
    ///
    /// # Errors
    /// - `InvalidConfig` when [`GenerationConfig::validate`] fails
    pub fn build(self) -> Result<GenerationConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for GenerationConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-pipeline configuration owned by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Tile edge length in pixels
    pub tile_size: u32,

    /// Width in pixels of the seam blend outside each edge constraint (0 = raw overwrite)
    pub edge_falloff: u32,

    /// RGBA fill for grid cells without a tile when composing a scene
    pub background: [u8; 4],

    /// Check bounds and edge constraints before running the backend
    pub validate_eagerly: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            edge_falloff: DEFAULT_EDGE_FALLOFF,
            background: [0, 0, 0, 0],
            validate_eagerly: true,
        }
    }
}

impl PipelineConfig {
    /// Create a new pipeline configuration builder
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    /// # Errors
    /// - `InvalidConfig` for a zero tile size or a falloff of a full tile or more
    pub fn validate(&self) -> Result<()> {
        if self.tile_size == 0 {
            return Err(TileInpaintError::invalid_config("tile size must be > 0"));
        }
        if self.edge_falloff >= self.tile_size {
            return Err(TileInpaintError::invalid_config(format!(
                "Invalid edge falloff: {} (valid range: 0-{})",
                self.edge_falloff,
                self.tile_size - 1
            )));
        }
        Ok(())
    }
}

/// Builder for [`PipelineConfig`]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    #[must_use]
    pub fn tile_size(mut self, tile_size: u32) -> Self {
        self.config.tile_size = tile_size;
        self
    }

    #[must_use]
    pub fn edge_falloff(mut self, pixels: u32) -> Self {
        self.config.edge_falloff = pixels;
        self
    }

    #[must_use]
    pub fn background(mut self, rgba: [u8; 4]) -> Self {
        self.config.background = rgba;
        self
    }

    #[must_use]
    pub fn validate_eagerly(mut self, eager: bool) -> Self {
        self.config.validate_eagerly = eager;
        self
    }

    /// Build the pipeline configuration
    ///
    /// # Errors
    /// - `InvalidConfig` when [`PipelineConfig::validate`] fails
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection settings for a stable-diffusion-webui compatible inpainting service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteBackendConfig {
    /// Service root, e.g. `http://127.0.0.1:7860`
    pub base_url: String,

    /// Whole-request timeout in seconds
    pub timeout_secs: u64,

    /// How far the service may move away from the source pixels (0.0 - 1.0)
    pub denoising_strength: f32,

    /// Sampler name understood by the service
    pub sampler: String,
}

impl Default for RemoteBackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:7860".to_string(),
            timeout_secs: 120,
            denoising_strength: 0.75,
            sampler: "Euler a".to_string(),
        }
    }
}

impl RemoteBackendConfig {
    /// # Errors
    /// - `InvalidConfig` for an empty URL, a zero timeout or a strength outside `0.0..=1.0`
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(TileInpaintError::invalid_config("remote base URL is empty"));
        }
        if self.timeout_secs == 0 {
            return Err(TileInpaintError::invalid_config("remote timeout must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.denoising_strength) {
            return Err(TileInpaintError::invalid_config(format!(
                "Invalid denoising strength: {} (valid range: 0.0-1.0)",
                self.denoising_strength
            )));
        }
        Ok(())
    }

    /// Base URL without a trailing slash
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

/// Settings for the local ONNX inpainting model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnnxBackendConfig {
    /// Model file location
    pub model_path: std::path::PathBuf,

    /// Expected lowercase hex SHA-256 of the model file
    pub sha256: Option<String>,

    /// Number of intra-op threads (0 = auto)
    pub intra_threads: usize,

    /// Square input resolution the model was exported with
    pub input_size: u32,
}

impl Default for OnnxBackendConfig {
    fn default() -> Self {
        Self {
            model_path: Self::default_model_path(),
            sha256: None,
            intra_threads: 0,
            input_size: 512,
        }
    }
}

impl OnnxBackendConfig {
    /// `<cache dir>/tile-inpaint/models/lama.onnx`, falling back to the working directory
    #[must_use]
    pub fn default_model_path() -> std::path::PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join("tile-inpaint")
            .join("models")
            .join("lama.onnx")
    }
}
