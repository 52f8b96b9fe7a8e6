//! ONNX Runtime inpainting backend
//!
//! Runs a LaMa-style model that takes an RGB image tensor `[1, 3, S, S]` in
//! `0.0..=1.0` and a binary mask tensor `[1, 1, S, S]`, and returns an RGB
//! tensor `[1, 3, S, S]`. Inputs are resized to the model resolution and the
//! output is resized back, then merged so only masked pixels change.
//!
//! The session is shared by all requests and guarded by a mutex; inference
//! runs on the blocking thread pool so it never stalls the async runtime.

use crate::{
    backends::{check_generation_inputs, keep_unmasked, BackendKind, InpaintingBackend},
    config::{GenerationConfig, OnnxBackendConfig},
    error::{Result, TileInpaintError},
    types::InpaintMask,
};
use async_trait::async_trait;
use image::{
    imageops::{self, FilterType},
    DynamicImage, GenericImageView, GrayImage, Rgb, RgbImage,
};
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

/// Local model-backed inpainting
#[derive(Debug)]
pub struct OnnxInpaintBackend {
    session: Option<Arc<Mutex<Session>>>,
    config: OnnxBackendConfig,
    load_error: Option<String>,
}

impl OnnxInpaintBackend {
    /// Load the configured model
    ///
    /// A missing, corrupt or unloadable model does not fail construction: the
    /// backend reports itself unavailable and `generate` returns
    /// `BackendUnavailable` with the load error.
    #[must_use]
    pub fn new(config: OnnxBackendConfig) -> Self {
        match Self::load_session(&config) {
            Ok(session) => {
                info!(model = %config.model_path.display(), "ONNX inpainting model loaded");
                Self {
                    session: Some(Arc::new(Mutex::new(session))),
                    config,
                    load_error: None,
                }
            },
            Err(e) => {
                warn!(model = %config.model_path.display(), error = %e, "ONNX inpainting model unavailable");
                Self {
                    session: None,
                    config,
                    load_error: Some(e.message()),
                }
            },
        }
    }

    #[must_use]
    pub fn config(&self) -> &OnnxBackendConfig {
        &self.config
    }

    /// Why the model could not be loaded, if it could not
    #[must_use]
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    fn load_session(config: &OnnxBackendConfig) -> Result<Session> {
        if config.input_size == 0 {
            return Err(TileInpaintError::invalid_config("model input size must be > 0"));
        }
        let path = config.model_path.as_path();
        if !path.is_file() {
            return Err(TileInpaintError::backend_unavailable(format!(
                "model file not found: {}",
                path.display()
            )));
        }
        if let Some(expected) = &config.sha256 {
            verify_checksum(path, expected)?;
        }

        let intra_threads = intra_thread_count(config.intra_threads);

        Session::builder()
            .map_err(|e| {
                TileInpaintError::backend_unavailable(format!(
                    "Failed to create session builder: {e}"
                ))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                TileInpaintError::backend_unavailable(format!(
                    "Failed to set optimization level: {e}"
                ))
            })?
            .with_intra_threads(intra_threads)
            .map_err(|e| {
                TileInpaintError::backend_unavailable(format!("Failed to set intra threads: {e}"))
            })?
            .commit_from_file(path)
            .map_err(|e| {
                TileInpaintError::backend_unavailable(format!(
                    "Failed to create session from model file: {e}"
                ))
            })
    }
}

fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    let contents = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&contents);
    let actual = format!("{:x}", hasher.finalize());
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(TileInpaintError::backend_unavailable(format!(
            "model checksum mismatch for {}: expected {expected}, got {actual}",
            path.display()
        )))
    }
}

/// Image and mask tensors at model resolution
fn to_tensors(image: &DynamicImage, mask: &InpaintMask, size: u32) -> (Array4<f32>, Array4<f32>) {
    let rgb = imageops::resize(&image.to_rgb8(), size, size, FilterType::Triangle);
    let binary = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        image::Luma([if mask.should_regenerate(x, y) { 255 } else { 0 }])
    });
    let binary = imageops::resize(&binary, size, size, FilterType::Nearest);

    let side = size as usize;
    let mut image_tensor = Array4::<f32>::zeros((1, 3, side, side));
    let mut mask_tensor = Array4::<f32>::zeros((1, 1, side, side));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let (xi, yi) = (x as usize, y as usize);
        for channel in 0..3 {
            image_tensor[[0, channel, yi, xi]] = f32::from(pixel.0[channel]) / 255.0;
        }
    }
    for (x, y, pixel) in binary.enumerate_pixels() {
        if pixel.0[0] > 0 {
            mask_tensor[[0, 0, y as usize, x as usize]] = 1.0;
        }
    }
    (image_tensor, mask_tensor)
}

/// Convert an NCHW RGB output back into an image
///
/// Exports differ in output range; values are treated as `0.0..=1.0` when none
/// exceeds 1.0 and as `0.0..=255.0` otherwise.
fn from_output(shape: &[usize], data: &[f32]) -> Result<RgbImage> {
    let [1, 3, height, width] = shape else {
        return Err(TileInpaintError::generation_failure(format!(
            "expected a [1, 3, H, W] output tensor, got {shape:?}"
        )));
    };
    let (height, width) = (*height, *width);
    if data.len() != 3 * height * width {
        return Err(TileInpaintError::generation_failure(
            "output tensor length does not match its shape",
        ));
    }
    let scale = if data.iter().all(|v| *v <= 1.0) { 255.0 } else { 1.0 };
    let plane = height * width;
    let sample = |channel: usize, index: usize| -> u8 {
        let value = data.get(channel * plane + index).copied().unwrap_or(0.0);
        (value * scale).round().clamp(0.0, 255.0) as u8
    };
    Ok(RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let index = y as usize * width + x as usize;
        Rgb([sample(0, index), sample(1, index), sample(2, index)])
    }))
}

#[async_trait]
impl InpaintingBackend for OnnxInpaintBackend {
    #[instrument(skip_all, fields(backend = "onnx"))]
    async fn generate(
        &self,
        image: &DynamicImage,
        mask: &InpaintMask,
        config: &GenerationConfig,
    ) -> Result<DynamicImage> {
        check_generation_inputs(image, mask, config)?;
        let session = self.session.as_ref().map(Arc::clone).ok_or_else(|| {
            TileInpaintError::backend_unavailable(
                self.load_error
                    .clone()
                    .unwrap_or_else(|| "ONNX model not loaded".to_string()),
            )
        })?;

        let (image_tensor, mask_tensor) = to_tensors(image, mask, self.config.input_size);
        debug!(input_size = self.config.input_size, "running ONNX inpainting");

        let (shape, data) = tokio::task::spawn_blocking(move || -> Result<(Vec<usize>, Vec<f32>)> {
            let image_value = Value::from_array(image_tensor).map_err(|e| {
                TileInpaintError::generation_failure(format!("Failed to convert image tensor: {e}"))
            })?;
            let mask_value = Value::from_array(mask_tensor).map_err(|e| {
                TileInpaintError::generation_failure(format!("Failed to convert mask tensor: {e}"))
            })?;

            let mut session = session
                .lock()
                .map_err(|_| TileInpaintError::internal("ONNX session lock poisoned"))?;
            let outputs = session
                .run(ort::inputs![image_value, mask_value])
                .map_err(|e| {
                    TileInpaintError::generation_failure(format!("ONNX inference failed: {e}"))
                })?;

            let keys: Vec<_> = outputs.keys().collect();
            let first_key = keys
                .first()
                .ok_or_else(|| TileInpaintError::generation_failure("No output tensors found"))?;
            let tensor = outputs
                .get(first_key)
                .ok_or_else(|| {
                    TileInpaintError::generation_failure("First output tensor not found")
                })?
                .try_extract_array::<f32>()
                .map_err(|e| {
                    TileInpaintError::generation_failure(format!(
                        "Failed to extract output tensor: {e}"
                    ))
                })?;
            Ok((tensor.shape().to_vec(), tensor.iter().copied().collect()))
        })
        .await
        .map_err(|e| TileInpaintError::internal(format!("inference task failed: {e}")))??;

        let output = from_output(&shape, &data)?;
        let (width, height) = image.dimensions();
        let restored = imageops::resize(&output, width, height, FilterType::Triangle);
        keep_unmasked(image, DynamicImage::ImageRgb8(restored), mask)
    }

    fn is_available(&self) -> bool {
        self.session.is_some()
    }

    fn name(&self) -> &str {
        "onnx"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Onnx
    }
}

/// Configured thread count, or the machine's parallelism for 0
fn intra_thread_count(configured: usize) -> usize {
    if configured > 0 {
        return configured;
    }
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4)
}
