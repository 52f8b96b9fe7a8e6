//! Remote inpainting over HTTP
//!
//! Talks to a stable-diffusion-webui compatible service through its
//! `/sdapi/v1/img2img` endpoint in inpainting mode. Availability is not
//! assumed: call [`RemoteBackend::probe`] to check the service before use.

use crate::{
    backends::{check_generation_inputs, keep_unmasked, BackendKind, InpaintingBackend},
    config::{GenerationConfig, RemoteBackendConfig},
    error::{Result, TileInpaintError},
    services::ImageCodec,
    types::InpaintMask,
};
use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, GrayImage, Luma};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const IMG2IMG_PATH: &str = "/sdapi/v1/img2img";
const PROBE_PATH: &str = "/sdapi/v1/sd-models";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Inpainting fill mode "original": start denoising from the source pixels
const FILL_ORIGINAL: u8 = 1;

#[derive(Debug, Serialize)]
struct Img2ImgRequest<'a> {
    init_images: Vec<String>,
    mask: String,
    prompt: &'a str,
    negative_prompt: &'a str,
    steps: u32,
    cfg_scale: f32,
    seed: i64,
    denoising_strength: f32,
    sampler_name: &'a str,
    width: u32,
    height: u32,
    inpainting_fill: u8,
    inpaint_full_res: bool,
    mask_blur: u32,
    inpainting_mask_invert: u8,
}

#[derive(Debug, Deserialize)]
struct Img2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
}

// Helper function to map HTTP errors to crate errors
fn map_http_error(error: &reqwest::Error) -> TileInpaintError {
    if error.is_timeout() {
        TileInpaintError::generation_failure(format!("inpainting request timed out: {error}"))
    } else if error.is_connect() {
        TileInpaintError::backend_unavailable(format!("cannot reach inpainting service: {error}"))
    } else {
        TileInpaintError::generation_failure(format!("inpainting request failed: {error}"))
    }
}

/// Binarize a mask so the service sees exactly the pixels above the threshold
fn binary_mask(mask: &InpaintMask) -> DynamicImage {
    let (width, height) = mask.dimensions();
    DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| {
        if mask.should_regenerate(x, y) {
            Luma([255])
        } else {
            Luma([0])
        }
    }))
}

/// Inpainting backend backed by an HTTP service
#[derive(Debug)]
pub struct RemoteBackend {
    client: Client,
    config: RemoteBackendConfig,
    available: AtomicBool,
}

impl RemoteBackend {
    /// Create a client; the backend reports unavailable until a probe succeeds
    ///
    /// # Errors
    /// - `InvalidConfig` for invalid settings or when the HTTP client cannot be built
    pub fn new(config: RemoteBackendConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                TileInpaintError::invalid_config(format!("Failed to create HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            config,
            available: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn config(&self) -> &RemoteBackendConfig {
        &self.config
    }

    /// Check that the service answers and remember the result
    pub async fn probe(&self) -> bool {
        let url = self.config.endpoint(PROBE_PATH);
        let reachable = match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = %response.status(), %url, "inpainting service probe rejected");
                false
            },
            Err(e) => {
                debug!(error = %e, %url, "inpainting service probe failed");
                false
            },
        };
        self.available.store(reachable, Ordering::Relaxed);
        reachable
    }

    fn build_request<'a>(
        &'a self,
        image: &DynamicImage,
        mask: &InpaintMask,
        prompt: &'a str,
        config: &'a GenerationConfig,
    ) -> Result<Img2ImgRequest<'a>> {
        let (width, height) = image.dimensions();
        Ok(Img2ImgRequest {
            init_images: vec![ImageCodec::encode_data_url(image)?],
            mask: ImageCodec::encode_data_url(&binary_mask(mask))?,
            prompt,
            negative_prompt: config.effective_negative_prompt().unwrap_or_default(),
            steps: config.steps,
            cfg_scale: config.guidance_scale,
            // The service takes a signed seed where -1 means random
            seed: config.seed.map_or(-1, |s| (s & i64::MAX as u64) as i64),
            denoising_strength: self.config.denoising_strength,
            sampler_name: &self.config.sampler,
            width,
            height,
            inpainting_fill: FILL_ORIGINAL,
            inpaint_full_res: false,
            mask_blur: 0,
            inpainting_mask_invert: 0,
        })
    }
}

#[async_trait]
impl InpaintingBackend for RemoteBackend {
    #[instrument(skip_all, fields(backend = "remote", url = %self.config.base_url))]
    async fn generate(
        &self,
        image: &DynamicImage,
        mask: &InpaintMask,
        config: &GenerationConfig,
    ) -> Result<DynamicImage> {
        let prompt = check_generation_inputs(image, mask, config)?;
        let request = self.build_request(image, mask, &prompt, config)?;

        let url = self.config.endpoint(IMG2IMG_PATH);
        info!(steps = config.steps, "sending inpainting request");
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_http_error(&e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TileInpaintError::generation_failure(format!(
                "inpainting service returned {status}: {error_text}"
            )));
        }

        let body: Img2ImgResponse = response.json().await.map_err(|e| {
            TileInpaintError::generation_failure(format!("Failed to parse response: {e}"))
        })?;
        let first = body.images.first().ok_or_else(|| {
            TileInpaintError::generation_failure("inpainting service returned no images")
        })?;
        let generated = ImageCodec::decode(first)?;
        keep_unmasked(image, generated, mask)
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    fn name(&self) -> &str {
        "remote"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }
}
