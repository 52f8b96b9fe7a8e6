//! Test utilities and mock backends for testing pipeline functionality
//!
//! [`MockInpaintBackend`] implements [`InpaintingBackend`] without any model or
//! network access. It records every call, can be told to fail or to stall, and
//! fills masked pixels with a configurable color.

use crate::{
    backends::{check_generation_inputs, BackendKind, InpaintingBackend, PlaceholderBackend},
    config::GenerationConfig,
    error::{Result, TileInpaintError},
    types::InpaintMask,
};
use async_trait::async_trait;
use image::DynamicImage;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

/// Mock inpainting backend for testing
#[derive(Debug, Clone)]
pub struct MockInpaintBackend {
    /// Color written into masked pixels
    fill: [u8; 4],
    /// Prompts received, in call order
    call_history: Arc<Mutex<Vec<String>>>,
    /// Whether to simulate a generation failure
    should_fail: bool,
    /// Reported availability, shared with clones
    available: Arc<AtomicBool>,
    /// Artificial inference latency
    delay: Option<Duration>,
}

impl MockInpaintBackend {
    /// Create a new mock backend that fills masked pixels with opaque green
    #[must_use]
    pub fn new() -> Self {
        Self {
            fill: [0, 255, 0, 255],
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail: false,
            available: Arc::new(AtomicBool::new(true)),
            delay: None,
        }
    }

    /// Create a mock backend whose every generation fails
    #[must_use]
    pub fn new_failing() -> Self {
        let mut backend = Self::new();
        backend.should_fail = true;
        backend
    }

    /// Create a mock backend that reports itself unavailable
    #[must_use]
    pub fn new_unavailable() -> Self {
        let backend = Self::new();
        backend.available.store(false, Ordering::SeqCst);
        backend
    }

    /// Sleep this long inside `generate` before producing output
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_fill(mut self, fill: [u8; 4]) -> Self {
        self.fill = fill;
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Get the prompts of every generate call for verification in tests
    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.call_history.lock().unwrap().len()
    }

    /// Clear the call history
    pub fn clear_call_history(&self) {
        self.call_history.lock().unwrap().clear();
    }

    fn record_call(&self, prompt: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(prompt.to_string());
        }
    }
}

impl Default for MockInpaintBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InpaintingBackend for MockInpaintBackend {
    async fn generate(
        &self,
        image: &DynamicImage,
        mask: &InpaintMask,
        config: &GenerationConfig,
    ) -> Result<DynamicImage> {
        self.record_call(&config.effective_prompt());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if !self.is_available() {
            return Err(TileInpaintError::backend_unavailable(
                "Mock backend is offline",
            ));
        }
        if self.should_fail {
            return Err(TileInpaintError::generation_failure(
                "Mock backend generation failed",
            ));
        }

        check_generation_inputs(image, mask, config)?;
        PlaceholderBackend::with_sentinel(self.fill)
            .generate(image, mask, config)
            .await
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Placeholder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};

    fn config() -> GenerationConfig {
        GenerationConfig::builder().keyword("retro").prompt("cave").build().unwrap()
    }

    #[tokio::test]
    async fn test_mock_records_prompts() {
        let backend = MockInpaintBackend::new();
        let image = DynamicImage::ImageRgba8(RgbaImage::new(2, 2));
        let mask = InpaintMask::filled(2, 2, 255);

        let result = backend.generate(&image, &mask, &config()).await.unwrap();
        assert_eq!(result.get_pixel(0, 0), Rgba([0, 255, 0, 255]));
        assert_eq!(backend.get_call_history(), vec!["retro cave".to_string()]);

        backend.clear_call_history();
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_failure_modes() {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(2, 2));
        let mask = InpaintMask::filled(2, 2, 255);

        let failing = MockInpaintBackend::new_failing();
        let err = failing.generate(&image, &mask, &config()).await.unwrap_err();
        assert!(matches!(err, TileInpaintError::GenerationFailure(_)));
        assert_eq!(failing.call_count(), 1);

        let offline = MockInpaintBackend::new_unavailable();
        assert!(!offline.is_available());
        let err = offline.generate(&image, &mask, &config()).await.unwrap_err();
        assert!(matches!(err, TileInpaintError::BackendUnavailable(_)));
    }

    #[test]
    fn test_availability_shared_between_clones() {
        let backend = MockInpaintBackend::new();
        let clone = backend.clone();
        clone.set_available(false);
        assert!(!backend.is_available());
    }
}
