//! Backend construction by kind

use crate::{
    backends::{BackendKind, InpaintingBackend, PlaceholderBackend, DEFAULT_SENTINEL},
    config::{OnnxBackendConfig, RemoteBackendConfig},
    error::{Result, TileInpaintError},
};
use std::sync::Arc;

/// Factory trait for creating inpainting backends
pub trait BackendFactory: Send + Sync {
    /// Create a backend instance of the specified kind
    ///
    /// The returned backend may still report itself unavailable; callers
    /// decide whether to fall back.
    ///
    /// # Errors
    /// - `BackendUnavailable` when support for the kind was not compiled in
    /// - `InvalidConfig` when the backend settings are rejected
    fn create_backend(&self, kind: BackendKind) -> Result<Arc<dyn InpaintingBackend>>;

    /// List backend kinds this factory can create
    fn available_backends(&self) -> Vec<BackendKind>;
}

/// Default backend factory built from per-backend settings
#[derive(Debug, Clone)]
pub struct DefaultBackendFactory {
    pub sentinel: [u8; 4],
    pub remote: RemoteBackendConfig,
    pub onnx: OnnxBackendConfig,
}

impl Default for DefaultBackendFactory {
    fn default() -> Self {
        Self {
            sentinel: DEFAULT_SENTINEL,
            remote: RemoteBackendConfig::default(),
            onnx: OnnxBackendConfig::default(),
        }
    }
}

impl DefaultBackendFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_remote(mut self, remote: RemoteBackendConfig) -> Self {
        self.remote = remote;
        self
    }

    #[must_use]
    pub fn with_onnx(mut self, onnx: OnnxBackendConfig) -> Self {
        self.onnx = onnx;
        self
    }
}

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(&self, kind: BackendKind) -> Result<Arc<dyn InpaintingBackend>> {
        match kind {
            BackendKind::Placeholder => Ok(Arc::new(PlaceholderBackend::with_sentinel(
                self.sentinel,
            ))),
            #[cfg(feature = "remote")]
            BackendKind::Remote => Ok(Arc::new(crate::backends::RemoteBackend::new(
                self.remote.clone(),
            )?)),
            #[cfg(feature = "onnx")]
            BackendKind::Onnx => Ok(Arc::new(crate::backends::OnnxInpaintBackend::new(
                self.onnx.clone(),
            ))),
            #[allow(unreachable_patterns)]
            other => Err(TileInpaintError::backend_unavailable(format!(
                "{other} backend support was not compiled in (enable the '{other}' feature)"
            ))),
        }
    }

    fn available_backends(&self) -> Vec<BackendKind> {
        BackendKind::ALL
            .into_iter()
            .filter(|kind| kind.is_compiled())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_creates_placeholder() {
        let factory = DefaultBackendFactory::new();
        let backend = factory.create_backend(BackendKind::Placeholder).unwrap();
        assert!(backend.is_available());
        assert_eq!(backend.kind(), BackendKind::Placeholder);
    }

    #[test]
    fn test_available_backends_includes_placeholder_last() {
        let factory = DefaultBackendFactory::new();
        let kinds = factory.available_backends();
        assert_eq!(kinds.last(), Some(&BackendKind::Placeholder));
        assert_eq!(kinds.contains(&BackendKind::Remote), cfg!(feature = "remote"));
    }

    #[cfg(feature = "remote")]
    #[test]
    fn test_factory_remote_starts_unprobed() {
        let factory = DefaultBackendFactory::new();
        let backend = factory.create_backend(BackendKind::Remote).unwrap();
        assert!(!backend.is_available());
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_factory_rejects_uncompiled_onnx() {
        let factory = DefaultBackendFactory::new();
        let err = factory.create_backend(BackendKind::Onnx).err().unwrap();
        assert!(err.to_string().contains("onnx"));
    }

    #[test]
    fn test_factory_trait_object() {
        let factory: Box<dyn BackendFactory> = Box::new(DefaultBackendFactory::new());
        assert!(!factory.available_backends().is_empty());
    }
}
