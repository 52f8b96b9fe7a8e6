//! Backend resolution for the CLI
//!
//! Wraps [`DefaultBackendFactory`] and adds the async availability probe the
//! remote backend needs before it can be selected.

use crate::{
    backends::{select_available, BackendFactory, BackendKind, DefaultBackendFactory, InpaintingBackend},
    error::Result,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Availability of one backend kind, as shown by `tile-inpaint backends`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BackendStatus {
    pub(crate) kind: BackendKind,
    pub(crate) compiled: bool,
    pub(crate) available: bool,
    pub(crate) detail: Option<String>,
}

/// CLI backend factory that probes backends before handing them out
#[derive(Debug)]
pub(crate) struct CliBackendFactory {
    inner: DefaultBackendFactory,
}

impl CliBackendFactory {
    pub(crate) fn new(inner: DefaultBackendFactory) -> Self {
        Self { inner }
    }

    /// Create a backend and, for the remote kind, probe the service once
    pub(crate) async fn create_probed(&self, kind: BackendKind) -> Result<Arc<dyn InpaintingBackend>> {
        match kind {
            #[cfg(feature = "remote")]
            BackendKind::Remote => {
                let backend = crate::backends::RemoteBackend::new(self.inner.remote.clone())?;
                let reachable = backend.probe().await;
                debug!(url = %self.inner.remote.base_url, reachable, "remote backend probed");
                Ok(Arc::new(backend))
            },
            other => self.inner.create_backend(other),
        }
    }

    /// The requested backend, or the first available one in preference order
    ///
    /// # Errors
    /// - `BackendUnavailable` when the requested backend cannot run, or no
    ///   compiled backend is available
    pub(crate) async fn resolve(
        &self,
        requested: Option<BackendKind>,
    ) -> Result<Arc<dyn InpaintingBackend>> {
        let kinds = match requested {
            Some(kind) => vec![kind],
            None => self.inner.available_backends(),
        };

        let mut candidates = Vec::with_capacity(kinds.len());
        for kind in kinds {
            candidates.push(self.create_probed(kind).await?);
        }
        let backend = select_available(&candidates)?;
        info!(backend = backend.name(), "backend selected");
        Ok(backend)
    }

    /// Status of every backend kind, compiled or not
    pub(crate) async fn statuses(&self) -> Vec<BackendStatus> {
        let mut statuses = Vec::with_capacity(BackendKind::ALL.len());
        for kind in BackendKind::ALL {
            let status = if kind.is_compiled() {
                match self.create_probed(kind).await {
                    Ok(backend) => BackendStatus {
                        kind,
                        compiled: true,
                        available: backend.is_available(),
                        detail: None,
                    },
                    Err(e) => BackendStatus {
                        kind,
                        compiled: true,
                        available: false,
                        detail: Some(e.message()),
                    },
                }
            } else {
                BackendStatus {
                    kind,
                    compiled: false,
                    available: false,
                    detail: Some(format!("rebuild with --features {kind}")),
                }
            };
            statuses.push(status);
        }
        statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteBackendConfig;

    fn offline_factory() -> CliBackendFactory {
        CliBackendFactory::new(DefaultBackendFactory::new().with_remote(RemoteBackendConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
            ..RemoteBackendConfig::default()
        }))
    }

    #[tokio::test]
    async fn test_auto_resolution_falls_back_to_placeholder() {
        let backend = offline_factory().resolve(None).await.unwrap();
        assert_eq!(backend.kind(), BackendKind::Placeholder);
    }

    #[tokio::test]
    async fn test_explicit_placeholder() {
        let backend = offline_factory()
            .resolve(Some(BackendKind::Placeholder))
            .await
            .unwrap();
        assert_eq!(backend.name(), "placeholder");
    }

    #[cfg(feature = "remote")]
    #[tokio::test]
    async fn test_explicit_unreachable_remote_is_unavailable() {
        let err = offline_factory()
            .resolve(Some(BackendKind::Remote))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::BackendUnavailable);
    }

    #[tokio::test]
    async fn test_statuses_cover_every_kind() {
        let statuses = offline_factory().statuses().await;
        assert_eq!(statuses.len(), BackendKind::ALL.len());
        let placeholder = statuses
            .iter()
            .find(|s| s.kind == BackendKind::Placeholder)
            .unwrap();
        assert!(placeholder.compiled && placeholder.available);
    }
}
