//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::GenerateArgs;
use crate::{
    backends::DefaultBackendFactory,
    config::{OnnxBackendConfig, PipelineConfig, RemoteBackendConfig},
    utils::ColorKey,
};
use anyhow::{Context, Result};

/// Convert CLI arguments to library configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Pipeline settings for a `generate` invocation
    ///
    /// The request file's tile size always wins over the pipeline default, so
    /// only falloff, background and validation mode come from the arguments.
    pub(crate) fn pipeline_config(args: &GenerateArgs) -> Result<PipelineConfig> {
        let mut builder = PipelineConfig::builder().validate_eagerly(!args.lazy_validation);
        if let Some(falloff) = args.edge_falloff {
            builder = builder.edge_falloff(falloff);
        }
        builder.build().context("Invalid pipeline settings")
    }

    /// Backend settings shared by `generate` and `backends`
    pub(crate) fn backend_factory(
        remote_url: Option<&str>,
        remote_timeout: Option<u64>,
        model: Option<&std::path::Path>,
        sentinel: Option<&str>,
    ) -> Result<DefaultBackendFactory> {
        let mut remote = RemoteBackendConfig::default();
        if let Some(url) = remote_url {
            remote.base_url = url.to_string();
        }
        if let Some(timeout) = remote_timeout {
            remote.timeout_secs = timeout;
        }
        remote.validate().context("Invalid remote backend settings")?;

        let mut onnx = OnnxBackendConfig::default();
        if let Some(path) = model {
            onnx.model_path = path.to_path_buf();
        }

        let mut factory = DefaultBackendFactory::new().with_remote(remote).with_onnx(onnx);
        if let Some(hex) = sentinel {
            let key = ColorKey::parse_hex(hex).context("Invalid --sentinel color")?;
            factory.sentinel = [key.r, key.g, key.b, 255];
        }
        Ok(factory)
    }
}
