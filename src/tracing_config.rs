//! Tracing subscriber setup for the `tile-inpaint` binary
//!
//! The library only emits spans and events. Verbosity raises the crate's own
//! level first and leaves HTTP and runtime dependencies at `warn` until `-vv`.

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Colored, compact lines
    Console,
    /// Compact lines without ANSI escapes, for CI logs
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

#[derive(Debug)]
pub struct TracingConfig {
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Filter directives; replaces the verbosity mapping entirely
    pub env_filter: Option<String>,
    /// Logged once at startup so every request id can be tied to one run
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            env_filter: None,
            session_id: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Filter directives for the configured verbosity
    #[must_use]
    pub fn verbosity_directives(&self) -> &'static str {
        match self.verbosity {
            0 => "warn,tile_inpaint=info",
            1 => "warn,tile_inpaint=debug",
            2 => "info,tile_inpaint=trace",
            _ => "trace",
        }
    }

    /// # Errors
    /// Fails when the explicit filter string does not parse.
    pub fn build_filter(&self) -> anyhow::Result<EnvFilter> {
        let directives = self
            .env_filter
            .as_deref()
            .unwrap_or_else(|| self.verbosity_directives());
        Ok(EnvFilter::try_new(directives)?)
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// Fails when the filter does not parse or a subscriber is already set.
    pub fn init(self) -> anyhow::Result<()> {
        let registry = Registry::default().with(self.build_filter()?);

        match self.format {
            TracingFormat::Console => registry.with(line_layer(true)).try_init()?,
            TracingFormat::Compact => registry.with(line_layer(false)).try_init()?,
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => registry
                .with(fmt::layer().json().with_current_span(true).with_span_list(true))
                .try_init()?,
        }

        if let Some(session_id) = &self.session_id {
            tracing::info!(session_id = %session_id, "tile-inpaint session started");
        }
        Ok(())
    }
}

fn line_layer<S>(ansi: bool) -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer().with_ansi(ansi).with_target(false).compact()
}

/// Initialize tracing for the CLI; a non-blank `RUST_LOG` beats `verbosity`
///
/// # Errors
/// Fails when `RUST_LOG` does not parse or a subscriber is already installed.
pub fn init_cli_tracing(verbosity: u8, format: TracingFormat) -> anyhow::Result<()> {
    cli_config(verbosity, format, std::env::var(EnvFilter::DEFAULT_ENV).ok()).init()
}

fn cli_config(verbosity: u8, format: TracingFormat, rust_log: Option<String>) -> TracingConfig {
    let config = TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(format)
        .with_session_id(uuid::Uuid::new_v4().to_string());
    match rust_log {
        Some(filter) if !filter.trim().is_empty() => config.with_env_filter(filter),
        _ => config,
    }
}
