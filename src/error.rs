//! Error types for tile generation operations

use thiserror::Error;

/// Result type alias for tile generation operations
pub type Result<T> = std::result::Result<T, TileInpaintError>;

/// Error types for tile generation operations
///
/// Every variant is recoverable at the pipeline boundary: the orchestrator maps
/// each of them to a failed [`crate::types::GenerationOutcome`] with no tiles.
#[derive(Error, Debug)]
pub enum TileInpaintError {
    /// The selected backend cannot run (no model, no accelerator, service down)
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend ran but did not produce an image
    #[error("Generation failed: {0}")]
    GenerationFailure(String),

    /// An edge constraint is out of bounds or malformed
    #[error("Invalid edge constraint: {0}")]
    InvalidConstraint(String),

    /// Requested grid bounds exceed the source raster
    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    /// Two rasters that must share dimensions do not
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Raster uses a channel layout other than RGB8 or RGBA8
    #[error("Unsupported channel layout: {0}")]
    UnsupportedLayout(String),

    /// Base64 or data URL decoding errors
    #[error("Decode error: {0}")]
    Decode(String),

    /// Image format or processing errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Input/output errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request was cancelled before tiles were committed
    #[error("Generation cancelled: {0}")]
    Cancelled(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Fieldless classification of [`TileInpaintError`] for transport layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BackendUnavailable,
    GenerationFailure,
    InvalidConstraint,
    OutOfBounds,
    DimensionMismatch,
    InvalidConfig,
    UnsupportedLayout,
    Decode,
    Image,
    Io,
    Cancelled,
    Internal,
}

impl TileInpaintError {
    /// Create a new backend unavailable error
    pub fn backend_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    /// Create a new generation failure error
    pub fn generation_failure<S: Into<String>>(msg: S) -> Self {
        Self::GenerationFailure(msg.into())
    }

    /// Create a new invalid constraint error
    pub fn invalid_constraint<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConstraint(msg.into())
    }

    /// Create a new out of bounds error
    pub fn out_of_bounds<S: Into<String>>(msg: S) -> Self {
        Self::OutOfBounds(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new unsupported layout error
    pub fn unsupported_layout<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedLayout(msg.into())
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new cancellation error
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a dimension mismatch error naming both rasters
    pub fn dimension_mismatch(
        what: &str,
        expected: (u32, u32),
        actual: (u32, u32),
    ) -> Self {
        Self::DimensionMismatch(format!(
            "{} is {}x{} but must be {}x{}",
            what, actual.0, actual.1, expected.0, expected.1
        ))
    }

    /// Create an out of bounds error for a pixel extent that does not fit the source
    pub fn out_of_bounds_extent(required: (u64, u64), available: (u32, u32)) -> Self {
        Self::OutOfBounds(format!(
            "bounds need a {}x{} pixel extent but the source image is {}x{}",
            required.0, required.1, available.0, available.1
        ))
    }

    /// Classify this error without its message
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            Self::GenerationFailure(_) => ErrorKind::GenerationFailure,
            Self::InvalidConstraint(_) => ErrorKind::InvalidConstraint,
            Self::OutOfBounds(_) => ErrorKind::OutOfBounds,
            Self::DimensionMismatch(_) => ErrorKind::DimensionMismatch,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::UnsupportedLayout(_) => ErrorKind::UnsupportedLayout,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Image(_) => ErrorKind::Image,
            Self::Io(_) => ErrorKind::Io,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The message carried by the error, without the variant prefix
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::BackendUnavailable(msg)
            | Self::GenerationFailure(msg)
            | Self::InvalidConstraint(msg)
            | Self::OutOfBounds(msg)
            | Self::DimensionMismatch(msg)
            | Self::InvalidConfig(msg)
            | Self::UnsupportedLayout(msg)
            | Self::Decode(msg)
            | Self::Cancelled(msg)
            | Self::Internal(msg) => msg.clone(),
            Self::Image(e) => e.to_string(),
            Self::Io(e) => e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = TileInpaintError::invalid_constraint("x out of range");
        assert!(matches!(err, TileInpaintError::InvalidConstraint(_)));
        assert_eq!(err.kind(), ErrorKind::InvalidConstraint);

        let err = TileInpaintError::backend_unavailable("no accelerator");
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    }

    #[test]
    fn test_error_display() {
        let err = TileInpaintError::generation_failure("empty prompt");
        assert_eq!(err.to_string(), "Generation failed: empty prompt");
        assert_eq!(err.message(), "empty prompt");
    }

    #[test]
    fn test_contextual_errors() {
        let err = TileInpaintError::dimension_mismatch("mask", (32, 32), (16, 32));
        let text = err.to_string();
        assert!(text.contains("mask is 16x32"));
        assert!(text.contains("32x32"));
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);

        let err = TileInpaintError::out_of_bounds_extent((48, 16), (32, 32));
        let text = err.to_string();
        assert!(text.contains("48x16"));
        assert!(text.contains("32x32"));
        assert_eq!(err.kind(), ErrorKind::OutOfBounds);
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::OutOfBounds).unwrap();
        assert_eq!(json, "\"out_of_bounds\"");
    }
}
