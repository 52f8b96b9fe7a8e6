//! Service layer for tile generation
//!
//! This module contains service types that separate infrastructure concerns
//! (encoding, progress reporting) from the generation algorithms.

pub mod codec;
pub mod progress;

pub use codec::{normalize_layout, ImageCodec, PNG_DATA_URL_PREFIX};
pub use progress::{
    NoOpProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate, StageRecorder,
    TracingProgressReporter,
};
