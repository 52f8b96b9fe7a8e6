//! Pipeline stage tracking and progress reporting
//!
//! The generation pipeline is a small state machine. Every transition is
//! reported to a [`ProgressReporter`], which lets front ends show progress and
//! lets tests assert the exact path a request took.

use crate::types::GenerationTimings;
use instant::Instant;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// States of one generation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    /// Request accepted, inputs being validated
    Pending,
    /// Backend inference running (the only long-running stage)
    Inpainting,
    /// Forcing locked edge pixels and blending seams
    Reconciling,
    /// Tiles sliced and ready (terminal success)
    Sliced,
    /// Terminal failure; no tiles are produced
    Failed,
}

impl PipelineStage {
    /// Get a human-readable description of the stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Pending => "Validating generation request",
            Self::Inpainting => "Running inpainting backend",
            Self::Reconciling => "Reconciling locked edges",
            Self::Sliced => "Tiles sliced",
            Self::Failed => "Generation failed",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            Self::Pending => 5,
            Self::Inpainting => 20,
            Self::Reconciling => 90,
            Self::Sliced | Self::Failed => 100,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sliced | Self::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`
    ///
    /// Any non-terminal stage may fail; success only moves forward one step.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Inpainting)
                | (Self::Inpainting, Self::Reconciling)
                | (Self::Reconciling, Self::Sliced)
                | (Self::Pending | Self::Inpainting | Self::Reconciling, Self::Failed)
        )
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Inpainting => "inpainting",
            Self::Reconciling => "reconciling",
            Self::Sliced => "sliced",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub request_id: Uuid,
    pub stage: PipelineStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    pub description: String,
    /// Elapsed time since the request started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(request_id: Uuid, stage: PipelineStage, start_time: Instant) -> Self {
        Self {
            request_id,
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }
}

/// Trait for reporting progress during tile generation
pub trait ProgressReporter: Send + Sync {
    /// Report a stage transition
    fn report_progress(&self, update: ProgressUpdate);

    /// Report successful completion with final timings
    fn report_completion(&self, request_id: Uuid, timings: &GenerationTimings);

    /// Report the error that moved a request to [`PipelineStage::Failed`]
    fn report_error(&self, request_id: Uuid, stage: PipelineStage, error: &str);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _request_id: Uuid, _timings: &GenerationTimings) {}

    fn report_error(&self, _request_id: Uuid, _stage: PipelineStage, _error: &str) {}
}

/// Reporter that forwards every update to `tracing`
pub struct TracingProgressReporter {
    verbose: bool,
}

impl TracingProgressReporter {
    /// # Arguments
    /// * `verbose` - Whether to include elapsed times and stage breakdowns
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for TracingProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            tracing::info!(
                request_id = %update.request_id,
                stage = %update.stage,
                elapsed_ms = update.elapsed_ms,
                "[{}%] {}",
                update.progress,
                update.description
            );
        } else {
            tracing::info!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, request_id: Uuid, timings: &GenerationTimings) {
        tracing::info!(request_id = %request_id, "Tile generation completed in {}ms", timings.total_ms);
        if self.verbose {
            tracing::info!(
                validation_ms = timings.validation_ms,
                inpainting_ms = timings.inpainting_ms,
                reconcile_ms = timings.reconcile_ms,
                slicing_ms = timings.slicing_ms,
                "Stage timings"
            );
        }
    }

    fn report_error(&self, request_id: Uuid, stage: PipelineStage, error: &str) {
        tracing::error!(request_id = %request_id, stage = %stage, "Generation failed: {}", error);
    }
}

/// Reporter that keeps every stage it sees, in order
///
/// Cloning shares the underlying record, so one clone can be handed to the
/// pipeline while another is inspected afterwards.
#[derive(Clone, Default)]
pub struct StageRecorder {
    stages: Arc<Mutex<Vec<PipelineStage>>>,
    errors: Arc<Mutex<Vec<String>>>,
}

impl StageRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages reported so far
    #[must_use]
    pub fn stages(&self) -> Vec<PipelineStage> {
        self.stages.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Error messages reported so far
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ProgressReporter for StageRecorder {
    fn report_progress(&self, update: ProgressUpdate) {
        if let Ok(mut stages) = self.stages.lock() {
            stages.push(update.stage);
        }
    }

    fn report_completion(&self, _request_id: Uuid, _timings: &GenerationTimings) {}

    fn report_error(&self, _request_id: Uuid, _stage: PipelineStage, error: &str) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(error.to_string());
        }
    }
}
