//! Tile generation pipeline
//!
//! [`GenerationPipeline`] sequences one request through
//! `Pending → Inpainting → Reconciling → Sliced`, or into `Failed` from any
//! non-terminal stage. Inputs are validated up front so malformed requests fail
//! before the backend runs; backend failures are never retried.

use crate::{
    backends::{select_available, InpaintingBackend, PlaceholderBackend},
    config::{GenerationConfig, PipelineConfig},
    error::{Result, TileInpaintError},
    reconcile::EdgeReconciler,
    services::{NoOpProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate},
    tiling::{ComposedScene, TileSlicer},
    types::{
        EdgeConstraint, GenerationBounds, GenerationOutcome, GenerationTimings, GridCoord,
        InpaintMask, Tile,
    },
    utils::RasterValidator,
};
use futures::future::join_all;
use image::{DynamicImage, GenericImageView};
use instant::Instant;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Everything one generation needs
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Scene raster: locked tiles plus the area to regenerate (RGB8 or RGBA8)
    pub scene: DynamicImage,
    /// Grid coordinate of the scene's top-left tile
    pub origin: GridCoord,
    /// Same size as `scene`; values above 128 are regenerated
    pub mask: InpaintMask,
    /// Locked pixel strips the output must reproduce exactly
    pub locked_edges: Vec<EdgeConstraint>,
    pub generation: GenerationConfig,
    /// Tiles to return
    pub bounds: GenerationBounds,
    /// Overrides the pipeline's tile size for this request
    pub tile_size: Option<u32>,
}

impl GenerationRequest {
    /// Request over a scene whose top-left tile is grid `(0, 0)`
    #[must_use]
    pub fn new(
        scene: DynamicImage,
        mask: InpaintMask,
        generation: GenerationConfig,
        bounds: GenerationBounds,
    ) -> Self {
        Self {
            scene,
            origin: GridCoord::new(0, 0),
            mask,
            locked_edges: Vec::new(),
            generation,
            bounds,
            tile_size: None,
        }
    }

    /// Request regenerating `bounds` around a composed scene of locked tiles
    ///
    /// The mask covers every unlocked cell of `bounds`, and each locked tile
    /// sharing a side with `bounds` contributes a `strip_width` edge constraint.
    ///
    /// # Errors
    /// - `OutOfBounds` when `bounds` leaves the scene
    /// - `InvalidConfig` for a zero strip width
    pub fn from_scene(
        scene: &ComposedScene,
        bounds: GenerationBounds,
        generation: GenerationConfig,
        strip_width: u32,
    ) -> Result<Self> {
        Ok(Self {
            scene: scene.image.clone(),
            origin: scene.origin,
            mask: scene.mask_for(&bounds)?,
            locked_edges: scene.edge_constraints_for(&bounds, strip_width)?,
            generation,
            bounds,
            tile_size: Some(scene.tile_size),
        })
    }

    #[must_use]
    pub fn with_locked_edges(mut self, locked_edges: Vec<EdgeConstraint>) -> Self {
        self.locked_edges = locked_edges;
        self
    }

    #[must_use]
    pub fn with_origin(mut self, origin: GridCoord) -> Self {
        self.origin = origin;
        self
    }

    #[must_use]
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = Some(tile_size);
        self
    }
}

/// Walks the stage state machine and reports each transition
struct StageTracker<'a> {
    reporter: &'a dyn ProgressReporter,
    request_id: Uuid,
    start: Instant,
    stage: PipelineStage,
}

impl<'a> StageTracker<'a> {
    fn start(reporter: &'a dyn ProgressReporter, request_id: Uuid) -> Self {
        let tracker = Self {
            reporter,
            request_id,
            start: Instant::now(),
            stage: PipelineStage::Pending,
        };
        tracker.report();
        tracker
    }

    fn advance(&mut self, next: PipelineStage) {
        debug_assert!(
            self.stage.can_transition_to(next),
            "illegal stage transition {} -> {next}",
            self.stage
        );
        debug!(from = %self.stage, to = %next, "stage transition");
        self.stage = next;
        self.report();
    }

    fn fail(&mut self, error: &TileInpaintError) {
        let failed_at = self.stage;
        if !failed_at.is_terminal() {
            self.advance(PipelineStage::Failed);
        }
        self.reporter
            .report_error(self.request_id, failed_at, &error.message());
    }

    fn report(&self) {
        self.reporter
            .report_progress(ProgressUpdate::new(self.request_id, self.stage, self.start));
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Orchestrates inpainting, edge reconciliation and slicing
///
/// The backend is shared by every request the pipeline runs, including
/// concurrent ones started through [`GenerationPipeline::generate_batch`].
pub struct GenerationPipeline {
    backend: Arc<dyn InpaintingBackend>,
    config: PipelineConfig,
    reporter: Arc<dyn ProgressReporter>,
}

impl GenerationPipeline {
    /// Pipeline with default settings
    #[must_use]
    pub fn new(backend: Arc<dyn InpaintingBackend>) -> Self {
        Self {
            backend,
            config: PipelineConfig::default(),
            reporter: Arc::new(NoOpProgressReporter),
        }
    }

    /// # Errors
    /// - `InvalidConfig` when the configuration is invalid
    pub fn with_config(backend: Arc<dyn InpaintingBackend>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            config,
            reporter: Arc::new(NoOpProgressReporter),
        })
    }

    /// Pipeline over the deterministic placeholder backend
    #[must_use]
    pub fn placeholder() -> Self {
        Self::new(Arc::new(PlaceholderBackend::new()))
    }

    /// Pipeline over the first available candidate
    ///
    /// # Errors
    /// - `BackendUnavailable` when no candidate is available
    /// - `InvalidConfig` when the configuration is invalid
    pub fn from_candidates(
        candidates: &[Arc<dyn InpaintingBackend>],
        config: PipelineConfig,
    ) -> Result<Self> {
        Self::with_config(select_available(candidates)?, config)
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn InpaintingBackend> {
        &self.backend
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run a request and return its tiles in row-major order
    ///
    /// # Errors
    /// Any [`TileInpaintError`] raised by validation, the backend,
    /// reconciliation or slicing. No tiles are returned on error.
    pub async fn run(&self, request: &GenerationRequest) -> Result<Vec<Tile>> {
        self.execute(request, Uuid::new_v4(), None).await.0
    }

    /// Like [`GenerationPipeline::run`], aborting when `cancel` fires
    ///
    /// Cancellation is observed before inference, while the backend runs and
    /// before slicing. A cancelled request yields `Cancelled` and no tiles.
    ///
    /// # Errors
    /// Same as [`GenerationPipeline::run`], plus `Cancelled`.
    pub async fn run_with_cancellation(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Tile>> {
        self.execute(request, Uuid::new_v4(), Some(cancel)).await.0
    }

    /// Run a request and fold the result into a [`GenerationOutcome`]
    ///
    /// Never fails: errors become `success == false` with a message and no tiles.
    pub async fn generate(&self, request: &GenerationRequest) -> GenerationOutcome {
        self.generate_inner(request, None).await
    }

    /// [`GenerationPipeline::generate`] with cancellation
    pub async fn generate_with_cancellation(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> GenerationOutcome {
        self.generate_inner(request, Some(cancel)).await
    }

    /// Run independent requests concurrently, outcomes in request order
    pub async fn generate_batch(&self, requests: &[GenerationRequest]) -> Vec<GenerationOutcome> {
        info!(count = requests.len(), "starting generation batch");
        join_all(requests.iter().map(|request| self.generate(request))).await
    }

    async fn generate_inner(
        &self,
        request: &GenerationRequest,
        cancel: Option<&CancellationToken>,
    ) -> GenerationOutcome {
        let request_id = Uuid::new_v4();
        let backend = self.backend.name().to_string();
        match self.execute(request, request_id, cancel).await {
            (Ok(tiles), timings) => GenerationOutcome::succeeded(request_id, backend, tiles, timings),
            (Err(e), timings) => GenerationOutcome::failed(request_id, backend, &e, timings),
        }
    }

    async fn execute(
        &self,
        request: &GenerationRequest,
        request_id: Uuid,
        cancel: Option<&CancellationToken>,
    ) -> (Result<Vec<Tile>>, GenerationTimings) {
        let span = info_span!(
            "generate_tiles",
            request_id = %request_id,
            backend = self.backend.name(),
            tiles = request.bounds.tile_count(),
        );
        async move {
            let mut tracker = StageTracker::start(self.reporter.as_ref(), request_id);
            let mut timings = GenerationTimings::default();
            let result = self.drive(request, cancel, &mut tracker, &mut timings).await;
            timings.total_ms = elapsed_ms(tracker.start);

            match &result {
                Ok(tiles) => {
                    info!(tiles = tiles.len(), total_ms = timings.total_ms, "generation complete");
                    self.reporter.report_completion(request_id, &timings);
                },
                Err(e) => {
                    warn!(stage = %tracker.stage, error = %e, "generation failed");
                    tracker.fail(e);
                },
            }
            (result, timings)
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        request: &GenerationRequest,
        cancel: Option<&CancellationToken>,
        tracker: &mut StageTracker<'_>,
        timings: &mut GenerationTimings,
    ) -> Result<Vec<Tile>> {
        let tile_size = request.tile_size.unwrap_or(self.config.tile_size);

        let stage_start = Instant::now();
        self.validate(request, tile_size)?;
        timings.validation_ms = elapsed_ms(stage_start);

        if !self.backend.is_available() {
            return Err(TileInpaintError::backend_unavailable(format!(
                "{} backend is not available",
                self.backend.name()
            )));
        }
        ensure_not_cancelled(cancel)?;

        tracker.advance(PipelineStage::Inpainting);
        let stage_start = Instant::now();
        let inference = self
            .backend
            .generate(&request.scene, &request.mask, &request.generation);
        let generated = match cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => Err(TileInpaintError::cancelled(
                    "request cancelled during inpainting",
                )),
                result = inference => result,
            },
            None => inference.await,
        }?;
        timings.inpainting_ms = elapsed_ms(stage_start);

        if generated.dimensions() != request.scene.dimensions() {
            return Err(TileInpaintError::dimension_mismatch(
                "generated image",
                request.scene.dimensions(),
                generated.dimensions(),
            ));
        }

        tracker.advance(PipelineStage::Reconciling);
        let stage_start = Instant::now();
        let reconciled = if request.locked_edges.is_empty() {
            generated
        } else {
            EdgeReconciler::new(self.config.edge_falloff).reconcile(
                &generated,
                &request.locked_edges,
                Some(&request.mask),
            )?
        };
        timings.reconcile_ms = elapsed_ms(stage_start);
        ensure_not_cancelled(cancel)?;

        let stage_start = Instant::now();
        let tiles =
            TileSlicer::slice_with_origin(&reconciled, &request.bounds, request.origin, tile_size)?;
        timings.slicing_ms = elapsed_ms(stage_start);

        tracker.advance(PipelineStage::Sliced);
        Ok(tiles)
    }

    /// Fail fast on malformed requests before any inference runs
    fn validate(&self, request: &GenerationRequest, tile_size: u32) -> Result<()> {
        RasterValidator::ensure_tile_size(tile_size)?;
        RasterValidator::ensure_supported(&request.scene)?;
        RasterValidator::ensure_mask_matches(&request.scene, &request.mask)?;
        request.generation.validate()?;
        request.bounds.validate()?;

        if self.config.validate_eagerly {
            RasterValidator::ensure_bounds_within(
                &request.scene,
                &request.bounds,
                request.origin,
                tile_size,
            )?;
            for (index, constraint) in request.locked_edges.iter().enumerate() {
                constraint.validate_against(&request.scene).map_err(|e| {
                    TileInpaintError::invalid_constraint(format!(
                        "constraint #{index}: {}",
                        e.message()
                    ))
                })?;
            }
        }
        Ok(())
    }
}

fn ensure_not_cancelled(cancel: Option<&CancellationToken>) -> Result<()> {
    if cancel.is_some_and(CancellationToken::is_cancelled) {
        return Err(TileInpaintError::cancelled("request cancelled"));
    }
    Ok(())
}
