//! Tile generation CLI tool
//!
//! Reads a JSON generation request, runs it through the pipeline and writes
//! one PNG per tile plus a JSON summary.

use super::{backend_factory::CliBackendFactory, config::CliConfigBuilder, request::RequestFile};
use crate::{
    backends::BackendKind,
    error::ErrorKind,
    pipeline::GenerationPipeline,
    services::{PipelineStage, ProgressReporter, ProgressUpdate},
    tracing_config::{init_cli_tracing, TracingFormat},
    types::{GenerationOutcome, GenerationTimings},
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// File name of the JSON summary written next to the tiles
pub const SUMMARY_FILE: &str = "summary.json";

/// Seam-free tile regeneration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "tile-inpaint")]
pub struct Cli {
    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Console, global = true)]
    pub log_format: LogFormat,

    /// Base URL of the stable-diffusion-webui compatible inpainting service
    #[arg(long, value_name = "URL", global = true)]
    pub remote_url: Option<String>,

    /// Remote request timeout in seconds
    #[arg(long, value_name = "SECS", global = true)]
    pub remote_timeout: Option<u64>,

    /// ONNX inpainting model [default: platform cache directory]
    #[arg(long, value_name = "PATH", global = true)]
    pub model: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Regenerate the tiles described by a request file
    Generate(GenerateArgs),
    /// List inpainting backends and whether they can run
    Backends,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// JSON request (sceneImage, mask, lockedEdges, prompt, keywords, tileSize, bounds)
    #[arg(short, long, value_name = "FILE")]
    pub request: PathBuf,

    /// Directory receiving tile_<x>_<y>.png files and summary.json
    #[arg(short, long, value_name = "DIR")]
    pub out: PathBuf,

    /// Inpainting backend [default: first available of onnx, remote, placeholder]
    #[arg(short, long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Seam blend width in pixels (0 = raw overwrite)
    #[arg(long, value_name = "PX")]
    pub edge_falloff: Option<u32>,

    /// Skip bounds and constraint checks before inference
    #[arg(long)]
    pub lazy_validation: bool,

    /// Placeholder fill color as #RRGGBB
    #[arg(long, value_name = "HEX")]
    pub sentinel: Option<String>,

    /// Also embed every tile as a PNG data URL in the summary
    #[arg(long)]
    pub embed_images: bool,

    /// Disable the progress spinner
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum LogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<LogFormat> for TracingFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Console => Self::Console,
            LogFormat::Compact => Self::Compact,
            #[cfg(feature = "tracing-json")]
            LogFormat::Json => Self::Json,
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose, cli.log_format.into())
        .context("Failed to initialize tracing")?;

    match &cli.command {
        Command::Generate(args) => run_generate(&cli, args).await,
        Command::Backends => show_backends(&cli).await,
    }
}

async fn run_generate(cli: &Cli, args: &GenerateArgs) -> Result<()> {
    let factory = CliBackendFactory::new(CliConfigBuilder::backend_factory(
        cli.remote_url.as_deref(),
        cli.remote_timeout,
        cli.model.as_deref(),
        args.sentinel.as_deref(),
    )?);
    let pipeline_config = CliConfigBuilder::pipeline_config(args)?;

    let request = RequestFile::load(&args.request)
        .with_context(|| format!("Failed to read request {}", args.request.display()))?
        .into_request()
        .context("Failed to decode request")?;
    info!(
        request = %args.request.display(),
        bounds = ?request.bounds,
        locked_edges = request.locked_edges.len(),
        "Loaded generation request"
    );

    let backend = factory
        .resolve(args.backend)
        .await
        .context("No usable inpainting backend")?;

    let spinner = progress_spinner(args.no_progress);
    let pipeline = GenerationPipeline::with_config(backend, pipeline_config)
        .context("Failed to create generation pipeline")?
        .with_reporter(Arc::new(SpinnerReporter {
            bar: spinner.clone(),
        }));

    let outcome = pipeline.generate(&request).await;
    log_timings(&outcome.timings);

    let summary = GenerationSummary::write(&outcome, &args.out, args.embed_images)
        .with_context(|| format!("Failed to write results to {}", args.out.display()))?;

    if !outcome.success {
        anyhow::bail!(
            "Generation failed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }

    info!(
        tiles = summary.tiles.len(),
        out = %args.out.display(),
        backend = %outcome.backend,
        "Tiles written"
    );
    Ok(())
}

async fn show_backends(cli: &Cli) -> Result<()> {
    let factory = CliBackendFactory::new(CliConfigBuilder::backend_factory(
        cli.remote_url.as_deref(),
        cli.remote_timeout,
        cli.model.as_deref(),
        None,
    )?);

    println!("{:<12} {:<9} {:<10} DETAIL", "BACKEND", "COMPILED", "AVAILABLE");
    for status in factory.statuses().await {
        println!(
            "{:<12} {:<9} {:<10} {}",
            status.kind.as_str(),
            if status.compiled { "yes" } else { "no" },
            if status.available { "yes" } else { "no" },
            status.detail.unwrap_or_default()
        );
    }
    Ok(())
}

fn progress_spinner(disabled: bool) -> ProgressBar {
    if disabled || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}")
    {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn log_timings(timings: &GenerationTimings) {
    info!("Generation breakdown:");
    info!("  ├─ Validation: {}ms", timings.validation_ms);
    info!(
        "  ├─ Inpainting: {}ms ({:.1}%)",
        timings.inpainting_ms,
        timings.inpainting_ratio() * 100.0
    );
    info!("  ├─ Reconcile: {}ms", timings.reconcile_ms);
    info!("  ├─ Slicing: {}ms", timings.slicing_ms);
    info!("  └─ Total: {}ms", timings.total_ms);
}

/// Drives the spinner from pipeline stage transitions
struct SpinnerReporter {
    bar: ProgressBar,
}

impl ProgressReporter for SpinnerReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.bar
            .set_message(format!("{} ({}%)", update.description, update.progress));
    }

    fn report_completion(&self, _request_id: Uuid, timings: &GenerationTimings) {
        self.bar
            .finish_with_message(format!("Generated in {}ms", timings.total_ms));
    }

    fn report_error(&self, _request_id: Uuid, stage: PipelineStage, error: &str) {
        self.bar
            .abandon_with_message(format!("Failed while {stage}: {error}"));
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TileSummary {
    grid_x: i32,
    grid_y: i32,
    file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_base64: Option<String>,
}

/// Machine-readable record of one CLI generation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationSummary {
    request_id: Uuid,
    success: bool,
    error: Option<String>,
    error_kind: Option<ErrorKind>,
    backend: String,
    tiles: Vec<TileSummary>,
    timings: GenerationTimings,
    completed_at: DateTime<Utc>,
}

impl GenerationSummary {
    /// Write every tile as PNG plus `summary.json` into `out_dir`
    fn write(outcome: &GenerationOutcome, out_dir: &Path, embed_images: bool) -> Result<Self> {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("Failed to create {}", out_dir.display()))?;

        let mut tiles = Vec::with_capacity(outcome.tiles.len());
        for tile in &outcome.tiles {
            let file = format!("tile_{}_{}.png", tile.grid_x, tile.grid_y);
            tile.image
                .save(out_dir.join(&file))
                .with_context(|| format!("Failed to save {file}"))?;
            let image_base64 = if embed_images {
                Some(tile.to_data_url()?)
            } else {
                None
            };
            tiles.push(TileSummary {
                grid_x: tile.grid_x,
                grid_y: tile.grid_y,
                file,
                image_base64,
            });
        }

        let summary = Self {
            request_id: outcome.request_id,
            success: outcome.success,
            error: outcome.error.clone(),
            error_kind: outcome.error_kind,
            backend: outcome.backend.clone(),
            tiles,
            timings: outcome.timings.clone(),
            completed_at: outcome.completed_at,
        };
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(out_dir.join(SUMMARY_FILE), json)?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChannelLayout, Tile};
    use crate::utils::raster;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_generate() {
        let cli = Cli::try_parse_from([
            "tile-inpaint",
            "-vv",
            "generate",
            "--request",
            "req.json",
            "--out",
            "tiles",
            "--backend",
            "placeholder",
            "--edge-falloff",
            "0",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.request, PathBuf::from("req.json"));
        assert_eq!(args.backend, Some(BackendKind::Placeholder));
        assert_eq!(args.edge_falloff, Some(0));
        assert_eq!(
            CliConfigBuilder::pipeline_config(&args).unwrap().edge_falloff,
            0
        );
    }

    #[test]
    fn test_generate_requires_request_and_out() {
        assert!(Cli::try_parse_from(["tile-inpaint", "generate", "--out", "x"]).is_err());
        assert!(Cli::try_parse_from(["tile-inpaint", "backends"]).is_ok());
    }

    #[test]
    fn test_summary_writes_tiles_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let tile = Tile::new(-1, 2, raster::filled(4, 4, ChannelLayout::Rgba, [1, 2, 3, 255]));
        let outcome = GenerationOutcome::succeeded(
            Uuid::new_v4(),
            "placeholder".to_string(),
            vec![tile],
            GenerationTimings::default(),
        );

        let summary = GenerationSummary::write(&outcome, dir.path(), true).unwrap();

        assert_eq!(summary.tiles[0].file, "tile_-1_2.png");
        assert!(dir.path().join("tile_-1_2.png").exists());
        let json: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(SUMMARY_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["tiles"][0]["gridX"], -1);
        assert!(json["tiles"][0]["imageBase64"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }
}
