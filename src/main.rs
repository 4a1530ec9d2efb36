//! Binary entrypoint for photo-vr.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt};

use photo_vr::capability::{CapabilityProbe, ConfiguredProbe};
use photo_vr::config::Configuration;
use photo_vr::events::{PipelineRequest, ViewerCommand};
use photo_vr::processing::pipeline::SynthesisPipeline;
use photo_vr::tasks;

#[derive(Debug, Parser)]
#[command(name = "photo-vr", version, about = "Turn a photo into a 3D model and view it")]
struct Cli {
    /// Photo to convert
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    /// Path to YAML config file (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override pipeline.depth-scale
    #[arg(long, value_name = "F")]
    depth_scale: Option<f32>,

    /// Override pipeline.grid-resolution, e.g. 64x48
    #[arg(long, value_name = "MxN", value_parser = parse_grid)]
    grid: Option<(u32, u32)>,

    /// Build the model without opening a window and print its statistics
    #[arg(long)]
    dry_run: bool,

    /// Write the foreground mask as a grayscale PNG
    #[arg(long, value_name = "PNG")]
    export_mask: Option<PathBuf>,

    /// Write the depth field as a grayscale PNG
    #[arg(long, value_name = "PNG")]
    export_depth: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn parse_grid(s: &str) -> Result<(u32, u32), String> {
    let (m, n) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected MxN, got {s:?}"))?;
    let m = m.trim().parse().map_err(|e| format!("bad column count: {e}"))?;
    let n = n.trim().parse().map_err(|e| format!("bad row count: {e}"))?;
    Ok((m, n))
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(format!("photo_vr={level}").parse()?)
        .add_directive("wgpu=warn".parse()?)
        .add_directive("winit=warn".parse()?);
    fmt().with_env_filter(filter).with_target(true).compact().init();
    Ok(())
}

fn load_configuration(cli: &Cli) -> Result<Configuration> {
    let mut cfg = match &cli.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    };
    if let Some(scale) = cli.depth_scale {
        cfg.pipeline.depth_scale = scale;
    }
    if let Some((columns, rows)) = cli.grid {
        cfg.pipeline.grid_resolution = [columns, rows];
    }
    cfg.validated().context("invalid configuration values")
}

fn build_pipeline(cfg: &Configuration) -> Result<SynthesisPipeline> {
    Ok(SynthesisPipeline::new(
        cfg.pipeline.foreground.build(),
        cfg.pipeline.depth.build(),
        cfg.pipeline.options()?,
    ))
}

fn export_png(image: impl FnOnce() -> image::GrayImage, path: &Path, what: &str) -> Result<()> {
    image()
        .save(path)
        .with_context(|| format!("failed to write {what} to {}", path.display()))?;
    info!(path = %path.display(), "{what} exported");
    Ok(())
}

/// Runs the pipeline synchronously and reports what it produced.
fn run_headless(cli: &Cli, cfg: &Configuration) -> Result<()> {
    let image = tasks::loader::load_image(&cli.image, cfg.pipeline.max_input_dimension)?;
    let (width, height) = image.dimensions();
    let mut pipeline = build_pipeline(cfg)?;
    let mesh = pipeline
        .submit_image(image)
        .context("mesh synthesis failed")?;

    if let (Some(path), Some(mask)) = (cli.export_mask.as_deref(), pipeline.mask()) {
        export_png(|| mask.to_gray_image(), path, "mask")?;
    }
    if let (Some(path), Some(depth)) = (cli.export_depth.as_deref(), pipeline.depth_field()) {
        export_png(|| depth.to_gray_image(), path, "depth field")?;
    }

    if cli.dry_run {
        let (min, max) = mesh.bounds();
        let background = pipeline.mask().map_or(0.0, |m| m.background_ratio());
        println!("image:      {} ({width}x{height})", cli.image.display());
        println!("background: {:.1}%", background * 100.0);
        println!("vertices:   {}", mesh.vertex_count());
        println!("triangles:  {}", mesh.triangle_count());
        println!(
            "bounds:     [{:.3}, {:.3}, {:.3}] .. [{:.3}, {:.3}, {:.3}]",
            min[0], min[1], min[2], max[0], max[1], max[2]
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let cfg = load_configuration(&cli)?;
    tracing::debug!("configuration:\n{cfg:#?}");

    if cli.dry_run || cli.export_mask.is_some() || cli.export_depth.is_some() {
        run_headless(&cli, &cfg)?;
        if cli.dry_run {
            return Ok(());
        }
    }

    if !cli.image.exists() {
        bail!("image {} does not exist", cli.image.display());
    }

    let capability = ConfiguredProbe::new(&cfg.immersive).probe();

    // Both queues are unbounded so resets are never dropped under load.
    let (viewer_tx, viewer_rx) = mpsc::unbounded_channel::<ViewerCommand>();
    let (pipeline_tx, pipeline_rx) = mpsc::unbounded_channel::<PipelineRequest>();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let mut tasks = JoinSet::new();

    // Synthesis pipeline
    tasks.spawn({
        let to_viewer = viewer_tx.clone();
        let cancel = cancel.clone();
        let pipeline = build_pipeline(&cfg)?;
        async move {
            tasks::pipeline::run(pipeline_rx, to_viewer, cancel, pipeline)
                .await
                .context("pipeline task failed")
        }
    });

    // Photo loading
    tasks.spawn({
        let path = cli.image.clone();
        let max_dimension = cfg.pipeline.max_input_dimension;
        let to_pipeline = pipeline_tx.clone();
        async move {
            let image = tokio::task::spawn_blocking(move || {
                tasks::loader::load_image(&path, max_dimension)
            })
            .await
            .context("loader panicked")??;
            to_pipeline
                .send(PipelineRequest::SubmitImage(image))
                .context("pipeline closed before the photo arrived")
        }
    });

    // The viewer owns the main thread until its window closes.
    if let Err(e) = tasks::viewer::run_windowed(
        cfg.clone(),
        capability,
        (viewer_tx, viewer_rx),
        pipeline_tx,
        cancel.clone(),
    )
    .context("viewer failed")
    {
        tracing::error!("{e:?}");
    }
    cancel.cancel();

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
    }

    Ok(())
}
