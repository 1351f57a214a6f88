use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rookgl_loader::{
    CycleReport, EventRecorder, HeadlessContext, HeadlessCounters, LoaderOption, LoaderOptions,
    LoaderStats, RecordedEvent, ResourceLoader, Size, TracingListener,
};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub mod decoder;
pub mod manifest;

use decoder::FsDecoder;
use manifest::Manifest;

const DEFAULT_FRAMES: u32 = 3;

#[derive(Debug, Parser)]
#[command(name = "rookgl")]
#[command(about = "RookGL resource loader driver")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a headless frame loop over a resource manifest and print a JSON report.
    Simulate {
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,
        /// Number of frames to run (overrides the manifest).
        #[arg(long)]
        frames: Option<u32>,
        /// Loader options file (TOML).
        #[arg(long, value_name = "FILE")]
        options: Option<PathBuf>,
        /// Canvas size as WIDTHxHEIGHT.
        #[arg(long, default_value = "800x600", value_parser = parse_size)]
        canvas: Size,
    },
    /// Print the effective loader options as JSON.
    Options {
        #[arg(long, value_name = "FILE")]
        options: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    frames: Vec<FrameOutput>,
    options: LoaderOptions,
    stats: LoaderStats,
    cached: Vec<CachedOutput>,
    events: Vec<RecordedEvent>,
    gpu: HeadlessCounters,
    /// GPU objects still alive after tearing the loader down.
    leaked_objects: usize,
}

#[derive(Debug, Serialize)]
struct FrameOutput {
    frame: u32,
    #[serde(flatten)]
    report: CycleReport,
}

#[derive(Debug, Serialize)]
struct CachedOutput {
    name: String,
    #[serde(flatten)]
    object: rookgl_loader::CachedObject,
}

/// Installs a stderr `tracing` subscriber filtered by `RUST_LOG` (default `warn`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Simulate { manifest, frames, options, canvas } => {
            run_simulate(&manifest, frames, options.as_deref(), canvas)
        }
        Commands::Options { options } => {
            let options = effective_options(options.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&options)?);
            Ok(())
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_simulate(
    manifest_path: &Path,
    frames: Option<u32>,
    options_path: Option<&Path>,
    canvas: Size,
) -> Result<()> {
    let manifest = Manifest::from_file(manifest_path)?;
    let options = effective_options(options_path)?;
    let resources = manifest.scheduled_resources().context("invalid resource entry")?;
    let frame_count = frames.or(manifest.frames).unwrap_or(DEFAULT_FRAMES);

    let loader = ResourceLoader::with_options(FsDecoder::new(manifest.root()), options);
    let recorder = Arc::new(EventRecorder::new());
    loader.add_listener(Arc::new(TracingListener));
    loader.add_listener(recorder.clone());
    let mut gfx = HeadlessContext::new(canvas);

    info!(manifest = %manifest_path.display(), frames = frame_count, "starting simulation");

    let mut frame_reports = Vec::with_capacity(frame_count as usize);
    for frame in 0..frame_count {
        for change in manifest.options.iter().filter(|change| change.frame == frame) {
            let option = LoaderOption::parse(&change.name, &change.value_text())
                .with_context(|| format!("invalid option change on frame {frame}"))?;
            loader.set_option(option)?;
        }
        if manifest.reload_frames.contains(&frame) {
            loader.trigger_reload();
        }
        loader.enqueue(
            resources.iter().filter(|r| r.frame == frame).map(|r| r.handle.clone()),
        );
        loader.schedule_destroy(
            resources.iter().filter(|r| r.destroy_frame == Some(frame)).map(|r| r.handle.clone()),
        );

        gfx.advance(1.0 / 60.0);
        let report = loader.per_frame_cycle(&mut gfx);
        frame_reports.push(FrameOutput { frame, report });
    }

    let cached = loader
        .cached_entries()
        .into_iter()
        .map(|(handle, object)| CachedOutput { name: handle.name().to_string(), object })
        .collect();
    let stats = loader.stats();
    let options = loader.options();

    loader.destroy_all(&mut gfx);
    let leaked_objects = gfx.live_textures()
        + gfx.live_programs()
        + gfx.live_framebuffers()
        + gfx.live_depth_buffers();

    let report = SimulationReport {
        frames: frame_reports,
        options,
        stats,
        cached,
        events: recorder.events(),
        gpu: gfx.counters(),
        leaked_objects,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Defaults, then the options file, then `ROOKGL_*` environment variables.
fn effective_options(path: Option<&Path>) -> Result<LoaderOptions> {
    let options = match path {
        Some(path) => LoaderOptions::from_file(path)
            .with_context(|| format!("failed to load options from {}", path.display()))?,
        None => LoaderOptions::default(),
    };
    options.with_env_overrides().context("invalid ROOKGL_* environment variable")
}

fn parse_size(text: &str) -> Result<Size, String> {
    let (width, height) =
        text.split_once(['x', 'X']).ok_or_else(|| format!("expected WIDTHxHEIGHT, got {text}"))?;
    let parse = |part: &str| part.trim().parse::<u32>().map_err(|e| format!("{part}: {e}"));
    Ok(Size::new(parse(width)?, parse(height)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("800x600").unwrap(), Size::new(800, 600));
        assert_eq!(parse_size("64X32").unwrap(), Size::new(64, 32));
        assert!(parse_size("800").is_err());
        assert!(parse_size("ax1").is_err());
    }
}
