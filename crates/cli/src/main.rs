//! Habiscape CLI - impedance and affinity surfaces for connectivity models

mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use habiscape_core::io::{read_geotiff, write_geotiff, Compression, GeoTiffOptions, PixelType};
use habiscape_core::Raster;
use habiscape_impedance::prelude::*;

use config::RunConfig;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "habiscape")]
#[command(author, version, about = "Impedance and affinity surfaces for landscape connectivity", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Add stressor edge effects to a baseline impedance raster
    Impedance {
        /// YAML run configuration; replaces the other options
        #[arg(short, long, conflicts_with_all = ["baseline", "params", "stressor", "output"])]
        config: Option<PathBuf>,
        /// Baseline impedance raster
        #[arg(long, required_unless_present = "config")]
        baseline: Option<PathBuf>,
        /// Impedance configuration with per-stressor decay parameters
        #[arg(long, required_unless_present = "config")]
        params: Option<PathBuf>,
        /// Stressor raster as NAME=PATH (repeatable)
        #[arg(short, long, value_parser = parse_stressor)]
        stressor: Vec<(String, PathBuf)>,
        /// Output file
        #[arg(short, long, required_unless_present = "config")]
        output: Option<PathBuf>,
        /// Maximum impedance (defaults to the baseline maximum)
        #[arg(long)]
        baseline_max: Option<f64>,
        /// Output data type
        #[arg(long, value_enum, default_value = "int32")]
        output_type: OutputType,
        /// Write each stressor's proximity and edge-effect rasters here
        #[arg(long)]
        intermediate_dir: Option<PathBuf>,
        /// Worker threads (1 = sequential, 0 = all cores)
        #[arg(short, long, default_value = "0")]
        threads: usize,
    },
    /// Reciprocal of an impedance raster (1 / impedance)
    Affinity {
        /// Input impedance raster
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Output data type
        #[arg(long, value_enum, default_value = "float32")]
        output_type: OutputType,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputType {
    Int32,
    Float32,
    Float64,
}

impl From<OutputType> for PixelType {
    fn from(t: OutputType) -> Self {
        match t {
            OutputType::Int32 => PixelType::Int32,
            OutputType::Float32 => PixelType::Float32,
            OutputType::Float64 => PixelType::Float64,
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("warning: a global tracing subscriber was already set");
    }
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn stressor_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{bar:30}] {pos}/{len} stressors {msg}")
    {
        pb.set_style(style);
    }
    pb
}

fn parse_stressor(s: &str) -> std::result::Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((name, path)) if !name.trim().is_empty() && !path.trim().is_empty() => {
            Ok((name.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => Err(format!("expected NAME=PATH, got '{}'", s)),
    }
}

fn read_raster(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> = read_geotiff(path, None)
        .with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn write_result(raster: &Raster<f64>, path: &Path, options: GeoTiffOptions) -> Result<()> {
    let pb = spinner("Writing output...");
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    write_geotiff(raster, path, Some(options)).context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Commands ───────────────────────────────────────────────────────────

fn info_command(input: &Path) -> Result<()> {
    let raster = read_raster(input)?;
    let (rows, cols) = raster.shape();
    let bounds = raster.bounds();
    let stats = raster.statistics();
    let transform = raster.transform();

    println!("File: {}", input.display());
    println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
    println!(
        "Pixel size: {} x {}",
        transform.x_spacing(),
        transform.y_spacing()
    );
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        bounds.0, bounds.1, bounds.2, bounds.3
    );
    if let Some(crs) = raster.crs() {
        println!("CRS: {}", crs);
    }
    if let Some(nodata) = raster.nodata() {
        println!("NoData: {}", nodata);
    }
    println!("\nStatistics:");
    if let Some(min) = stats.min {
        println!("  Min: {:.4}", min);
    }
    if let Some(max) = stats.max {
        println!("  Max: {:.4}", max);
    }
    if let Some(mean) = stats.mean {
        println!("  Mean: {:.4}", mean);
    }
    println!(
        "  Valid cells: {} ({:.1}%)",
        stats.valid_count,
        100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
    );
    Ok(())
}

fn impedance_command(run: &RunConfig) -> Result<()> {
    let params = ConfigNode::from_path(&run.impedance_config).with_context(|| {
        format!(
            "Failed to load impedance configuration {}",
            run.impedance_config.display()
        )
    })?;
    let stressors = run.stressor_list();
    if stressors.is_empty() {
        warn!("no stressors given; the output is the capped baseline");
    }

    let baseline = read_raster(&run.baseline)?;
    let start = Instant::now();

    let pb = stressor_bar(stressors.len());
    let observer = pb.clone();
    let mut pipeline = ImpedancePipeline::new(&params)
        .with_mode(run.processing_mode())
        .with_observer(move |stage| match stage {
            PipelineStage::ProcessingStressor(_) => observer.inc(1),
            PipelineStage::Finalizing => observer.set_message("finalizing"),
            _ => {}
        });
    if let Some(dir) = &run.intermediate_dir {
        pipeline = pipeline.with_intermediates(IntermediateOutputs::new(dir));
    }

    let result = pipeline
        .run(&baseline, run.baseline_max, &stressors)
        .context("Impedance accumulation failed")?;
    pb.finish_and_clear();
    let elapsed = start.elapsed();

    for report in &result.reports {
        println!("  {}", report);
    }
    println!(
        "  Applied {} of {} stressors (max impedance {})",
        result.applied_count(),
        result.reports.len(),
        result.baseline_max
    );

    write_result(&result.impedance, &run.output, run.output_options())?;
    done("Impedance", &run.output, elapsed);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Info { input } => info_command(&input)?,

        Commands::Impedance {
            config,
            baseline,
            params,
            stressor,
            output,
            baseline_max,
            output_type,
            intermediate_dir,
            threads,
        } => {
            let run = match config {
                Some(path) => RunConfig::load(&path)?,
                None => {
                    let (Some(baseline), Some(impedance_config), Some(output)) =
                        (baseline, params, output)
                    else {
                        bail!("--baseline, --params and --output are required without --config");
                    };
                    let run = RunConfig {
                        baseline,
                        baseline_max,
                        impedance_config,
                        stressors: stressor.into_iter().collect::<BTreeMap<_, _>>(),
                        output,
                        output_type: output_type.into(),
                        compression: Compression::Lzw,
                        intermediate_dir,
                        threads: Some(threads),
                    };
                    run.validate()?;
                    run
                }
            };
            info!(threads = habiscape_impedance::worker_count(), "starting impedance run");
            impedance_command(&run)?;
        }

        Commands::Affinity {
            input,
            output,
            output_type,
        } => {
            let raster = read_raster(&input)?;
            let start = Instant::now();
            let affinity = compute_affinity(&raster).context("Affinity computation failed")?;
            let elapsed = start.elapsed();
            write_result(
                &affinity,
                &output,
                GeoTiffOptions::new(output_type.into(), Compression::Lzw),
            )?;
            done("Affinity", &output, elapsed);
        }
    }

    Ok(())
}
