//! somagrid - extract cube pieces from UPCD point clouds
//!
//! Inputs are merged into one cloud and built in a single pass, or built one
//! by one with `--separate`. The axis lock carries over between separate builds
//! unless `--reset-lock-each-file` is given.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::LevelFilter;
use somagrid_algorithms::{BuildReport, PieceExtractor, PipelineConfig};
use somagrid_io::{load_config, read_merged, write_report_json, ReportExportOptions, UpcdReadOptions};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "somagrid")]
#[command(about = "Extract cube pieces and their visible faces from coloured point clouds", long_about = None)]
struct Cli {
    /// UPCD files to load
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Pipeline configuration (JSON); missing fields keep their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the build report as JSON; a directory when used with --separate
    #[arg(long)]
    json_out: Option<PathBuf>,

    /// Keep every N-th point
    #[arg(long, default_value = "1")]
    stride: usize,

    /// Keep local-space files in sensor coordinates
    #[arg(long)]
    no_transform: bool,

    /// Emit every boundary face without checking point support
    #[arg(long)]
    all_faces: bool,

    /// Build each input on its own instead of merging them
    #[arg(long)]
    separate: bool,

    /// Clear the axis lock before every separate build
    #[arg(long, requires = "separate")]
    reset_lock_each_file: bool,

    /// Include point indices in the JSON report
    #[arg(long)]
    with_indices: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    // RUST_LOG wins over -v
    builder.parse_default_env();
    builder.init();
}

fn load_pipeline_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(path).with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if cli.all_faces {
        config.faces.emit_all_boundary_faces = true;
    }
    Ok(config)
}

fn print_summary(source: &str, report: &BuildReport) {
    println!(
        "{}: {} points, voxel {:.4} m, {} clusters ({} dropped by shape gate)",
        source,
        report.point_count,
        report.voxel_size,
        report.clusters.len(),
        report.gate_dropped
    );
    for cluster in &report.clusters {
        match &cluster.rejection {
            Some(reason) => println!("  #{:<3} {:<12} {:?}: {}", cluster.id, cluster.name, cluster.status, reason),
            None => println!(
                "  #{:<3} {:<12} {:?}: {} points, {} cells, {} faces",
                cluster.id,
                cluster.name,
                cluster.status,
                cluster.stats.point_count,
                cluster.cells.len(),
                cluster.faces.len()
            ),
        }
    }
    let counts: Vec<String> = report
        .status_counts()
        .iter()
        .map(|(status, n)| format!("{:?}={}", status, n))
        .collect();
    println!("  status: {}", counts.join(", "));
    println!("  faces: {}", report.face_count());
}

fn export(report: &BuildReport, path: &Path, options: &ReportExportOptions) -> Result<()> {
    write_report_json(report, path, options).with_context(|| format!("Failed to write report {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.stride == 0 {
        bail!("--stride must be at least 1");
    }

    let config = load_pipeline_config(&cli)?;
    let extractor = PieceExtractor::new(config).context("Invalid pipeline configuration")?;
    let read_options = UpcdReadOptions {
        apply_transform: !cli.no_transform,
        stride: cli.stride,
    };
    let export_options = ReportExportOptions {
        pretty: true,
        include_indices: cli.with_indices,
    };

    if !cli.separate {
        let cloud = read_merged(&cli.inputs, &read_options).context("Failed to load inputs")?;
        let report = extractor.build(&cloud).context("Build failed")?;
        print_summary(&format!("{} input(s)", cli.inputs.len()), &report);
        if let Some(path) = &cli.json_out {
            export(&report, path, &export_options)?;
        }
        return Ok(());
    }

    if let Some(dir) = &cli.json_out {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let mut inputs = cli.inputs.clone();
    inputs.sort();
    for input in &inputs {
        if cli.reset_lock_each_file {
            extractor.reset_axis_lock();
        }
        let cloud = read_merged(std::slice::from_ref(input), &read_options)
            .with_context(|| format!("Failed to load {}", input.display()))?;
        let report = extractor
            .build(&cloud)
            .with_context(|| format!("Build failed for {}", input.display()))?;
        print_summary(&input.display().to_string(), &report);

        if let Some(dir) = &cli.json_out {
            let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("report");
            export(&report, &dir.join(format!("{}.json", stem)), &export_options)?;
        }
    }

    Ok(())
}
