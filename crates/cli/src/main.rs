//! CHEAQI CLI - point samples to georeferenced raster surfaces

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::{bounded, select};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cheaqi_algorithms::interpolation::Resolution;
use cheaqi_core::io::read_multiband_geotiff;
use cheaqi_pipeline::geostack::{assemble, StackInput};
use cheaqi_pipeline::naming::catalog_path;
use cheaqi_pipeline::{
    detect, Pipeline, PipelineConfig, PipelineError, RunPhase, RunStatus, Table, TemporalMode,
};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "cheaqi")]
#[command(author, version, about = "Interpolate point samples into georeferenced rasters", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show column statistics and detected coordinate/variable columns
    Inspect {
        /// Input table (CSV, semicolon or tab separated)
        input: PathBuf,
        /// Field delimiter (sniffed from the header by default)
        #[arg(short, long)]
        delimiter: Option<char>,
    },
    /// Interpolate every variable (and day) and assemble geostacks
    Run(RunArgs),
    /// Stack single-band rasters into one multi-band file with a catalog
    Stack {
        /// Output geostack file
        #[arg(short, long)]
        output: PathBuf,
        /// Run id recorded in the catalog
        #[arg(long)]
        run_id: Option<String>,
        /// Input rasters, in band order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Show information about a raster or geostack file
    Info {
        /// Input raster file
        input: PathBuf,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Input table
    input: PathBuf,
    /// Output directory
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,
    /// JSON configuration file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Interpolation method: kriging, idw, rbf
    #[arg(short, long)]
    method: Option<String>,
    /// Grid nodes per axis
    #[arg(long, conflicts_with = "cell_size")]
    cells: Option<usize>,
    /// Grid node spacing in coordinate units
    #[arg(long)]
    cell_size: Option<f64>,
    /// Comma-separated variables, in geostack order
    #[arg(long, value_delimiter = ',')]
    variables: Vec<String>,
    /// Latitude column
    #[arg(long)]
    lat: Option<String>,
    /// Longitude column
    #[arg(long)]
    lon: Option<String>,
    /// Date column
    #[arg(long)]
    date: Option<String>,
    /// Temporal mode: auto, daily, aggregate
    #[arg(long)]
    temporal: Option<String>,
    /// Keep only the first N dates per variable
    #[arg(long)]
    max_days: Option<usize>,
    /// Worker threads
    #[arg(short, long)]
    jobs: Option<usize>,
    /// Wall-clock limit in seconds
    #[arg(long)]
    timeout: Option<u64>,
    /// Fixed run id
    #[arg(long)]
    run_id: Option<String>,
    /// Output file prefix (input file stem by default)
    #[arg(long)]
    prefix: Option<String>,
    /// Output CRS
    #[arg(long)]
    crs: Option<String>,
    /// Fit a separate grid to each variable
    #[arg(long)]
    per_variable_grid: bool,
    /// Skip the all-variables geostack
    #[arg(long)]
    no_combined: bool,
    /// Also write kriging variance rasters
    #[arg(long)]
    write_variance: bool,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn build_config(args: &RunArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(m) = &args.method {
        config.method = m.clone();
    }
    if let Some(n) = args.cells {
        config.resolution = Resolution::Cells(n);
    }
    if let Some(s) = args.cell_size {
        config.resolution = Resolution::CellSize(s);
    }
    if !args.variables.is_empty() {
        config.variables = args.variables.clone();
    }
    if args.lat.is_some() {
        config.lat_column = args.lat.clone();
    }
    if args.lon.is_some() {
        config.lon_column = args.lon.clone();
    }
    if args.date.is_some() {
        config.date_column = args.date.clone();
    }
    if let Some(mode) = &args.temporal {
        config.temporal_mode = match mode.to_lowercase().as_str() {
            "auto" => TemporalMode::Auto,
            "daily" => TemporalMode::Daily,
            "aggregate" | "all" => TemporalMode::Aggregate,
            _ => bail!("Unknown temporal mode: {}. Use auto, daily or aggregate.", mode),
        };
    }
    if args.max_days.is_some() {
        config.max_days_per_variable = args.max_days;
    }
    if let Some(j) = args.jobs {
        config.jobs = j;
    }
    if args.timeout.is_some() {
        config.timeout_secs = args.timeout;
    }
    if args.run_id.is_some() {
        config.run_id = args.run_id.clone();
    }
    if args.prefix.is_some() {
        config.output_prefix = args.prefix.clone();
    }
    if let Some(crs) = &args.crs {
        config.crs = crs.clone();
    }
    if args.per_variable_grid {
        config.shared_grid = false;
    }
    if args.no_combined {
        config.combined_geostack = false;
    }
    if args.write_variance {
        config.write_variance = true;
    }
    Ok(config)
}

/// Print a structured error on stderr and exit non-zero
fn fail(err: &PipelineError) -> ! {
    match serde_json::to_string_pretty(&err.to_structured()) {
        Ok(json) => eprintln!("{}", json),
        Err(_) => eprintln!("{}", err),
    }
    std::process::exit(1);
}

fn run(args: RunArgs) -> Result<()> {
    let config = build_config(&args)?;
    let pipeline = Pipeline::new(config);
    let updates = pipeline.status().subscribe();
    let (stop_tx, stop_rx) = bounded::<()>(1);

    let progress = std::thread::spawn(move || {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:30}] {pos}/{len} jobs ({elapsed})")
                .unwrap(),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        loop {
            select! {
                recv(updates) -> snapshot => match snapshot {
                    Ok(s) => {
                        pb.set_length(s.jobs_total as u64);
                        pb.set_position(s.jobs_done as u64);
                        let phase = match s.phase {
                            RunPhase::Loaded => "loaded",
                            RunPhase::Detecting => "detecting columns",
                            RunPhase::Running => "interpolating",
                            RunPhase::Assembling => "assembling geostacks",
                            RunPhase::Reported => "done",
                            RunPhase::TimedOut => "timed out",
                        };
                        pb.set_message(phase);
                    }
                    Err(_) => break,
                },
                recv(stop_rx) -> _ => break,
            }
        }
        pb.finish_and_clear();
    });

    let start = Instant::now();
    let result = pipeline.run(&args.input, &args.output_dir);
    let _ = stop_tx.send(());
    let _ = progress.join();

    let report = match result {
        Ok(report) => report,
        Err(e) => fail(&e),
    };

    println!(
        "Run {}: {} of {} jobs succeeded ({} failed, {} skipped) in {:.1?}",
        report.header.run_id,
        report.counts.succeeded,
        report.counts.total,
        report.counts.failed,
        report.counts.skipped,
        start.elapsed()
    );
    for v in &report.variables {
        println!(
            "  {}: {} ok, {} failed ({:.0}%)",
            v.name,
            v.succeeded,
            v.failed,
            v.success_rate * 100.0
        );
    }
    for g in &report.geostacks {
        println!("  Geostack: {} ({} bands)", g.path.display(), g.band_count);
    }
    for w in &report.warnings {
        println!("  Warning: {}", w);
    }

    if report.status == RunStatus::TimedOut {
        eprintln!("Run timed out; partial outputs kept in {}", args.output_dir.display());
        std::process::exit(2);
    }
    Ok(())
}

fn inspect(input: &Path, delimiter: Option<char>) -> Result<()> {
    let delimiter = match delimiter {
        Some(c) if c.is_ascii() => Some(c as u8),
        Some(c) => bail!("Delimiter must be an ASCII character, got {:?}", c),
        None => None,
    };
    let pb = spinner("Reading table...");
    let table = match Table::load(input, delimiter) {
        Ok(t) => t,
        Err(e) => {
            pb.finish_and_clear();
            fail(&e)
        }
    };
    pb.finish_and_clear();

    let detection = detect(&table);
    let summary = serde_json::json!({
        "source": table.source(),
        "rows": table.n_rows(),
        "delimiter": (table.delimiter() as char).to_string(),
        "columns": table.describe(),
        "detection": detection,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn stack(inputs: &[PathBuf], output: &Path, run_id: Option<&str>) -> Result<()> {
    let start = Instant::now();
    let stack_inputs: Vec<StackInput> = inputs
        .iter()
        .map(StackInput::from_raster_file)
        .collect::<Result<_, _>>()
        .unwrap_or_else(|e| fail(&e));
    let (path, catalog) = assemble(&stack_inputs, output, run_id).unwrap_or_else(|e| fail(&e));

    info!("Stacked {} bands in {:.2?}", catalog.band_count, start.elapsed());
    println!("Geostack: {}", path.display());
    println!("Catalog: {}", catalog_path(&path).display());
    Ok(())
}

fn info_cmd(input: &Path) -> Result<()> {
    let pb = spinner("Reading raster...");
    let bands = read_multiband_geotiff(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    pb.finish_and_clear();

    let Some(first) = bands.first() else {
        bail!("{} has no bands", input.display());
    };
    let (rows, cols) = first.shape();
    let bounds = first.bounds();
    let t = first.transform();

    println!("File: {}", input.display());
    println!("Dimensions: {} x {} ({} cells)", cols, rows, first.len());
    println!("Bands: {}", bands.len());
    println!("Pixel size: {} x {}", t.pixel_width, t.pixel_height);
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        bounds.0, bounds.1, bounds.2, bounds.3
    );
    if let Some(crs) = first.crs() {
        println!("CRS: {}", crs);
    }
    println!("NoData: nan");

    for (i, band) in bands.iter().enumerate() {
        let stats = band.statistics();
        println!("\nBand {}: {}", i + 1, band.description().unwrap_or("(no description)"));
        if let (Some(min), Some(max), Some(mean)) = (stats.min, stats.max, stats.mean) {
            println!("  Min: {:.4}  Max: {:.4}  Mean: {:.4}", min, max, mean);
        }
        println!(
            "  Valid cells: {} ({:.1}%)",
            stats.valid_count,
            100.0 * stats.valid_count as f64 / band.len().max(1) as f64
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Inspect { input, delimiter } => inspect(&input, delimiter),
        Commands::Run(args) => run(args),
        Commands::Stack {
            output,
            run_id,
            inputs,
        } => stack(&inputs, &output, run_id.as_deref()),
        Commands::Info { input } => info_cmd(&input),
    }
}
