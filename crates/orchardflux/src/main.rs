use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::{Args, Parser, Subcommand};
use orchardflux_core::calibration::{calibration_from_file, discover_calibration_files};
use orchardflux_core::config::{PresetCatalog, SensorKind};
use orchardflux_core::pipeline::{run_preset, ReportRequest};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod sinks;

const PRESETS_ENV: &str = "ORCHARDFLUX_PRESETS";

#[derive(Parser, Debug)]
#[command(author, version, about = "Orchard sap flow, moisture and weather series", long_about = None)]
struct Cli {
    /// Presets file to use instead of the built-in presets (also ORCHARDFLUX_PRESETS)
    #[arg(long, global = true)]
    presets: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the panels for a preset over a date range
    Plot(PlotArgs),
    /// Compute moisture calibration coefficients from wet/dry readings
    Calibrate(CalibrateArgs),
    /// List the available presets and their sensors
    Presets,
}

#[derive(Args, Debug)]
struct PlotArgs {
    #[arg(long)]
    preset: String,

    /// First day, YYYY-MM-DD
    #[arg(long)]
    start: NaiveDate,

    /// Last day (inclusive), YYYY-MM-DD
    #[arg(long)]
    end: NaiveDate,

    #[arg(long)]
    sap_id: Option<u32>,

    #[arg(long)]
    weather_id: Option<u32>,

    #[arg(long)]
    lux_id: Option<u32>,

    /// Read data files from this directory instead of the preset's
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Write one CSV per panel into this directory
    #[arg(long)]
    csv_dir: Option<PathBuf>,

    /// Write every panel to this JSON file
    #[arg(long)]
    json: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CalibrateArgs {
    /// Directory holding Calibration_TREWid<N>_<site>.csv files
    #[arg(short, long)]
    dir: PathBuf,

    #[arg(long)]
    site: String,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let catalog = load_catalog(cli.presets.as_deref())?;

    match cli.command {
        Command::Plot(args) => plot(&catalog, args),
        Command::Calibrate(args) => calibrate(&args),
        Command::Presets => {
            sinks::print_presets(&catalog);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_catalog(flag: Option<&Path>) -> Result<PresetCatalog> {
    let path = flag
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(PRESETS_ENV).map(PathBuf::from));
    match path {
        Some(path) => {
            info!(path = %path.display(), "loading presets");
            PresetCatalog::load(&path)
                .with_context(|| format!("failed to load presets from {}", path.display()))
        }
        None => Ok(PresetCatalog::builtin().clone()),
    }
}

fn plot(catalog: &PresetCatalog, args: PlotArgs) -> Result<()> {
    if args.end < args.start {
        bail!("--end ({}) is before --start ({})", args.end, args.start);
    }

    let mut preset = catalog.get(&args.preset)?.clone();
    if let Some(dir) = args.data_dir {
        preset.override_data_dir(dir);
    }

    let start = args.start.and_time(NaiveTime::MIN);
    let end = args
        .end
        .and_hms_opt(23, 59, 59)
        .context("end of day is not representable")?;

    let mut request = ReportRequest::new(start, end);
    for (kind, id) in [
        (SensorKind::SapMoisture, args.sap_id),
        (SensorKind::Weather, args.weather_id),
        (SensorKind::Lux, args.lux_id),
    ] {
        if let Some(id) = id {
            request = request.with_sensor_id(kind, id);
        }
    }

    let report = run_preset(&preset, &request)
        .with_context(|| format!("failed to start report for preset '{}'", preset.name))?;

    sinks::print_summary(&report);
    if let Some(dir) = &args.csv_dir {
        let written = sinks::write_csv(&report.panels, dir)?;
        info!(dir = %dir.display(), files = written, "wrote panel CSV files");
    }
    if let Some(path) = &args.json {
        sinks::write_json(&preset.name, &report, path)?;
        info!(path = %path.display(), "wrote JSON export");
    }

    if report.panels.is_empty() {
        bail!("no panels could be produced for preset '{}'", preset.name);
    }
    Ok(())
}

fn calibrate(args: &CalibrateArgs) -> Result<()> {
    let files = discover_calibration_files(&args.dir, &args.site)
        .with_context(|| format!("failed to search {}", args.dir.display()))?;
    if files.is_empty() {
        bail!(
            "no Calibration_TREWid<N>_{}.csv files in {}",
            args.site,
            args.dir.display()
        );
    }

    let mut results = Vec::new();
    for (id, path) in files {
        match calibration_from_file(&path) {
            Ok(calibration) => results.push((id, calibration)),
            Err(err) => warn!(id, path = %path.display(), error = %err, "skipping calibration file"),
        }
    }
    sinks::print_calibrations(&args.site, &results);
    Ok(())
}
