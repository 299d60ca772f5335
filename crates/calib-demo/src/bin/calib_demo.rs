use std::error::Error;
use std::path::PathBuf;

use calib_demo::core::PatternSize;
use calib_demo::display::{ConsoleDisplay, Display, PanelCompositor};
use calib_demo::pipeline::{run, LoadedImage};
use calib_demo::PipelineConfig;
use clap::Parser;
use log::LevelFilter;

#[cfg(feature = "tracing")]
use tracing_log::LogTracer;

/// Detect a chessboard in one image, calibrate from it and show the result.
#[derive(Debug, Parser)]
#[command(author, version, about = "Single-image chessboard calibration demo")]
struct Args {
    /// Input image (any format the `image` crate decodes).
    image: PathBuf,

    /// Optional JSON `PipelineConfig`. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Inner corners per row (overrides the config).
    #[arg(long)]
    cols: Option<u32>,

    /// Inner corners per column (overrides the config).
    #[arg(long)]
    rows: Option<u32>,

    /// Write the side-by-side panel composite to this PNG.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Log level: off, error, warn, info, debug, trace. With the `tracing`
    /// feature, `RUST_LOG` takes precedence when set.
    #[arg(long, default_value = "warn")]
    log_level: LevelFilter,
}

#[cfg(feature = "tracing")]
fn init_logging(level: LevelFilter) -> Result<(), Box<dyn Error>> {
    LogTracer::init()?;
    calib_demo::core::init_tracing(false, level);
    Ok(())
}

#[cfg(not(feature = "tracing"))]
fn init_logging(level: LevelFilter) -> Result<(), Box<dyn Error>> {
    calib_demo::core::init_with_level(level)?;
    Ok(())
}

fn load_config(args: &Args) -> Result<PipelineConfig, Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if args.cols.is_none() && args.rows.is_none() {
        return Ok(config);
    }
    let cols = args.cols.unwrap_or(config.pattern.cols());
    let rows = args.rows.unwrap_or(config.pattern.rows());
    Ok(config.with_pattern(PatternSize::new(cols, rows)?))
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.log_level)?;

    let config = load_config(&args)?;
    let image = LoadedImage::open(&args.image)?;

    let report = run(&image, &config);
    println!("{report}");

    let mut console = ConsoleDisplay::stdout();
    let mut compositor = match &args.output {
        Some(path) => PanelCompositor::new().with_output(path),
        None => PanelCompositor::new(),
    };
    let displays: [&mut dyn Display; 2] = [&mut console, &mut compositor];
    for display in displays {
        report.present(&image, display)?;
    }
    Ok(())
}
