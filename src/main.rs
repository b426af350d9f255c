use std::path::{Path, PathBuf};
use std::time::Instant;
use anyhow::{bail, Context};
use clap::Parser;
use log::{error, info};
use rayon::prelude::*;

use leaf_herbivory_rust_lib::drawing::DrawingLayer;
use leaf_herbivory_rust_lib::image_io::{get_image_files_in_dir, load_image, save_image};
use leaf_herbivory_rust_lib::labeling::Point;
use leaf_herbivory_rust_lib::output::{write_json_report, write_results_csv, ResultRecord};
use leaf_herbivory_rust_lib::pipeline::{measure_prepared, prepare_image, MeasurementRequest};
use leaf_herbivory_rust_lib::regions::RegionSelection;
use leaf_herbivory_rust_lib::Config;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Leaf area and herbivory measurement")]
struct Args {
    /// Path to input file or directory
    #[clap(short, long)]
    input: Option<String>,

    /// Path to output directory
    #[clap(short, long)]
    output: Option<String>,

    /// Path to configuration file (defaults to config.toml if present)
    #[clap(short, long)]
    config: Option<String>,

    /// Manual threshold in [0, 1] instead of Otsu
    #[clap(short, long)]
    threshold: Option<f32>,

    /// The leaf was photographed on a dark background
    #[clap(long)]
    black_background: bool,

    /// Physical side length of the printed scale square
    #[clap(long)]
    scale_length: Option<f64>,

    /// Unit of the scale length, e.g. cm
    #[clap(long)]
    unit: Option<String>,

    /// Skip scale-mark detection and report pixels only
    #[clap(long)]
    no_scale: bool,

    /// PNG with user-drawn edges, transparent elsewhere
    #[clap(long)]
    drawing: Option<PathBuf>,

    /// Point on the leaf to measure, as x,y in the prepared image
    #[clap(long, value_parser = parse_point)]
    leaf_point: Option<Point>,

    /// Point inside a hole that should not count as consumed (repeatable)
    #[clap(long, value_parser = parse_point)]
    exclude: Vec<Point>,

    /// Also write a JSON report per image
    #[clap(long)]
    json: bool,

    /// Log per-stage details
    #[clap(short, long)]
    debug: bool,
}

fn parse_point(value: &str) -> Result<Point, String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got '{}'", value))?;
    let x = x.trim().parse().map_err(|e| format!("bad x in '{}': {}", value, e))?;
    let y = y.trim().parse().map_err(|e| format!("bad y in '{}': {}", value, e))?;
    Ok(Point::new(x, y))
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).is_file() => Config::from_file(DEFAULT_CONFIG_PATH)?,
        None => Config::default(),
    };

    // Command-line arguments override the file
    if let Some(input) = &args.input {
        config.input_path = input.clone();
    }
    if let Some(output) = &args.output {
        config.output_base_dir = output.clone();
    }
    if args.threshold.is_some() {
        config.threshold = args.threshold;
    }
    if args.black_background {
        config.use_black_background = true;
    }
    if let Some(length) = args.scale_length {
        config.scale_mark_length = length;
    }
    if let Some(unit) = &args.unit {
        config.unit = unit.clone();
    }
    if args.no_scale {
        config.detect_scale = false;
    }

    config.validate()?;
    Ok(config)
}

/// Measure one photo and write its visualization and optional JSON report
fn process_file(path: &Path, config: &Config, args: &Args, output_base: &Path) -> anyhow::Result<ResultRecord> {
    let input = load_image(path).with_context(|| format!("Failed to load {}", path.display()))?;
    let prepared = prepare_image(&input.image, config, None)
        .with_context(|| format!("Failed to prepare {}", path.display()))?;

    let drawing = match &args.drawing {
        Some(drawing_path) => {
            let loaded = load_image(drawing_path)
                .with_context(|| format!("Failed to load drawing {}", drawing_path.display()))?;
            let mut layer = DrawingLayer::from_image(loaded.image, config.drawing_color_rgb);
            let (width, height) = prepared.image.dimensions();
            if layer.image().dimensions() != (width, height) {
                layer = layer.resized(width, height)?;
            }
            Some(layer.image().clone())
        }
        None => None,
    };

    let request = MeasurementRequest {
        drawing,
        selection: RegionSelection {
            leaf_point: args.leaf_point,
            excluded_points: args.exclude.clone(),
        },
    };

    let report = measure_prepared(&prepared, config, &request)
        .with_context(|| format!("Failed to measure {}", path.display()))?;

    if let Some(visualization) = &report.visualization {
        let visualization_path = output_base
            .join("visualizations")
            .join(format!("{}.png", input.filename));
        save_image(visualization, &visualization_path)
            .with_context(|| format!("Failed to save {}", visualization_path.display()))?;
    }

    if args.json {
        write_json_report(&report, &input.filename, output_base)?;
    }

    Ok(ResultRecord::from_report(&input.filename, &report))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let config = load_config(&args)?;
    let output_base = config.ensure_output_dirs()?;

    let start_time = Instant::now();
    let input_path = PathBuf::from(&config.input_path);

    let records: Vec<ResultRecord> = if input_path.is_file() {
        info!("Processing single file: {}", input_path.display());
        vec![process_file(&input_path, &config, &args, &output_base)?]
    } else if input_path.is_dir() {
        info!("Processing directory: {}", input_path.display());
        let image_files = get_image_files_in_dir(&input_path)?;
        info!("Found {} image files", image_files.len());

        let process = |path: &PathBuf| {
            info!("Processing: {}", path.display());
            match process_file(path, &config, &args, &output_base) {
                Ok(record) => Some(record),
                Err(e) => {
                    error!("Skipping {}: {:#}", path.display(), e);
                    None
                }
            }
        };

        if config.use_parallel {
            image_files.par_iter().filter_map(process).collect()
        } else {
            image_files.iter().filter_map(process).collect()
        }
    } else {
        bail!("Input path {} does not exist", input_path.display());
    };

    let results_path = write_results_csv(&records, &output_base)?;
    info!("Wrote {} results to {}", records.len(), results_path.display());

    let elapsed = start_time.elapsed();
    info!("Processing completed in {:.2} seconds", elapsed.as_secs_f64());

    Ok(())
}
