use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;

use nn_detect_core::detection::domain::detector_config::{DetectorConfig, LabelTable};
use nn_detect_core::detection::domain::result_aggregator::{sort_results, ResultOrder};
use nn_detect_core::detection::infrastructure::image_debug_renderer::ImageDebugRenderer;
use nn_detect_core::detection::infrastructure::neural_network_detector::NeuralNetworkDetector;
use nn_detect_core::detection::infrastructure::ort_session::OrtSession;
use nn_detect_core::shared::constants::IMAGE_EXTENSIONS;
use nn_detect_core::shared::frame::Frame;
use nn_detect_core::shared::rect::Rect;

/// Run a detection model over regions of a screenshot and print the results as JSON.
#[derive(Parser)]
#[command(name = "nn-detect")]
struct Cli {
    /// Screenshot to analyze.
    image: PathBuf,

    /// ONNX detection model.
    #[arg(long)]
    model: PathBuf,

    /// Detector config (JSON). Flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Region of interest as x,y,width,height (repeatable).
    #[arg(long = "roi", value_parser = parse_rect)]
    rois: Vec<Rect>,

    /// Only keep these class indices (comma-separated).
    #[arg(long, value_delimiter = ',')]
    expected: Option<Vec<usize>>,

    /// Minimum detection score (0.0-1.0).
    #[arg(long)]
    threshold: Option<f64>,

    /// Class labels in index order (comma-separated).
    #[arg(long, value_delimiter = ',')]
    labels: Option<Vec<String>>,

    /// Model input size as WIDTHxHEIGHT.
    #[arg(long, value_parser = parse_size)]
    input_size: Option<[u32; 2]>,

    /// Output order: declaration, horizontal, vertical, score, area.
    #[arg(long, default_value = "declaration")]
    order_by: ResultOrder,

    /// Write per-ROI debug images to this directory.
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Also print detections removed by the class filter.
    #[arg(long)]
    all: bool,

    /// Pretty-print JSON.
    #[arg(long)]
    pretty: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let config = build_config(&cli)?;
    let frame = load_frame(&cli.image)?;

    log::info!("Loading model: {}", cli.model.display());
    let session = Arc::new(OrtSession::from_file(&cli.model)?);

    let mut detector = NeuralNetworkDetector::new(config);
    detector.set_session(session);
    if let Some(dir) = &cli.debug_dir {
        detector.set_debug_renderer(Box::new(ImageDebugRenderer::new(dir)?));
    }

    let mut report = detector.analyze_report(&frame)?;
    sort_results(&mut report.filtered, cli.order_by);
    sort_results(&mut report.all, cli.order_by);

    let json = if cli.all {
        serde_json::to_value(&report)?
    } else {
        serde_json::to_value(&report.filtered)?
    };
    let text = if cli.pretty {
        serde_json::to_string_pretty(&json)?
    } else {
        serde_json::to_string(&json)?
    };
    println!("{text}");

    if let Some(best) = report.best() {
        log::info!("Best: {best}");
    }
    Ok(())
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.image.exists() {
        return Err(format!("Image not found: {}", cli.image.display()).into());
    }
    if !is_image(&cli.image) {
        return Err(format!(
            "Unsupported image type: {} (expected one of {})",
            cli.image.display(),
            IMAGE_EXTENSIONS.join(", ")
        )
        .into());
    }
    if !cli.model.exists() {
        return Err(format!("Model not found: {}", cli.model.display()).into());
    }
    Ok(())
}

/// Config file (or defaults) with command-line overrides applied.
fn build_config(cli: &Cli) -> Result<DetectorConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => DetectorConfig::from_json_file(path)?,
        None => DetectorConfig::default(),
    };
    if !cli.rois.is_empty() {
        config.regions_of_interest = cli.rois.clone();
    }
    if let Some(expected) = &cli.expected {
        config.expected_classes = expected.iter().copied().collect::<BTreeSet<_>>();
    }
    if let Some(threshold) = cli.threshold {
        config.score_threshold = threshold;
    }
    if let Some(labels) = &cli.labels {
        config.label_table = LabelTable::new(labels.iter().map(|l| l.trim().to_string()));
    }
    if let Some(size) = cli.input_size {
        config.input_size = Some(size);
    }
    config.validate()?;
    Ok(config)
}

fn load_frame(path: &Path) -> Result<Frame, Box<dyn std::error::Error>> {
    let img = image::open(path)?.to_rgb8();
    let (width, height) = img.dimensions();
    Ok(Frame::new(img.into_raw(), width, height, 3))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn parse_rect(s: &str) -> Result<Rect, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid ROI '{s}': {e}"))?;
    match parts.as_slice() {
        [x, y, w, h] => Ok(Rect::new(*x, *y, *w, *h)),
        _ => Err(format!("ROI must be x,y,width,height, got '{s}'")),
    }
}

fn parse_size(s: &str) -> Result<[u32; 2], String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("size must be WIDTHxHEIGHT, got '{s}'"))?;
    let w = w.trim().parse::<u32>().map_err(|e| format!("invalid width '{w}': {e}"))?;
    let h = h.trim().parse::<u32>().map_err(|e| format!("invalid height '{h}': {e}"))?;
    Ok([w, h])
}
