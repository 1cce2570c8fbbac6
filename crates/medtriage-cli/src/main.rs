use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use medtriage_lib::{
    config::{read_config, TriageConfig},
    detectors::HeartbeatExtractor,
    error::ModelError,
    explain::ActivationExplainer,
    io::{image as image_io, text as text_io},
    model::{ConvHeadScorer, DenseSignalScorer, Scorer, TracedScorer},
    plot::{render_ecg_grid, EcgPlotOptions},
    signal::RawSignal,
    triage::{
        analyze_brain, load_upload, BoxDetector, ContrastStretch, Detection, EcgPipeline,
        ImageKind, ImagePipeline,
    },
};
use serde::Serialize;
use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "medtriage",
    version,
    about = "Medical triage tools: heartbeat extraction, classification and Grad-CAM"
)]
struct Cli {
    /// TOML file overriding the built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum KindArg {
    Bone,
    Skin,
}

impl From<KindArg> for ImageKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Bone => ImageKind::Bone,
            KindArg::Skin => ImageKind::Skin,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Extract one heartbeat window from a recording (--input or stdin)
    EcgExtract {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        target_len: Option<usize>,
    },
    /// Render a recording as a paper-style ECG PNG
    EcgPlot {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 1)]
        rows: usize,
        #[arg(long)]
        no_grid: bool,
        #[arg(long)]
        details: bool,
    },
    /// Classify the dominant heartbeat of a recording
    EcgClassify {
        #[arg(long)]
        input: Option<PathBuf>,
        /// JSON weights of a dense heartbeat scorer
        #[arg(long)]
        model: PathBuf,
        #[arg(long, default_value_t = 1)]
        rows: usize,
    },
    /// Classify a bone X-ray or skin photo and explain the decision
    ImageClassify {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, value_enum)]
        kind: KindArg,
        /// JSON weights of a convolutional scorer
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        overlay_out: Option<PathBuf>,
    },
    /// Write a Grad-CAM overlay for an image
    Gradcam {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Class to explain instead of the top-scoring one
        #[arg(long)]
        class: Option<usize>,
    },
    /// Outline and measure tumors from precomputed detector boxes
    Brain {
        #[arg(long)]
        input: PathBuf,
        /// JSON array of `{label, confidence, bbox: [x1, y1, x2, y2]}`
        #[arg(long)]
        detections: PathBuf,
        #[arg(long)]
        annotated_out: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct GradcamSummary {
    class_index: Option<usize>,
    heatmap_applied: bool,
    width: u32,
    height: u32,
}

/// Detector stand-in that replays boxes produced elsewhere.
struct RecordedDetections(Vec<Detection>);

impl BoxDetector for RecordedDetections {
    fn detect(&self, _image: &image::RgbImage) -> Result<Vec<Detection>, ModelError> {
        Ok(self.0.clone())
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let cfg = match cli.config.as_deref() {
        Some(path) => read_config(path)?,
        None => TriageConfig::default(),
    };
    match cli.command {
        Commands::EcgExtract { input, target_len } => {
            cmd_ecg_extract(&cfg, input.as_deref(), target_len)?
        }
        Commands::EcgPlot {
            input,
            out,
            rows,
            no_grid,
            details,
        } => cmd_ecg_plot(&cfg, input.as_deref(), &out, rows, !no_grid, details)?,
        Commands::EcgClassify { input, model, rows } => {
            cmd_ecg_classify(&cfg, input.as_deref(), &model, rows)?
        }
        Commands::ImageClassify {
            input,
            kind,
            model,
            overlay_out,
        } => cmd_image_classify(&cfg, &input, kind.into(), &model, overlay_out.as_deref())?,
        Commands::Gradcam {
            input,
            model,
            out,
            class,
        } => cmd_gradcam(&cfg, &input, &model, &out, class)?,
        Commands::Brain {
            input,
            detections,
            annotated_out,
        } => cmd_brain(&cfg, &input, &detections, annotated_out.as_deref())?,
    }
    Ok(())
}

fn read_bytes(input: Option<&Path>) -> Result<Vec<u8>> {
    match input {
        Some(path) => fs::read(path).with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

fn read_recording(input: Option<&Path>) -> Result<RawSignal> {
    match input {
        Some(path) => text_io::read_signal(path),
        None => Ok(text_io::parse_signal_bytes(&read_bytes(None)?)?),
    }
}

fn source_name(input: Option<&Path>) -> String {
    input
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stdin".into())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn load_traced_scorer(path: &Path) -> Result<ConvHeadScorer> {
    ConvHeadScorer::load(path).map_err(|e| anyhow!("loading image model: {}", e))
}

fn load_image(cfg: &TriageConfig, path: &Path) -> Result<image::RgbImage> {
    let bytes = read_bytes(Some(path))?;
    let name = source_name(Some(path));
    Ok(load_upload(&name, &bytes, None, None, &cfg.archive)?.image)
}

fn cmd_ecg_extract(
    cfg: &TriageConfig,
    input: Option<&Path>,
    target_len: Option<usize>,
) -> Result<()> {
    let signal = read_recording(input)?;
    let mut extractor_cfg = cfg.extractor;
    if let Some(len) = target_len {
        extractor_cfg.target_len = len;
    }
    let window = HeartbeatExtractor::new(extractor_cfg).extract(&signal);
    print_json(&window)
}

fn cmd_ecg_plot(
    cfg: &TriageConfig,
    input: Option<&Path>,
    out: &Path,
    rows: usize,
    show_grid: bool,
    show_details: bool,
) -> Result<()> {
    let signal = read_recording(input)?;
    let opts = EcgPlotOptions {
        rows,
        show_grid,
        show_details,
        source_name: source_name(input),
        width: cfg.plot.width,
        row_height: cfg.plot.height,
        ..EcgPlotOptions::default()
    };
    let png = render_ecg_grid(&signal, &opts)?;
    fs::write(out, png).with_context(|| format!("failed to write {}", out.display()))?;
    info!("wrote ECG plot to {}", out.display());
    Ok(())
}

fn cmd_ecg_classify(
    cfg: &TriageConfig,
    input: Option<&Path>,
    model: &Path,
    rows: usize,
) -> Result<()> {
    let scorer = match DenseSignalScorer::load(model) {
        Ok(scorer) => Some(scorer),
        Err(ModelError::Missing(path)) => {
            warn!("no ECG model at {}", path);
            None
        }
        Err(e) => bail!("loading ECG model: {}", e),
    };
    let mut pipeline = EcgPipeline::from_config(cfg);
    pipeline.plot_options_mut().rows = rows;
    let bytes = read_bytes(input)?;
    let report = pipeline.analyze(
        &bytes,
        &source_name(input),
        scorer.as_ref().map(|s| s as &dyn Scorer),
    )?;
    print_json(&report)
}

fn cmd_image_classify(
    cfg: &TriageConfig,
    input: &Path,
    kind: ImageKind,
    model: &Path,
    overlay_out: Option<&Path>,
) -> Result<()> {
    let image = load_image(cfg, input)?;
    let scorer = load_traced_scorer(model)?;
    let analysis = ImagePipeline::from_config(cfg).analyze(
        kind,
        &image,
        Some(&scorer),
        Some(&ContrastStretch),
    )?;
    if let Some(path) = overlay_out {
        analysis
            .overlay
            .image
            .save(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    print_json(&analysis.report)
}

fn cmd_gradcam(
    cfg: &TriageConfig,
    input: &Path,
    model: &Path,
    out: &Path,
    class: Option<usize>,
) -> Result<()> {
    let image = load_image(cfg, input)?;
    let scorer = load_traced_scorer(model)?;
    if let Some(idx) = class {
        if idx >= scorer.num_classes() {
            bail!(
                "class {} out of range, model has {} classes",
                idx,
                scorer.num_classes()
            );
        }
    }
    let tensor = image_io::to_input_tensor(&image, cfg.image.input_size);
    let explainer = ActivationExplainer::new(cfg.explainer);
    let overlay = explainer.explain_class(&tensor, &scorer as &dyn TracedScorer, &image, class);
    overlay
        .image
        .save(out)
        .with_context(|| format!("failed to write {}", out.display()))?;
    print_json(&GradcamSummary {
        class_index: overlay.class_index,
        heatmap_applied: overlay.heatmap_applied,
        width: overlay.image.width(),
        height: overlay.image.height(),
    })
}

fn cmd_brain(
    cfg: &TriageConfig,
    input: &Path,
    detections: &Path,
    annotated_out: Option<&Path>,
) -> Result<()> {
    let image = load_image(cfg, input)?;
    let boxes: Vec<Detection> = serde_json::from_str(
        &fs::read_to_string(detections)
            .with_context(|| format!("failed to read {}", detections.display()))?,
    )
    .with_context(|| format!("parsing detections {}", detections.display()))?;
    let detector = RecordedDetections(boxes);
    let analysis = analyze_brain(&image, Some(&detector), Some(&ContrastStretch))?;
    if let Some(path) = annotated_out {
        analysis
            .annotated
            .save(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    print_json(&analysis.report)
}
