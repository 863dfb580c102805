use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use motion_mask::capture::{FrameSource, ImageSequence};
use motion_mask::config::{Config, DEFAULT_FRAME_DIFFERENCE_THRESHOLD};
use motion_mask::evaluation::{load_mask_set, EvaluationReport, Evaluator, MaskSet};
use motion_mask::output::{MaskSink, PngDirectorySink};
use motion_mask::segmentation::{self, SegmentationPipeline};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// JSON configuration file; command flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Segment moving objects in a directory of numbered frames
    Segment(SegmentArgs),
    /// Score predicted masks against ground truth masks
    Evaluate(EvaluateArgs),
    /// Write difference masks between ground truth and predicted masks
    Compare(CompareArgs),
}

#[derive(Args, Debug)]
struct SegmentArgs {
    /// Directory of input frames (frame number in each file name)
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory for masks, tracked overlays and boxes.json
    #[arg(short, long)]
    output: PathBuf,

    /// Background adaptation window in frames
    #[arg(long)]
    history: Option<u32>,

    /// Squared-distance threshold (in variances) for the background decision
    #[arg(long)]
    var_threshold: Option<f32>,

    /// Disable shadow detection
    #[arg(long)]
    no_shadows: bool,

    /// Fuse frame-to-frame differences into the foreground
    #[arg(long)]
    frame_difference: bool,

    /// Intensity change counted as motion when fusing frame differences
    #[arg(long)]
    frame_difference_threshold: Option<u8>,

    /// Smallest connected component kept in a clean mask (pixels)
    #[arg(long)]
    min_component_area: Option<u32>,

    /// Smallest bounding box reported (pixels)
    #[arg(long)]
    min_box_area: Option<u32>,

    /// Evaluate the clean masks against this ground truth directory
    #[arg(long)]
    ground_truth: Option<PathBuf>,

    /// Write the evaluation report here (JSON)
    #[arg(long)]
    report: Option<PathBuf>,
}

impl SegmentArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(history) = self.history {
            config.background.history = history;
        }
        if let Some(var_threshold) = self.var_threshold {
            config.background.var_threshold = var_threshold;
        }
        if self.no_shadows {
            config.background.detect_shadows = false;
        }
        if self.frame_difference || self.frame_difference_threshold.is_some() {
            config.background.frame_difference_threshold = Some(
                self.frame_difference_threshold
                    .unwrap_or(DEFAULT_FRAME_DIFFERENCE_THRESHOLD),
            );
        }
        if let Some(area) = self.min_component_area {
            config.refine.min_component_area = area;
        }
        if let Some(area) = self.min_box_area {
            config.localize.min_box_area = area;
        }
    }
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    /// Directory of ground truth masks
    #[arg(short, long)]
    ground_truth: PathBuf,

    /// Directory of predicted masks
    #[arg(short, long)]
    predictions: PathBuf,

    /// Write the evaluation report here (JSON)
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CompareArgs {
    /// Directory of ground truth masks
    #[arg(short, long)]
    ground_truth: PathBuf,

    /// Directory of predicted masks
    #[arg(short, long)]
    predictions: PathBuf,

    /// Output directory for diff_<frame>.png files
    #[arg(short, long)]
    output: PathBuf,
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    match &args.command {
        Command::Segment(cmd) => {
            cmd.apply(&mut config);
            config.validate().context("Invalid configuration")?;
            segment(cmd, &config)
        }
        Command::Evaluate(cmd) => evaluate(cmd, &config),
        Command::Compare(cmd) => compare(cmd, &config),
    }
}

fn segment(cmd: &SegmentArgs, config: &Config) -> Result<()> {
    tracing::info!("Segmenting frames from {}", cmd.input.display());
    tracing::info!(
        "History: {}, var threshold: {}, shadows: {}, frame difference: {:?}",
        config.background.history,
        config.background.var_threshold,
        config.background.detect_shadows,
        config.background.frame_difference_threshold
    );

    let mut source = ImageSequence::open(&cmd.input).context("Failed to open input frames")?;
    let mut sink =
        PngDirectorySink::new(&cmd.output).context("Failed to prepare output directory")?;
    let mut pipeline = segmentation::create_default_pipeline(config)
        .context("Failed to build segmentation pipeline")?;

    let keep_masks = cmd.ground_truth.is_some();
    let predictions = run_pipeline(&mut source, &mut sink, &mut pipeline, keep_masks)?;

    if !source.skipped().is_empty() {
        tracing::warn!(
            "{} frames could not be decoded and were skipped",
            source.skipped().len()
        );
    }

    if let Some(ground_truth_dir) = &cmd.ground_truth {
        let ground_truth = load_mask_set(ground_truth_dir).context("Failed to load ground truth")?;
        let report = Evaluator::new(config.evaluation.clone())
            .evaluate(&ground_truth.masks, &predictions)
            .context("Evaluation failed")?
            .with_failures(ground_truth.failures)
            .with_failures(source.skipped().iter().cloned());
        finish_report(&report, cmd.report.as_deref())?;
    }

    Ok(())
}

fn run_pipeline<S, K>(
    source: &mut S,
    sink: &mut K,
    pipeline: &mut SegmentationPipeline,
    keep_masks: bool,
) -> Result<MaskSet>
where
    S: FrameSource,
    K: MaskSink,
{
    let mut frame_count = 0u64;
    let mut object_count = 0usize;
    let mut total_segment_time = Duration::ZERO;
    let mut total_output_time = Duration::ZERO;
    let mut masks = MaskSet::new();

    tracing::info!("Starting segmentation loop");
    if let Some(remaining) = source.remaining() {
        tracing::info!("{} frames queued", remaining);
    }

    while let Some(frame) = source.next_frame().context("Failed to read frame")? {
        // Segmentation
        let segment_start = Instant::now();
        let output = pipeline
            .process(&frame)
            .with_context(|| format!("Failed to segment frame {}", frame.id))?;
        total_segment_time += segment_start.elapsed();

        // Output
        let output_start = Instant::now();
        sink.write_output(&frame, &output)
            .with_context(|| format!("Failed to write outputs for frame {}", frame.id))?;
        total_output_time += output_start.elapsed();

        frame_count += 1;
        object_count += output.boxes.len();
        if keep_masks {
            masks.insert(output.id, output.mask.into_image());
        }

        // Log stats every 30 frames
        if frame_count % 30 == 0 {
            let avg_segment_ms = total_segment_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_output_ms = total_output_time.as_secs_f64() * 1000.0 / frame_count as f64;
            tracing::info!(
                "Frame {}: segment={:.1}ms, output={:.1}ms, objects so far={}",
                frame_count,
                avg_segment_ms,
                avg_output_ms,
                object_count
            );
        }
    }

    sink.finish().context("Failed to finalize outputs")?;
    tracing::info!("Processed {} frames, {} objects localized", frame_count, object_count);
    Ok(masks)
}

fn evaluate(cmd: &EvaluateArgs, config: &Config) -> Result<()> {
    tracing::info!(
        "Evaluating {} against {}",
        cmd.predictions.display(),
        cmd.ground_truth.display()
    );
    let report = Evaluator::new(config.evaluation.clone())
        .evaluate_dirs(&cmd.ground_truth, &cmd.predictions)
        .context("Evaluation failed")?;
    finish_report(&report, cmd.report.as_deref())
}

fn finish_report(report: &EvaluationReport, path: Option<&Path>) -> Result<()> {
    let aggregate = &report.aggregate;
    tracing::info!("==== Aggregate metrics ====");
    tracing::info!("Accuracy: {:.4}", aggregate.accuracy);
    tracing::info!("Precision: {:.4}", aggregate.precision);
    tracing::info!("Recall: {:.4}", aggregate.recall);
    tracing::info!("IoU: {:.4}", aggregate.iou);
    tracing::info!(
        "Matched {} frames ({} ground truth, {} predictions)",
        aggregate.matched_frames,
        aggregate.ground_truth_frames,
        aggregate.prediction_frames
    );
    tracing::info!(
        "Unmatched: {} without prediction, {} without ground truth",
        aggregate.unmatched_ground_truth,
        aggregate.unmatched_prediction
    );
    if !report.failures.is_empty() {
        tracing::warn!("{} files were skipped while loading", report.failures.len());
    }

    if let Some(path) = path {
        let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        tracing::info!("Report written to {}", path.display());
    }
    Ok(())
}

fn compare(cmd: &CompareArgs, config: &Config) -> Result<()> {
    let ground_truth = load_mask_set(&cmd.ground_truth).context("Failed to load ground truth")?;
    let predictions = load_mask_set(&cmd.predictions).context("Failed to load predictions")?;
    if ground_truth.masks.is_empty() || predictions.masks.is_empty() {
        anyhow::bail!("Ground truth or predictions could not be loaded");
    }
    std::fs::create_dir_all(&cmd.output)
        .with_context(|| format!("Failed to create {}", cmd.output.display()))?;

    for id in ground_truth.masks.keys() {
        if !predictions.masks.contains_key(id) {
            tracing::warn!("No predicted mask for frame {}", id);
        }
    }

    let comparisons = Evaluator::new(config.evaluation.clone())
        .compare(&ground_truth.masks, &predictions.masks);
    for comparison in &comparisons {
        let path = cmd.output.join(format!("diff_{}.png", comparison.frame));
        comparison
            .difference
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!(
            "Frame {}: ground truth active={}, predicted active={}, differing={}",
            comparison.frame,
            comparison.ground_truth_active,
            comparison.prediction_active,
            comparison.differing_pixels
        );
        if comparison.identical() {
            tracing::warn!("Frame {}: prediction is identical to ground truth", comparison.frame);
        }
    }

    tracing::info!(
        "Wrote {} comparisons to {}",
        comparisons.len(),
        cmd.output.display()
    );
    Ok(())
}
