//! Segmentation quality against ground truth masks.
//!
//! [`score`] compares one pair of masks; [`Evaluator::evaluate`] matches two
//! mask sets by frame id, scores every matched pair and reports the frames
//! that could not be matched instead of dropping them.

mod aggregate;
mod compare;
mod dataset;
mod metrics;

pub use aggregate::{aggregate, AggregateMetrics, MetricsAccumulator};
pub use compare::{compare, MaskComparison};
pub use dataset::{load_mask, load_mask_set, LoadFailure, LoadedMasks, MaskSet};
pub use metrics::{align_prediction, score, score_with_cut, ConfusionMatrix, FrameMetrics};

use crate::config::EvaluationConfig;
use crate::error::{SegError, SegResult};
use crate::segmentation::FrameId;
use image::GrayImage;
use rayon::prelude::*;
use serde::Serialize;
use std::path::Path;

/// A frame id present on only one side of an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "frame")]
pub enum Unmatched {
    /// A prediction exists but no ground truth
    MissingGroundTruth(FrameId),
    /// A ground truth exists but no prediction
    MissingPrediction(FrameId),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameScore {
    pub frame: FrameId,
    #[serde(flatten)]
    pub metrics: FrameMetrics,
}

/// Full result of one evaluation run
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub aggregate: AggregateMetrics,
    /// Matched frames in id order
    pub frames: Vec<FrameScore>,
    pub unmatched: Vec<Unmatched>,
    /// Files skipped while loading either mask set
    pub failures: Vec<LoadFailure>,
}

impl EvaluationReport {
    /// Append files skipped elsewhere in the run (frames, other mask sets)
    pub fn with_failures<I>(mut self, failures: I) -> Self
    where
        I: IntoIterator<Item = LoadFailure>,
    {
        self.failures.extend(failures);
        self
    }

    pub fn missing_ground_truth(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.unmatched.iter().filter_map(|u| match u {
            Unmatched::MissingGroundTruth(id) => Some(*id),
            Unmatched::MissingPrediction(_) => None,
        })
    }

    pub fn missing_prediction(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.unmatched.iter().filter_map(|u| match u {
            Unmatched::MissingPrediction(id) => Some(*id),
            Unmatched::MissingGroundTruth(_) => None,
        })
    }
}

/// Scores predicted masks against ground truth masks
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    config: EvaluationConfig,
}

impl Evaluator {
    pub fn new(config: EvaluationConfig) -> Self {
        Self { config }
    }

    pub fn score(
        &self,
        ground_truth: &GrayImage,
        prediction: &GrayImage,
    ) -> SegResult<FrameMetrics> {
        score_with_cut(ground_truth, prediction, self.config.binarization_cut)
    }

    /// Match two mask sets by frame id and score every matched pair
    ///
    /// Frames present on one side only are listed in the report and counted
    /// in the aggregate, but do not enter the means.
    pub fn evaluate(
        &self,
        ground_truth: &MaskSet,
        predictions: &MaskSet,
    ) -> SegResult<EvaluationReport> {
        if ground_truth.is_empty() {
            return Err(SegError::empty_input("no ground truth masks"));
        }
        if predictions.is_empty() {
            return Err(SegError::empty_input("no predicted masks"));
        }

        let (matched, unmatched) = match_frames(ground_truth, predictions);
        for entry in &unmatched {
            match entry {
                Unmatched::MissingPrediction(id) => {
                    tracing::warn!("No predicted mask for ground truth frame {}", id)
                }
                Unmatched::MissingGroundTruth(id) => {
                    tracing::warn!("No ground truth for predicted frame {}", id)
                }
            }
        }

        let frames = matched
            .par_iter()
            .map(|&(frame, gt, pred)| {
                self.score(gt, pred).map(|metrics| FrameScore { frame, metrics })
            })
            .collect::<SegResult<Vec<_>>>()?;

        let mut accumulator = MetricsAccumulator::new();
        for score in &frames {
            tracing::info!(
                "{}: Acc={:.4}, Precision={:.4}, Recall={:.4}, IoU={:.4}",
                score.frame,
                score.metrics.accuracy,
                score.metrics.precision,
                score.metrics.recall,
                score.metrics.iou
            );
            accumulator.push(&score.metrics);
        }
        if frames.is_empty() {
            tracing::warn!("No frame is present in both ground truth and predictions");
        }

        let unmatched_ground_truth = unmatched
            .iter()
            .filter(|u| matches!(u, Unmatched::MissingPrediction(_)))
            .count();
        let aggregate = AggregateMetrics {
            ground_truth_frames: ground_truth.len(),
            prediction_frames: predictions.len(),
            unmatched_ground_truth,
            unmatched_prediction: unmatched.len() - unmatched_ground_truth,
            ..accumulator.finish()
        };

        Ok(EvaluationReport {
            aggregate,
            frames,
            unmatched,
            failures: Vec::new(),
        })
    }

    /// Load both directories and evaluate them
    ///
    /// Undecodable files are skipped and listed in the report.
    pub fn evaluate_dirs<P, Q>(
        &self,
        ground_truth_dir: P,
        predictions_dir: Q,
    ) -> SegResult<EvaluationReport>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let ground_truth = load_mask_set(ground_truth_dir)?;
        let predictions = load_mask_set(predictions_dir)?;
        Ok(self
            .evaluate(&ground_truth.masks, &predictions.masks)?
            .with_failures(ground_truth.failures)
            .with_failures(predictions.failures))
    }

    /// Difference masks for every matched frame, in id order
    pub fn compare(&self, ground_truth: &MaskSet, predictions: &MaskSet) -> Vec<MaskComparison> {
        let (matched, _) = match_frames(ground_truth, predictions);
        matched
            .par_iter()
            .map(|&(frame, gt, pred)| compare(frame, gt, pred, self.config.binarization_cut))
            .collect()
    }
}

type MatchedPair<'a> = (FrameId, &'a GrayImage, &'a GrayImage);

fn match_frames<'a>(
    ground_truth: &'a MaskSet,
    predictions: &'a MaskSet,
) -> (Vec<MatchedPair<'a>>, Vec<Unmatched>) {
    let mut matched = Vec::new();
    let mut unmatched = Vec::new();
    for (&id, gt) in ground_truth {
        match predictions.get(&id) {
            Some(pred) => matched.push((id, gt, pred)),
            None => unmatched.push(Unmatched::MissingPrediction(id)),
        }
    }
    unmatched.extend(
        predictions
            .keys()
            .filter(|id| !ground_truth.contains_key(id))
            .map(|&id| Unmatched::MissingGroundTruth(id)),
    );
    (matched, unmatched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use std::path::PathBuf;

    fn square(offset: u32) -> GrayImage {
        GrayImage::from_fn(20, 20, |x, y| {
            let inside = (offset..offset + 8).contains(&x) && (offset..offset + 8).contains(&y);
            Luma([if inside { 255 } else { 0 }])
        })
    }

    fn set(entries: &[(u64, u32)]) -> MaskSet {
        entries.iter().map(|&(id, off)| (FrameId(id), square(off))).collect()
    }

    #[test]
    fn test_matched_count_is_key_intersection() {
        let gt = set(&[(1, 2), (2, 2), (3, 2), (5, 2)]);
        let pred = set(&[(2, 2), (3, 2), (4, 2), (5, 2), (6, 2)]);
        let report = Evaluator::default().evaluate(&gt, &pred).unwrap();

        assert_eq!(report.aggregate.matched_frames, 3);
        assert_eq!(report.aggregate.ground_truth_frames, 4);
        assert_eq!(report.aggregate.prediction_frames, 5);
        assert_eq!(report.aggregate.unmatched_ground_truth, 1);
        assert_eq!(report.aggregate.unmatched_prediction, 2);
        assert_eq!(report.missing_prediction().collect::<Vec<_>>(), vec![FrameId(1)]);
        assert_eq!(
            report.missing_ground_truth().collect::<Vec<_>>(),
            vec![FrameId(4), FrameId(6)]
        );
        assert_eq!(
            report.frames.iter().map(|f| f.frame).collect::<Vec<_>>(),
            vec![FrameId(2), FrameId(3), FrameId(5)]
        );
        assert_eq!(report.aggregate.iou, 1.0);
    }

    #[test]
    fn test_aggregate_is_mean_of_frames() {
        let gt = set(&[(1, 2), (2, 2)]);
        // Frame 2 shifted by 4 px: overlap 4x4 of union 112
        let pred = set(&[(1, 2), (2, 6)]);
        let report = Evaluator::default().evaluate(&gt, &pred).unwrap();
        let expected_iou = (1.0 + 16.0 / 112.0) / 2.0;
        assert!((report.aggregate.iou - expected_iou).abs() < 1e-12);
        assert_eq!(report.frames[0].metrics.iou, 1.0);
    }

    #[test]
    fn test_empty_inputs_are_rejected() {
        let some = set(&[(1, 2)]);
        let none = MaskSet::new();
        let evaluator = Evaluator::default();
        assert!(matches!(evaluator.evaluate(&none, &some), Err(SegError::EmptyInput(_))));
        assert!(matches!(evaluator.evaluate(&some, &none), Err(SegError::EmptyInput(_))));
    }

    #[test]
    fn test_disjoint_sets_report_everything_unmatched() {
        let report = Evaluator::default()
            .evaluate(&set(&[(1, 2)]), &set(&[(2, 2)]))
            .unwrap();
        assert_eq!(report.aggregate.matched_frames, 0);
        assert_eq!(report.unmatched.len(), 2);
        assert!(report.frames.is_empty());
    }

    #[test]
    fn test_evaluate_dirs_lists_failures() {
        let gt_dir = tempfile::tempdir().unwrap();
        let pred_dir = tempfile::tempdir().unwrap();
        square(2).save(gt_dir.path().join("0001.png")).unwrap();
        square(2).save(gt_dir.path().join("0002.png")).unwrap();
        square(2).save(pred_dir.path().join("mask_0001.png")).unwrap();
        std::fs::write(pred_dir.path().join("mask_0002.png"), b"broken").unwrap();

        let report = Evaluator::default()
            .evaluate_dirs(gt_dir.path(), pred_dir.path())
            .unwrap();
        assert_eq!(report.aggregate.matched_frames, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.missing_prediction().collect::<Vec<_>>(), vec![FrameId(2)]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["aggregate"]["matched_frames"], 1);
        assert_eq!(json["unmatched"][0]["kind"], "MissingPrediction");
        assert_eq!(json["frames"][0]["frame"], 1);
    }

    #[test]
    fn test_report_collects_skipped_frames() {
        let skipped = LoadFailure {
            path: PathBuf::from("frame_0009.png"),
            reason: "truncated".to_string(),
        };
        let report = Evaluator::default()
            .evaluate(&set(&[(1, 2)]), &set(&[(1, 2)]))
            .unwrap()
            .with_failures([skipped.clone()]);
        assert_eq!(report.failures, vec![skipped]);
        assert_eq!(report.aggregate.matched_frames, 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["failures"][0]["reason"], "truncated");
    }

    #[test]
    fn test_compare_matched_frames() {
        let comparisons = Evaluator::default().compare(&set(&[(1, 2), (2, 2)]), &set(&[(2, 3)]));
        assert_eq!(comparisons.len(), 1);
        assert_eq!(comparisons[0].frame, FrameId(2));
        assert!(!comparisons[0].identical());
    }
}
