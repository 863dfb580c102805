use super::metrics::FrameMetrics;
use serde::{Deserialize, Serialize};

/// Mean metrics over a run, with the bookkeeping needed to tell how many
/// frames actually contributed
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub iou: f64,
    /// Frames present in both collections; the means cover exactly these
    pub matched_frames: usize,
    pub ground_truth_frames: usize,
    pub prediction_frames: usize,
    /// Ground truth frames with no prediction
    pub unmatched_ground_truth: usize,
    /// Predictions with no ground truth
    pub unmatched_prediction: usize,
}

/// Streaming mean of frame metrics
///
/// Uses Welford's incremental update, which stays accurate over long
/// sequences and returns a repeated value exactly.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsAccumulator {
    count: usize,
    mean: FrameMetrics,
}

impl MetricsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, metrics: &FrameMetrics) {
        self.count += 1;
        let n = self.count as f64;
        self.mean.accuracy += (metrics.accuracy - self.mean.accuracy) / n;
        self.mean.precision += (metrics.precision - self.mean.precision) / n;
        self.mean.recall += (metrics.recall - self.mean.recall) / n;
        self.mean.iou += (metrics.iou - self.mean.iou) / n;
    }

    /// Fold another accumulator in, as if its frames had been pushed here
    pub fn merge(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        let total = self.count + other.count;
        let weight = other.count as f64 / total as f64;
        self.mean.accuracy += (other.mean.accuracy - self.mean.accuracy) * weight;
        self.mean.precision += (other.mean.precision - self.mean.precision) * weight;
        self.mean.recall += (other.mean.recall - self.mean.recall) * weight;
        self.mean.iou += (other.mean.iou - self.mean.iou) * weight;
        self.count = total;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Current means; all zero before the first frame
    pub fn mean(&self) -> FrameMetrics {
        self.mean
    }

    /// Means of the pushed frames, each of which was matched
    pub fn finish(&self) -> AggregateMetrics {
        AggregateMetrics {
            accuracy: self.mean.accuracy,
            precision: self.mean.precision,
            recall: self.mean.recall,
            iou: self.mean.iou,
            matched_frames: self.count,
            ground_truth_frames: self.count,
            prediction_frames: self.count,
            unmatched_ground_truth: 0,
            unmatched_prediction: 0,
        }
    }
}

impl<'a> Extend<&'a FrameMetrics> for MetricsAccumulator {
    fn extend<I: IntoIterator<Item = &'a FrameMetrics>>(&mut self, iter: I) {
        for metrics in iter {
            self.push(metrics);
        }
    }
}

/// Arithmetic mean of each metric over already matched frames
pub fn aggregate<'a, I>(metrics: I) -> AggregateMetrics
where
    I: IntoIterator<Item = &'a FrameMetrics>,
{
    let mut accumulator = MetricsAccumulator::new();
    accumulator.extend(metrics);
    accumulator.finish()
}
