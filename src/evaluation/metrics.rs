use crate::error::{SegError, SegResult};
use crate::segmentation::preprocess::resize_nearest;
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Per-pixel agreement counts between a ground truth and a prediction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positive: u64,
    pub false_positive: u64,
    pub true_negative: u64,
    pub false_negative: u64,
}

impl ConfusionMatrix {
    /// Count agreement of two equally sized masks, foreground being `> cut`
    pub fn from_masks(ground_truth: &GrayImage, prediction: &GrayImage, cut: u8) -> Self {
        let mut matrix = Self::default();
        for (&gt, &pred) in ground_truth.as_raw().iter().zip(prediction.as_raw()) {
            match (gt > cut, pred > cut) {
                (true, true) => matrix.true_positive += 1,
                (false, true) => matrix.false_positive += 1,
                (false, false) => matrix.true_negative += 1,
                (true, false) => matrix.false_negative += 1,
            }
        }
        matrix
    }

    pub fn total(&self) -> u64 {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positive + self.true_negative, self.total(), 0.0)
    }

    /// 1 when nothing was predicted: no prediction, no false alarm
    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive, 1.0)
    }

    /// 1 when the ground truth has no foreground
    pub fn recall(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative, 1.0)
    }

    /// 0 when both masks are empty: an empty union says nothing about overlap
    pub fn iou(&self) -> f64 {
        ratio(
            self.true_positive,
            self.true_positive + self.false_positive + self.false_negative,
            0.0,
        )
    }

    pub fn metrics(&self) -> FrameMetrics {
        FrameMetrics {
            accuracy: self.accuracy(),
            precision: self.precision(),
            recall: self.recall(),
            iou: self.iou(),
        }
    }
}

fn ratio(numerator: u64, denominator: u64, if_empty: f64) -> f64 {
    if denominator == 0 {
        if_empty
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Quality of one predicted mask against its ground truth
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub iou: f64,
}

/// Bring a prediction onto the ground truth's pixel grid
///
/// The ground truth defines the measurement frame, so only the prediction
/// is ever resampled.
pub fn align_prediction(ground_truth: &GrayImage, prediction: &GrayImage) -> GrayImage {
    let (width, height) = ground_truth.dimensions();
    resize_nearest(prediction, width, height)
}

/// Score a prediction against a ground truth mask
///
/// Pixels above `cut` count as foreground in both masks.
pub fn score_with_cut(
    ground_truth: &GrayImage,
    prediction: &GrayImage,
    cut: u8,
) -> SegResult<FrameMetrics> {
    let _span = tracing::debug_span!("score").entered();
    let (width, height) = ground_truth.dimensions();
    if width == 0 || height == 0 {
        return Err(SegError::empty_input("ground truth mask has no pixels"));
    }
    if prediction.width() == 0 || prediction.height() == 0 {
        return Err(SegError::empty_input("predicted mask has no pixels"));
    }
    let prediction = align_prediction(ground_truth, prediction);
    Ok(ConfusionMatrix::from_masks(ground_truth, &prediction, cut).metrics())
}

/// Score with the standard cut of 127
pub fn score(ground_truth: &GrayImage, prediction: &GrayImage) -> SegResult<FrameMetrics> {
    score_with_cut(ground_truth, prediction, 127)
}
