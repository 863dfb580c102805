use super::metrics::align_prediction;
use crate::segmentation::preprocess::binarize;
use crate::segmentation::FrameId;
use image::GrayImage;
use serde::Serialize;

/// Pixel-level disagreement between one ground truth and one prediction
#[derive(Debug, Clone, Serialize)]
pub struct MaskComparison {
    pub frame: FrameId,
    pub ground_truth_active: usize,
    pub prediction_active: usize,
    pub differing_pixels: usize,
    /// 255 where the two binarized masks disagree
    #[serde(skip)]
    pub difference: GrayImage,
}

impl MaskComparison {
    pub fn identical(&self) -> bool {
        self.differing_pixels == 0
    }
}

/// Binarize both masks at `cut`, align the prediction to the ground truth
/// and mark every disagreeing pixel
pub fn compare(
    frame: FrameId,
    ground_truth: &GrayImage,
    prediction: &GrayImage,
    cut: u8,
) -> MaskComparison {
    let gt = binarize(ground_truth, cut);
    let pred = binarize(&align_prediction(ground_truth, prediction), cut);
    let difference = GrayImage::from_fn(gt.width(), gt.height(), |x, y| {
        image::Luma([gt.get_pixel(x, y)[0].abs_diff(pred.get_pixel(x, y)[0])])
    });

    let active = |mask: &GrayImage| mask.as_raw().iter().filter(|&&v| v != 0).count();
    MaskComparison {
        frame,
        ground_truth_active: active(&gt),
        prediction_active: active(&pred),
        differing_pixels: active(&difference),
        difference,
    }
}
