use super::background::BackgroundModel;
use super::localize::ObjectLocalizer;
use super::refine::MaskRefiner;
use super::types::{BackgroundSubtractor, BoundingBox, CleanMask, Frame, FrameId};
use crate::config::Config;
use crate::error::SegResult;

/// Everything produced for one frame
#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub id: FrameId,
    pub mask: CleanMask,
    pub boxes: Vec<BoundingBox>,
}

/// Background subtraction, refinement and localization for one stream
///
/// Holds the only background model of the stream, so frames go through
/// [`SegmentationPipeline::process`] strictly one at a time.
pub struct SegmentationPipeline {
    subtractor: Box<dyn BackgroundSubtractor + Send>,
    refiner: MaskRefiner,
    localizer: ObjectLocalizer,
}

impl SegmentationPipeline {
    pub fn new(config: &Config) -> SegResult<Self> {
        config.validate()?;
        let model = BackgroundModel::new(config.background.clone())?;
        Ok(Self::with_subtractor(Box::new(model), config))
    }

    /// Use a custom background subtractor with the configured refinement
    pub fn with_subtractor(
        subtractor: Box<dyn BackgroundSubtractor + Send>,
        config: &Config,
    ) -> Self {
        Self {
            subtractor,
            refiner: MaskRefiner::new(config.refine.clone()),
            localizer: ObjectLocalizer::new(config.localize.clone()),
        }
    }

    pub fn process(&mut self, frame: &Frame) -> SegResult<FrameOutput> {
        let raw = self.subtractor.observe(frame)?;
        let mask = self.refiner.refine(&raw);
        let boxes = self.localizer.localize(&mask);
        tracing::debug!(
            "Frame {}: {} objects, {} mask pixels",
            frame.id,
            boxes.len(),
            mask.foreground_pixels()
        );
        Ok(FrameOutput {
            id: frame.id,
            mask,
            boxes,
        })
    }

    pub fn reset_state(&mut self) {
        self.subtractor.reset_state();
    }

    pub fn refiner(&self) -> &MaskRefiner {
        &self.refiner
    }

    pub fn localizer(&self) -> &ObjectLocalizer {
        &self.localizer
    }
}
