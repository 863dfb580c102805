mod background;
pub mod components;
mod localize;
pub mod morphology;
mod pipeline;
pub mod preprocess;
mod refine;
pub mod types;

pub use background::{BackgroundModel, BackgroundSnapshot, Gaussian, PixelLabel, PixelState};
pub use localize::ObjectLocalizer;
pub use pipeline::{FrameOutput, SegmentationPipeline};
pub use refine::MaskRefiner;
pub use types::{BackgroundSubtractor, BoundingBox, CleanMask, Frame, FrameId, RawMask};

use crate::config::Config;
use crate::error::SegResult;

/// Create the default pipeline (adaptive mixture model) from a configuration
pub fn create_default_pipeline(config: &Config) -> SegResult<SegmentationPipeline> {
    SegmentationPipeline::new(config)
}
