use crate::error::SegResult;
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Foreground value in every binary mask
pub const FOREGROUND: u8 = 255;
/// Background value in every binary mask
pub const BACKGROUND: u8 = 0;

/// Sequence index of a frame, shared by frames, predicted masks and
/// ground truth masks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(pub u64);

impl FrameId {
    /// Parse the frame number out of a file name
    ///
    /// Takes the last run of ASCII digits in the file stem, so
    /// `frame_0005.png` and `segmentation_mog2_5.png` both map to 5.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let stem = path.as_ref().file_stem()?.to_str()?;
        let head = stem.trim_end_matches(|c: char| !c.is_ascii_digit());
        let start = head.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        head[start..].parse().ok().map(FrameId)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

/// A single grayscale frame
///
/// `color` optionally keeps the decoded colour image for annotated output;
/// segmentation only ever reads `image`.
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: FrameId,
    pub image: GrayImage,
    pub color: Option<RgbImage>,
}

impl Frame {
    pub fn new(id: FrameId, image: GrayImage) -> Self {
        Self {
            id,
            image,
            color: None,
        }
    }

    /// Attach the colour original of this frame
    pub fn with_color(mut self, color: RgbImage) -> Self {
        self.color = Some(color);
        self
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Unrefined foreground decision of a background model (0 or 255 per pixel)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMask(pub GrayImage);

impl RawMask {
    pub fn image(&self) -> &GrayImage {
        &self.0
    }

    pub fn into_image(self) -> GrayImage {
        self.0
    }

    pub fn foreground_pixels(&self) -> usize {
        count_foreground(&self.0)
    }
}

/// Refined object mask
///
/// Every 8-connected foreground component has at least the refiner's
/// minimum area. Only [`super::MaskRefiner`] constructs one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanMask(pub(crate) GrayImage);

impl CleanMask {
    pub fn image(&self) -> &GrayImage {
        &self.0
    }

    pub fn into_image(self) -> GrayImage {
        self.0
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn foreground_pixels(&self) -> usize {
        count_foreground(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.pixels().all(|p| p[0] == BACKGROUND)
    }
}

/// Axis-aligned box around one connected component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// Trait for background subtractors
/// Allows swapping the statistical model without touching refinement
pub trait BackgroundSubtractor {
    /// Update the model with a frame and return its foreground decision
    ///
    /// Frames must come in non-decreasing id order and share the
    /// dimensions of the first observed frame.
    fn observe(&mut self, frame: &Frame) -> SegResult<RawMask>;

    /// Forget everything learned so far
    ///
    /// Call this when:
    /// - Switching to an unrelated sequence
    /// - Scene cuts detected
    fn reset_state(&mut self);

    /// Dimensions fixed by the first observed frame, if any
    fn dimensions(&self) -> Option<(u32, u32)>;
}

fn count_foreground(image: &GrayImage) -> usize {
    image.as_raw().iter().filter(|&&v| v == FOREGROUND).count()
}
