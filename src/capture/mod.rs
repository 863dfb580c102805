mod image_sequence;

pub use image_sequence::ImageSequence;

use crate::error::SegResult;
use crate::segmentation::Frame;
use std::collections::VecDeque;

/// Trait for ordered frame sources
pub trait FrameSource {
    /// Next frame in id order, `None` once the source is exhausted
    fn next_frame(&mut self) -> SegResult<Option<Frame>>;

    /// Number of frames still expected, when known
    fn remaining(&self) -> Option<usize> {
        None
    }
}

/// Frames held in memory, handed out in insertion order
#[derive(Debug, Default)]
pub struct MemorySource {
    frames: VecDeque<Frame>,
}

impl MemorySource {
    pub fn new<I: IntoIterator<Item = Frame>>(frames: I) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> SegResult<Option<Frame>> {
        Ok(self.frames.pop_front())
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.frames.len())
    }
}
