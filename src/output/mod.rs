mod png_sink;

pub use png_sink::PngDirectorySink;

use crate::error::SegResult;
use crate::segmentation::{Frame, FrameOutput};

/// Trait for per-frame result destinations
pub trait MaskSink {
    /// Write the results computed for `frame`
    fn write_output(&mut self, frame: &Frame, output: &FrameOutput) -> SegResult<()>;

    /// Flush anything buffered across frames
    fn finish(&mut self) -> SegResult<()> {
        Ok(())
    }
}
