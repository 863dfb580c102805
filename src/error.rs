//! Error types for segmentation and evaluation.

use std::path::PathBuf;
use thiserror::Error;

use crate::segmentation::FrameId;

/// Result type alias for library operations.
pub type SegResult<T> = Result<T, SegError>;

/// Errors that abort the current operation.
///
/// Per-frame recoverable conditions (a frame missing from one side of an
/// evaluation, a single undecodable image) are not errors; they are
/// collected into reports instead.
#[derive(Debug, Error)]
pub enum SegError {
    /// Frame dimensions differ from the ones the model was built with.
    #[error(
        "dimension mismatch: expected {}x{}, got {}x{}",
        expected.0,
        expected.1,
        actual.0,
        actual.1
    )]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// A frame arrived with an id older than the last observed one.
    #[error("frame {current} arrived after frame {previous}")]
    OutOfOrderFrame { previous: FrameId, current: FrameId },

    /// Nothing to compute.
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// An image could not be decoded.
    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// An image could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration value out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed.
    #[error("malformed configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl SegError {
    /// Create an empty input error.
    #[must_use]
    pub fn empty_input(details: impl Into<String>) -> Self {
        Self::EmptyInput(details.into())
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(details: impl Into<String>) -> Self {
        Self::InvalidConfig(details.into())
    }

    /// Whether the run can continue past this error by skipping one item.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SegError::DimensionMismatch {
            expected: (100, 80),
            actual: (50, 40),
        };
        assert_eq!(format!("{err}"), "dimension mismatch: expected 100x80, got 50x40");

        let err = SegError::OutOfOrderFrame {
            previous: FrameId(7),
            current: FrameId(3),
        };
        assert!(format!("{err}").contains("0003"));

        let err = SegError::empty_input("no ground truth masks");
        assert!(format!("{err}").contains("no ground truth masks"));

        let err = SegError::invalid_config("history must be positive");
        assert!(format!("{err}").contains("history"));
    }

    #[test]
    fn test_only_decode_is_recoverable() {
        let decode = SegError::Decode {
            path: PathBuf::from("frame_0001.png"),
            source: image::ImageError::IoError(std::io::Error::other("truncated")),
        };
        assert!(decode.is_recoverable());
        assert!(!SegError::empty_input("x").is_recoverable());
    }
}
