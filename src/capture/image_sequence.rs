use super::FrameSource;
use crate::error::{SegError, SegResult};
use crate::evaluation::LoadFailure;
use crate::segmentation::preprocess::to_grayscale;
use crate::segmentation::{Frame, FrameId};
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Frames read from a directory of numbered image files
///
/// Files are ordered by the frame number in their name. Frames are decoded
/// lazily and converted to grayscale, keeping a colour copy for overlays; a
/// file that fails to decode is logged, counted and skipped.
pub struct ImageSequence {
    dir: PathBuf,
    pending: std::vec::IntoIter<(FrameId, PathBuf)>,
    skipped: Vec<LoadFailure>,
}

impl ImageSequence {
    pub fn open<P: AsRef<Path>>(dir: P) -> SegResult<Self> {
        let dir = dir.as_ref();
        tracing::info!("Opening image sequence at {}", dir.display());

        let mut frames = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path.extension().and_then(|e| e.to_str()).is_some_and(|e| {
                IMAGE_EXTENSIONS
                    .iter()
                    .any(|known| e.eq_ignore_ascii_case(known))
            });
            if !path.is_file() || !is_image {
                continue;
            }
            match FrameId::from_path(&path) {
                Some(id) => frames.push((id, path)),
                None => tracing::warn!("Ignoring {}: no frame number in name", path.display()),
            }
        }
        if frames.is_empty() {
            return Err(SegError::empty_input(format!("no frames in {}", dir.display())));
        }
        frames.sort();

        tracing::info!("Found {} frames", frames.len());
        Ok(Self {
            dir: dir.to_path_buf(),
            pending: frames.into_iter(),
            skipped: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files that could not be decoded so far
    pub fn skipped(&self) -> &[LoadFailure] {
        &self.skipped
    }
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> SegResult<Option<Frame>> {
        for (id, path) in self.pending.by_ref() {
            match image::open(&path) {
                Ok(image) => {
                    let frame = Frame::new(id, to_grayscale(&image)).with_color(image.to_rgb8());
                    return Ok(Some(frame));
                }
                Err(err) => {
                    tracing::warn!("Skipping frame {} ({}): {}", id, path.display(), err);
                    self.skipped.push(LoadFailure {
                        path,
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(None)
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.pending.len())
    }
}
