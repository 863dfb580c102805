use super::MaskSink;
use crate::error::{SegError, SegResult};
use crate::segmentation::{BoundingBox, Frame, FrameId, FrameOutput};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: u32 = 2;

/// Writes clean masks, tracked-object overlays and a box listing to a
/// directory
///
/// Layout: `masks/mask_<id>.png`, `tracked/tracked_<id>.png` and
/// `boxes.json` (written by [`MaskSink::finish`]).
pub struct PngDirectorySink {
    masks_dir: PathBuf,
    tracked_dir: PathBuf,
    boxes_path: PathBuf,
    boxes: BTreeMap<FrameId, Vec<BoundingBox>>,
}

#[derive(Serialize)]
struct BoxesEntry<'a> {
    frame: FrameId,
    boxes: &'a [BoundingBox],
}

impl PngDirectorySink {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> SegResult<Self> {
        let root = output_dir.as_ref();
        tracing::info!("Writing masks and overlays to {}", root.display());

        let masks_dir = root.join("masks");
        let tracked_dir = root.join("tracked");
        std::fs::create_dir_all(&masks_dir)?;
        std::fs::create_dir_all(&tracked_dir)?;

        Ok(Self {
            masks_dir,
            tracked_dir,
            boxes_path: root.join("boxes.json"),
            boxes: BTreeMap::new(),
        })
    }

    pub fn masks_dir(&self) -> &Path {
        &self.masks_dir
    }

    /// Frame in colour (or its grayscale converted) with a green rectangle
    /// per object
    pub fn overlay(frame: &Frame, boxes: &[BoundingBox]) -> RgbImage {
        let mut tracked = match &frame.color {
            Some(color) => color.clone(),
            None => DynamicImage::ImageLuma8(frame.image.clone()).to_rgb8(),
        };
        for b in boxes {
            for inset in 0..BOX_THICKNESS {
                let width = b.width.saturating_sub(2 * inset);
                let height = b.height.saturating_sub(2 * inset);
                if width == 0 || height == 0 {
                    break;
                }
                let rect =
                    Rect::at((b.x + inset) as i32, (b.y + inset) as i32).of_size(width, height);
                draw_hollow_rect_mut(&mut tracked, rect, BOX_COLOR);
            }
        }
        tracked
    }
}

impl MaskSink for PngDirectorySink {
    fn write_output(&mut self, frame: &Frame, output: &FrameOutput) -> SegResult<()> {
        let mask_path = self.masks_dir.join(format!("mask_{}.png", output.id));
        output
            .mask
            .image()
            .save(&mask_path)
            .map_err(|source| SegError::Encode {
                path: mask_path.clone(),
                source,
            })?;

        let tracked_path = self.tracked_dir.join(format!("tracked_{}.png", output.id));
        Self::overlay(frame, &output.boxes)
            .save(&tracked_path)
            .map_err(|source| SegError::Encode {
                path: tracked_path.clone(),
                source,
            })?;

        self.boxes.insert(output.id, output.boxes.clone());
        Ok(())
    }

    fn finish(&mut self) -> SegResult<()> {
        let entries: Vec<BoxesEntry<'_>> = self
            .boxes
            .iter()
            .map(|(&frame, boxes)| BoxesEntry { frame, boxes })
            .collect();
        let writer = BufWriter::new(File::create(&self.boxes_path)?);
        serde_json::to_writer_pretty(writer, &entries)?;
        tracing::info!(
            "Wrote boxes for {} frames to {}",
            entries.len(),
            self.boxes_path.display()
        );
        Ok(())
    }
}
