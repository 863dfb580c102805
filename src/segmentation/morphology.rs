//! Binary morphology on 0/255 masks.
//!
//! Erosion and dilation ignore neighbours that fall outside the image, so a
//! mask touching the border is neither eaten away nor grown by the border.

use super::preprocess::from_buffer;
use super::types::{BACKGROUND, FOREGROUND};
use crate::config::MAX_KERNEL_RADIUS;
use image::GrayImage;
use rayon::prelude::*;

/// Centred structuring element stored as neighbour offsets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    offsets: Vec<(i32, i32)>,
    radius: u32,
}

impl StructuringElement {
    /// Filled ellipse inscribed in a `(2r+1) x (2r+1)` box
    ///
    /// Radius 2 yields the familiar 5x5 element with single-pixel tips on
    /// the top and bottom rows. Radius 0 is the identity element. Radii
    /// above [`MAX_KERNEL_RADIUS`] are clamped to it.
    pub fn ellipse(radius: u32) -> Self {
        let radius = radius.min(MAX_KERNEL_RADIUS);
        let r = radius as i32;
        let mut offsets = Vec::new();
        for dy in -r..=r {
            let half_width = if r == 0 {
                0
            } else {
                let rf = r as f64;
                let rows = (rf * rf - f64::from(dy * dy)).max(0.0);
                (rf * (rows / (rf * rf)).sqrt()).round() as i32
            };
            for dx in -half_width..=half_width {
                offsets.push((dx, dy));
            }
        }
        Self { offsets, radius }
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn offsets(&self) -> &[(i32, i32)] {
        &self.offsets
    }
}

/// Pixel becomes foreground if every in-image neighbour under the element is
pub fn erode(mask: &GrayImage, element: &StructuringElement) -> GrayImage {
    apply(mask, element, true)
}

/// Pixel becomes foreground if any in-image neighbour under the element is
pub fn dilate(mask: &GrayImage, element: &StructuringElement) -> GrayImage {
    apply(mask, element, false)
}

/// Dilate then erode: fills holes and gaps narrower than the element
pub fn close(mask: &GrayImage, element: &StructuringElement) -> GrayImage {
    erode(&dilate(mask, element), element)
}

/// Erode then dilate: removes specks smaller than the element
pub fn open(mask: &GrayImage, element: &StructuringElement) -> GrayImage {
    dilate(&erode(mask, element), element)
}

fn apply(mask: &GrayImage, element: &StructuringElement, all: bool) -> GrayImage {
    let (width, height) = mask.dimensions();
    let (w, h) = (width as i32, height as i32);
    let src = mask.as_raw();
    let mut out = vec![BACKGROUND; src.len()];
    if width == 0 {
        return from_buffer(width, height, out);
    }

    out.par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as i32;
            for (x, value) in row.iter_mut().enumerate() {
                let x = x as i32;
                let mut in_image = element
                    .offsets
                    .iter()
                    .map(|&(dx, dy)| (x + dx, y + dy))
                    .filter(|&(nx, ny)| nx >= 0 && ny >= 0 && nx < w && ny < h)
                    .map(|(nx, ny)| src[(ny * w + nx) as usize] == FOREGROUND);
                let hit = if all {
                    in_image.all(|fg| fg)
                } else {
                    in_image.any(|fg| fg)
                };
                if hit {
                    *value = FOREGROUND;
                }
            }
        });

    from_buffer(width, height, out)
}
