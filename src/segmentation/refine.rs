use super::components;
use super::morphology::{self, StructuringElement};
use super::preprocess::{binarize, from_buffer};
use super::types::{CleanMask, RawMask, BACKGROUND, FOREGROUND};
use crate::config::RefineConfig;
use image::GrayImage;

/// Turns a raw foreground decision into a clean object mask
///
/// Steps, in order:
/// 1. Re-binarize at `binarization_cut` (fusion or resampling upstream may
///    leave intermediate values)
/// 2. Closing with an elliptical element to fill small holes
/// 3. Opening with the same element to drop isolated specks
/// 4. Zero every 8-connected component smaller than `min_component_area`
///
/// Stateless; one refiner can serve any number of frames concurrently.
#[derive(Debug, Clone)]
pub struct MaskRefiner {
    config: RefineConfig,
    element: StructuringElement,
}

impl MaskRefiner {
    pub fn new(config: RefineConfig) -> Self {
        let element = StructuringElement::ellipse(config.kernel_radius);
        Self { config, element }
    }

    pub fn config(&self) -> &RefineConfig {
        &self.config
    }

    pub fn refine(&self, raw: &RawMask) -> CleanMask {
        let _span = tracing::debug_span!("refine").entered();
        CleanMask(self.refine_image(raw.image()))
    }

    /// Run the pipeline again over an existing clean mask
    ///
    /// Returns an equal mask when both were produced with this configuration.
    pub fn refine_clean(&self, mask: &CleanMask) -> CleanMask {
        CleanMask(self.refine_image(mask.image()))
    }

    fn refine_image(&self, image: &GrayImage) -> GrayImage {
        let binary = binarize(image, self.config.binarization_cut);
        let closed = morphology::close(&binary, &self.element);
        let opened = morphology::open(&closed, &self.element);
        self.drop_small_components(opened)
    }

    fn drop_small_components(&self, mask: GrayImage) -> GrayImage {
        let min_area = self.config.min_component_area;
        if min_area <= 1 {
            return mask;
        }

        let labelled = components::label(&mask);
        let keep: Vec<bool> = std::iter::once(false)
            .chain(labelled.components.iter().map(|c| c.area >= min_area))
            .collect();
        let removed = labelled.components.iter().filter(|c| c.area < min_area).count();
        if removed == 0 {
            return mask;
        }
        tracing::debug!(
            "Dropped {} of {} components below {} px",
            removed,
            labelled.components.len(),
            min_area
        );

        let data = labelled
            .labels
            .iter()
            .map(|&label| {
                if keep[label as usize] {
                    FOREGROUND
                } else {
                    BACKGROUND
                }
            })
            .collect();
        from_buffer(labelled.width, labelled.height, data)
    }
}

impl Default for MaskRefiner {
    fn default() -> Self {
        Self::new(RefineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn raw_with_rects(size: u32, rects: &[(u32, u32, u32, u32)]) -> RawMask {
        let mut image = GrayImage::new(size, size);
        for &(x0, y0, w, h) in rects {
            for y in y0..y0 + h {
                for x in x0..x0 + w {
                    image.put_pixel(x, y, Luma([FOREGROUND]));
                }
            }
        }
        RawMask(image)
    }

    fn refiner(min_component_area: u32) -> MaskRefiner {
        MaskRefiner::new(RefineConfig {
            min_component_area,
            ..RefineConfig::default()
        })
    }

    #[test]
    fn test_empty_mask_stays_empty() {
        let clean = MaskRefiner::default().refine(&RawMask(GrayImage::new(64, 48)));
        assert!(clean.is_empty());
        assert_eq!(clean.dimensions(), (64, 48));
    }

    #[test]
    fn test_full_mask_refines_normally() {
        let full = RawMask(GrayImage::from_pixel(40, 30, Luma([FOREGROUND])));
        let clean = MaskRefiner::default().refine(&full);
        assert_eq!(clean.foreground_pixels(), 40 * 30);
    }

    #[test]
    fn test_gray_levels_are_snapped() {
        // Shadow-grey and dim values fall below the cut
        let mut raw = raw_with_rects(60, &[(10, 10, 25, 25)]);
        for y in 40..55 {
            for x in 40..55 {
                raw.0.put_pixel(x, y, Luma([127]));
            }
        }
        let clean = refiner(100).refine(&raw);
        assert_eq!(clean.image().get_pixel(45, 45)[0], BACKGROUND);
        assert_eq!(clean.image().get_pixel(20, 20)[0], FOREGROUND);
    }

    #[test]
    fn test_component_just_below_minimum_is_removed() {
        // 21x19 = 399 px, and opening only shrinks it further
        let raw = raw_with_rects(60, &[(10, 10, 21, 19)]);
        let clean = refiner(400).refine(&raw);
        assert!(clean.is_empty());

        let raw = raw_with_rects(60, &[(10, 10, 30, 30)]);
        let clean = refiner(400).refine(&raw);
        assert!(!clean.is_empty());
    }

    #[test]
    fn test_component_at_minimum_is_kept() {
        // A full-width band of 40x10 = 400 px is unchanged by closing and opening
        let raw = raw_with_rects(40, &[(0, 10, 40, 10)]);
        let kept = refiner(400).refine(&raw);
        assert_eq!(kept.foreground_pixels(), 400);

        let dropped = refiner(401).refine(&raw);
        assert!(dropped.is_empty());
    }

    #[test]
    fn test_every_component_meets_minimum_area() {
        let raw = raw_with_rects(
            120,
            &[(5, 5, 30, 30), (50, 5, 8, 8), (70, 70, 25, 20), (5, 100, 12, 12)],
        );
        let clean = refiner(300).refine(&raw);
        let labelled = components::label(clean.image());
        assert_eq!(labelled.components.len(), 2);
        assert!(labelled.components.iter().all(|c| c.area >= 300));
    }

    #[test]
    fn test_refine_is_idempotent() {
        let mut raw = raw_with_rects(
            100,
            &[(10, 10, 30, 25), (60, 15, 20, 40), (15, 60, 6, 6), (50, 80, 40, 12)],
        );
        // Specks, a pin-hole and a thin bridge
        for &(x, y) in &[(3, 3), (95, 2), (45, 50), (20, 20), (21, 20), (40, 20)] {
            let value = if raw.0.get_pixel(x, y)[0] == FOREGROUND {
                BACKGROUND
            } else {
                FOREGROUND
            };
            raw.0.put_pixel(x, y, Luma([value]));
        }
        let refiner = MaskRefiner::default();
        let once = refiner.refine(&raw);
        let twice = refiner.refine_clean(&once);
        assert_eq!(once, twice);
        assert!(!once.is_empty());
    }
}
