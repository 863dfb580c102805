use super::components;
use super::types::{BoundingBox, CleanMask};
use crate::config::LocalizeConfig;

/// Extracts one bounding box per outer object of a clean mask
///
/// Objects nested inside a hole of another object are covered by the outer
/// object's box and produce none of their own. Boxes smaller than
/// `min_box_area` are dropped; this is separate from the refiner's
/// component-area filter because a sparse component can have a large box and
/// vice versa.
///
/// Boxes come out in raster order of each object's first pixel
/// (top-to-bottom, then left-to-right). Callers should not rely on it.
#[derive(Debug, Clone, Default)]
pub struct ObjectLocalizer {
    config: LocalizeConfig,
}

impl ObjectLocalizer {
    pub fn new(config: LocalizeConfig) -> Self {
        Self { config }
    }

    pub fn localize(&self, mask: &CleanMask) -> Vec<BoundingBox> {
        let _span = tracing::debug_span!("localize").entered();
        let min_area = u64::from(self.config.min_box_area);
        components::label(mask.image())
            .components
            .into_iter()
            .filter(|c| c.external)
            .map(|c| c.bounds)
            .filter(|b| b.area() >= min_area)
            .collect()
    }
}
