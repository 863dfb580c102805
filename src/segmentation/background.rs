use super::preprocess::{bitwise_or, frame_difference, from_buffer};
use super::types::{BackgroundSubtractor, Frame, FrameId, RawMask, BACKGROUND, FOREGROUND};
use crate::config::{BackgroundConfig, MAX_MIXTURES};
use crate::error::{SegError, SegResult};
use image::GrayImage;
use rayon::prelude::*;

/// One weighted Gaussian of a pixel's mixture
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Gaussian {
    pub weight: f32,
    pub mean: f32,
    pub variance: f32,
}

/// Classification of a single pixel observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLabel {
    Background,
    Foreground,
    /// Darker than a background mode by a plausible shadow ratio
    Shadow,
}

/// Adaptive statistics of one pixel
///
/// Modes are kept sorted by descending weight and their weights sum to 1.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PixelState {
    modes: [Gaussian; MAX_MIXTURES],
    used: u8,
    shadow: bool,
}

/// Per-frame constants shared by every pixel update
#[derive(Debug, Clone, Copy)]
struct UpdateParams {
    alpha: f32,
    prune: f32,
    mixtures: usize,
    var_threshold: f32,
    var_threshold_gen: f32,
    background_ratio: f32,
    var_init: f32,
    var_min: f32,
    var_max: f32,
    detect_shadows: bool,
    shadow_threshold: f32,
}

impl PixelState {
    pub fn modes(&self) -> &[Gaussian] {
        &self.modes[..usize::from(self.used)]
    }

    /// Heaviest mode, which best describes the background
    pub fn dominant(&self) -> Option<&Gaussian> {
        self.modes().first()
    }

    /// Whether the last observation was labelled shadow
    pub fn is_shadow(&self) -> bool {
        self.shadow
    }

    fn update(&mut self, x: f32, p: &UpdateParams) -> PixelLabel {
        if self.used == 0 {
            // The first observation becomes the background estimate
            self.modes[0] = Gaussian {
                weight: 1.0,
                mean: x,
                variance: p.var_init,
            };
            self.used = 1;
            self.shadow = false;
            return PixelLabel::Background;
        }

        let mut background = false;
        let mut fits = false;
        let mut cumulative = 0.0;
        let used = usize::from(self.used);
        for mode in self.modes[..used].iter_mut() {
            let mut weight = (1.0 - p.alpha) * mode.weight - p.prune;
            if !fits {
                let d = x - mode.mean;
                let dist2 = d * d;
                if cumulative < p.background_ratio && dist2 < p.var_threshold * mode.variance {
                    background = true;
                }
                if dist2 < p.var_threshold_gen * mode.variance {
                    fits = true;
                    weight += p.alpha;
                    let rho = (p.alpha / weight).min(1.0);
                    mode.mean += rho * d;
                    mode.variance =
                        (mode.variance + rho * (dist2 - mode.variance)).clamp(p.var_min, p.var_max);
                }
            }
            mode.weight = weight;
            cumulative += weight;
        }

        self.prune_and_sort();

        let label = if background {
            PixelLabel::Background
        } else if p.detect_shadows && self.looks_like_shadow(x, p) {
            PixelLabel::Shadow
        } else {
            PixelLabel::Foreground
        };
        self.shadow = label == PixelLabel::Shadow;

        if !fits {
            let fresh = Gaussian {
                weight: if self.used == 0 { 1.0 } else { p.alpha },
                mean: x,
                variance: p.var_init,
            };
            if usize::from(self.used) < p.mixtures {
                self.modes[usize::from(self.used)] = fresh;
                self.used += 1;
            } else {
                self.modes[p.mixtures - 1] = fresh;
            }
        }

        self.normalize();
        self.prune_and_sort();
        label
    }

    fn looks_like_shadow(&self, x: f32, p: &UpdateParams) -> bool {
        let mut cumulative = 0.0;
        for mode in self.modes() {
            if cumulative >= p.background_ratio {
                break;
            }
            if mode.mean > 0.0 {
                let ratio = x / mode.mean;
                if (p.shadow_threshold..=1.0).contains(&ratio) {
                    return true;
                }
            }
            cumulative += mode.weight;
        }
        false
    }

    fn prune_and_sort(&mut self) {
        let mut kept = 0;
        for i in 0..usize::from(self.used) {
            if self.modes[i].weight > 0.0 {
                self.modes[kept] = self.modes[i];
                kept += 1;
            }
        }
        // kept <= MAX_MIXTURES
        self.used = kept as u8;
        self.modes[..kept].sort_by(|a, b| b.weight.total_cmp(&a.weight));
    }

    fn normalize(&mut self) {
        let total: f32 = self.modes().iter().map(|m| m.weight).sum();
        if total > 0.0 {
            let used = usize::from(self.used);
            for mode in self.modes[..used].iter_mut() {
                mode.weight /= total;
            }
        }
    }
}

/// Deep copy of a model's per-pixel state
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundSnapshot {
    pub width: u32,
    pub height: u32,
    pub frames_observed: u64,
    pub pixels: Vec<PixelState>,
}

/// Per-pixel adaptive Gaussian mixture background model
///
/// Each pixel keeps up to `mixtures` weighted Gaussians that forget old
/// observations exponentially with rate `1 / history`. A pixel is foreground
/// when no sufficiently heavy mode explains its intensity. During the first
/// `history` frames the statistics are still settling and the mask is
/// noisier; that is expected, not an error.
///
/// Pixels are updated in parallel within a frame; frames themselves must be
/// observed one after another in id order.
pub struct BackgroundModel {
    config: BackgroundConfig,
    pixels: Vec<PixelState>,
    dimensions: Option<(u32, u32)>,
    previous: Option<GrayImage>,
    last_frame: Option<FrameId>,
    frames_observed: u64,
}

impl BackgroundModel {
    pub fn new(config: BackgroundConfig) -> SegResult<Self> {
        config.validate()?;
        tracing::debug!(
            "Background model: history={}, var_threshold={}, mixtures={}, shadows={}",
            config.history,
            config.var_threshold,
            config.mixtures,
            config.detect_shadows
        );
        Ok(Self {
            config,
            pixels: Vec::new(),
            dimensions: None,
            previous: None,
            last_frame: None,
            frames_observed: 0,
        })
    }

    pub fn config(&self) -> &BackgroundConfig {
        &self.config
    }

    /// Number of frames folded into the statistics, doubles as state version
    pub fn frames_observed(&self) -> u64 {
        self.frames_observed
    }

    pub fn learning_rate(&self) -> f32 {
        self.config
            .learning_rate
            .unwrap_or(1.0 / self.config.history as f32)
    }

    /// Copy of the current per-pixel state
    pub fn snapshot(&self) -> Option<BackgroundSnapshot> {
        let (width, height) = self.dimensions?;
        Some(BackgroundSnapshot {
            width,
            height,
            frames_observed: self.frames_observed,
            pixels: self.pixels.clone(),
        })
    }

    /// Mean of each pixel's dominant mode
    pub fn background_image(&self) -> Option<GrayImage> {
        let (width, height) = self.dimensions?;
        let data = self
            .pixels
            .iter()
            .map(|p| p.dominant().map_or(0, |g| g.mean.round().clamp(0.0, 255.0) as u8))
            .collect();
        Some(from_buffer(width, height, data))
    }

    fn params(&self) -> UpdateParams {
        let alpha = self.learning_rate();
        UpdateParams {
            alpha,
            prune: alpha * self.config.complexity_reduction,
            mixtures: self.config.mixtures,
            var_threshold: self.config.var_threshold,
            var_threshold_gen: self.config.var_threshold_gen,
            background_ratio: self.config.background_ratio,
            var_init: self.config.var_init,
            var_min: self.config.var_min,
            var_max: self.config.var_max,
            detect_shadows: self.config.detect_shadows,
            shadow_threshold: self.config.shadow_threshold,
        }
    }

    fn check_frame(&mut self, frame: &Frame) -> SegResult<()> {
        if let Some(previous) = self.last_frame {
            if frame.id < previous {
                return Err(SegError::OutOfOrderFrame {
                    previous,
                    current: frame.id,
                });
            }
        }

        let actual = frame.dimensions();
        match self.dimensions {
            Some(expected) if expected != actual => {
                Err(SegError::DimensionMismatch { expected, actual })
            }
            Some(_) => Ok(()),
            None => {
                let (width, height) = actual;
                if width == 0 || height == 0 {
                    return Err(SegError::empty_input(format!("frame {} has no pixels", frame.id)));
                }
                tracing::debug!("Initializing background model at {}x{}", width, height);
                self.pixels = vec![PixelState::default(); width as usize * height as usize];
                self.dimensions = Some(actual);
                Ok(())
            }
        }
    }
}

impl BackgroundSubtractor for BackgroundModel {
    fn observe(&mut self, frame: &Frame) -> SegResult<RawMask> {
        let _span = tracing::debug_span!("observe", frame = %frame.id).entered();

        self.check_frame(frame)?;
        let params = self.params();
        let (width, height) = frame.dimensions();

        let mut data = vec![BACKGROUND; self.pixels.len()];
        let shadows: usize = self
            .pixels
            .par_iter_mut()
            .zip(frame.image.as_raw().par_iter())
            .zip(data.par_iter_mut())
            .map(|((state, &value), out)| match state.update(f32::from(value), &params) {
                PixelLabel::Foreground => {
                    *out = FOREGROUND;
                    0
                }
                PixelLabel::Shadow => 1,
                PixelLabel::Background => 0,
            })
            .sum();
        let mut mask = from_buffer(width, height, data);

        if let Some(threshold) = self.config.frame_difference_threshold {
            if let Some(previous) = &self.previous {
                let moved = frame_difference(&frame.image, previous, threshold);
                mask = bitwise_or(&mask, &moved);
            }
            self.previous = Some(frame.image.clone());
        }

        self.frames_observed += 1;
        self.last_frame = Some(frame.id);

        let raw = RawMask(mask);
        tracing::debug!(
            "Frame {}: {} foreground, {} shadow pixels",
            frame.id,
            raw.foreground_pixels(),
            shadows
        );
        Ok(raw)
    }

    fn reset_state(&mut self) {
        tracing::info!("Resetting background model");
        self.pixels = Vec::new();
        self.dimensions = None;
        self.previous = None;
        self.last_frame = None;
        self.frames_observed = 0;
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn flat(id: u64, width: u32, height: u32, value: u8) -> Frame {
        Frame::new(FrameId(id), GrayImage::from_pixel(width, height, Luma([value])))
    }

    fn with_patch(id: u64, base: u8, patch: u8) -> Frame {
        let mut image = GrayImage::from_pixel(20, 20, Luma([base]));
        for y in 5..10 {
            for x in 5..10 {
                image.put_pixel(x, y, Luma([patch]));
            }
        }
        Frame::new(FrameId(id), image)
    }

    #[test]
    fn test_static_scene_is_background() {
        let mut model = BackgroundModel::new(BackgroundConfig::default()).unwrap();
        for id in 1..=10 {
            let mask = model.observe(&flat(id, 16, 12, 90)).unwrap();
            assert_eq!(mask.image().dimensions(), (16, 12));
            assert_eq!(mask.foreground_pixels(), 0, "frame {id}");
        }
        assert_eq!(model.frames_observed(), 10);
        assert_eq!(model.dimensions(), Some((16, 12)));
    }

    #[test]
    fn test_new_object_is_foreground_until_it_leaves() {
        let mut model = BackgroundModel::new(BackgroundConfig::default()).unwrap();
        for id in 1..=3 {
            model.observe(&with_patch(id, 20, 20)).unwrap();
        }
        for id in 4..=6 {
            let mask = model.observe(&with_patch(id, 20, 230)).unwrap();
            assert_eq!(mask.foreground_pixels(), 25, "frame {id}");
            assert_eq!(mask.image().get_pixel(7, 7)[0], FOREGROUND);
        }
        let mask = model.observe(&with_patch(7, 20, 20)).unwrap();
        assert_eq!(mask.foreground_pixels(), 0);
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let mut model = BackgroundModel::new(BackgroundConfig::default()).unwrap();
        model.observe(&flat(1, 10, 10, 0)).unwrap();
        let err = model.observe(&flat(2, 20, 10, 0)).unwrap_err();
        assert!(matches!(
            err,
            SegError::DimensionMismatch {
                expected: (10, 10),
                actual: (20, 10)
            }
        ));
    }

    #[test]
    fn test_out_of_order_frames_are_rejected() {
        let mut model = BackgroundModel::new(BackgroundConfig::default()).unwrap();
        model.observe(&flat(5, 8, 8, 0)).unwrap();
        model.observe(&flat(5, 8, 8, 0)).unwrap();
        let err = model.observe(&flat(4, 8, 8, 0)).unwrap_err();
        assert!(matches!(err, SegError::OutOfOrderFrame { .. }));
        assert_eq!(model.frames_observed(), 2);
    }

    #[test]
    fn test_empty_first_frame() {
        let mut model = BackgroundModel::new(BackgroundConfig::default()).unwrap();
        let err = model.observe(&flat(1, 0, 0, 0)).unwrap_err();
        assert!(matches!(err, SegError::EmptyInput(_)));
    }

    #[test]
    fn test_shadows_are_excluded() {
        let mut model = BackgroundModel::new(BackgroundConfig::default()).unwrap();
        for id in 1..=20 {
            model.observe(&with_patch(id, 200, 200)).unwrap();
        }
        // 150/200 is within the shadow ratio band
        let mask = model.observe(&with_patch(21, 200, 150)).unwrap();
        assert_eq!(mask.foreground_pixels(), 0);
        let snapshot = model.snapshot().unwrap();
        assert!(snapshot.pixels[7 * 20 + 7].is_shadow());
        assert!(!snapshot.pixels[0].is_shadow());

        // 50/200 is too dark to be a shadow
        let mask = model.observe(&with_patch(22, 200, 50)).unwrap();
        assert_eq!(mask.foreground_pixels(), 25);
    }

    #[test]
    fn test_shadow_detection_can_be_disabled() {
        let config = BackgroundConfig {
            detect_shadows: false,
            ..BackgroundConfig::default()
        };
        let mut model = BackgroundModel::new(config).unwrap();
        for id in 1..=20 {
            model.observe(&with_patch(id, 200, 200)).unwrap();
        }
        let mask = model.observe(&with_patch(21, 200, 150)).unwrap();
        assert_eq!(mask.foreground_pixels(), 25);
    }

    #[test]
    fn test_frame_difference_fusion() {
        let fused = BackgroundConfig {
            frame_difference_threshold: Some(30),
            ..BackgroundConfig::default()
        };
        let mut plain = BackgroundModel::new(BackgroundConfig::default()).unwrap();
        let mut model = BackgroundModel::new(fused).unwrap();
        for id in 1..=3 {
            plain.observe(&with_patch(id, 20, 20)).unwrap();
            model.observe(&with_patch(id, 20, 20)).unwrap();
        }
        for id in 4..=5 {
            plain.observe(&with_patch(id, 20, 230)).unwrap();
            model.observe(&with_patch(id, 20, 230)).unwrap();
        }
        // Once the object leaves, only the temporal difference still fires
        let frame = with_patch(6, 20, 20);
        assert_eq!(plain.observe(&frame).unwrap().foreground_pixels(), 0);
        assert_eq!(model.observe(&frame).unwrap().foreground_pixels(), 25);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut model = BackgroundModel::new(BackgroundConfig::default()).unwrap();
        model.observe(&flat(1, 4, 4, 100)).unwrap();
        let snapshot = model.snapshot().unwrap();
        model.observe(&flat(2, 4, 4, 250)).unwrap();
        assert_eq!(snapshot.frames_observed, 1);
        assert_eq!(snapshot.pixels[0].modes().len(), 1);
        assert_eq!(model.snapshot().unwrap().pixels[0].modes().len(), 2);
    }

    #[test]
    fn test_weights_stay_normalized_and_sorted() {
        let mut model = BackgroundModel::new(BackgroundConfig::default()).unwrap();
        for (id, value) in [10u8, 240, 10, 120, 240, 60, 10, 200].into_iter().enumerate() {
            model.observe(&flat(id as u64, 2, 2, value)).unwrap();
        }
        let snapshot = model.snapshot().unwrap();
        for pixel in &snapshot.pixels {
            let modes = pixel.modes();
            assert!(!modes.is_empty() && modes.len() <= 5);
            let total: f32 = modes.iter().map(|m| m.weight).sum();
            assert!((total - 1.0).abs() < 1e-4);
            assert!(modes.windows(2).all(|w| w[0].weight >= w[1].weight));
            assert!(modes.iter().all(|m| (4.0..=75.0).contains(&m.variance)));
        }
    }

    #[test]
    fn test_background_image_and_reset() {
        let mut model = BackgroundModel::new(BackgroundConfig::default()).unwrap();
        assert!(model.background_image().is_none());
        model.observe(&flat(1, 3, 3, 77)).unwrap();
        let background = model.background_image().unwrap();
        assert!(background.pixels().all(|p| p[0] == 77));

        model.reset_state();
        assert_eq!(model.dimensions(), None);
        assert_eq!(model.frames_observed(), 0);
        // A different size is fine after a reset
        model.observe(&flat(1, 6, 2, 0)).unwrap();
        assert_eq!(model.dimensions(), Some((6, 2)));
    }
}
