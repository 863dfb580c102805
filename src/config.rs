//! Pipeline configuration
//!
//! Loaded from an optional JSON file; every field has a default so a partial
//! file (or none at all) is valid. Command-line flags override file values.

use crate::error::{SegError, SegResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound on Gaussian modes per pixel.
pub const MAX_MIXTURES: usize = 8;

/// Largest structuring element radius accepted (a 129x129 ellipse).
pub const MAX_KERNEL_RADIUS: u32 = 64;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub background: BackgroundConfig,
    pub refine: RefineConfig,
    pub localize: LocalizeConfig,
    pub evaluation: EvaluationConfig,
}

/// Adaptive mixture parameters. Variances are in squared intensity units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    /// Effective adaptation window in frames
    pub history: u32,
    /// Squared-distance threshold (in variances) for the background decision
    pub var_threshold: f32,
    /// Squared-distance threshold (in variances) for updating a mode
    pub var_threshold_gen: f32,
    pub mixtures: usize,
    pub background_ratio: f32,
    pub var_init: f32,
    pub var_min: f32,
    pub var_max: f32,
    pub complexity_reduction: f32,
    /// Fixed learning rate; `None` means `1 / history`
    pub learning_rate: Option<f32>,
    pub detect_shadows: bool,
    /// Lowest intensity ratio to the background mean still considered shadow
    pub shadow_threshold: f32,
    /// Frame-to-frame difference fused into the foreground when set
    pub frame_difference_threshold: Option<u8>,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            history: 500,
            var_threshold: 50.0,
            var_threshold_gen: 9.0,
            mixtures: 5,
            background_ratio: 0.9,
            var_init: 15.0,
            var_min: 4.0,
            var_max: 75.0,
            complexity_reduction: 0.05,
            learning_rate: None,
            detect_shadows: true,
            shadow_threshold: 0.5,
            frame_difference_threshold: None,
        }
    }
}

/// Frame difference cut used when fusion is switched on without a value.
pub const DEFAULT_FRAME_DIFFERENCE_THRESHOLD: u8 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    pub binarization_cut: u8,
    /// Radius of the elliptical structuring element (2 gives 5x5)
    pub kernel_radius: u32,
    pub min_component_area: u32,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            binarization_cut: 200,
            kernel_radius: 2,
            min_component_area: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizeConfig {
    pub min_box_area: u32,
}

impl Default for LocalizeConfig {
    fn default() -> Self {
        Self { min_box_area: 500 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub binarization_cut: u8,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            binarization_cut: 127,
        }
    }
}

impl Config {
    /// Load and validate a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> SegResult<Self> {
        let path = path.as_ref();
        tracing::info!("Loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SegResult<()> {
        self.background.validate()?;
        self.refine.validate()?;
        self.evaluation.validate()
    }
}

impl RefineConfig {
    /// A cut of 255 would leave every mask empty, so it is rejected.
    pub fn validate(&self) -> SegResult<()> {
        if self.kernel_radius > MAX_KERNEL_RADIUS {
            return Err(SegError::invalid_config(format!(
                "refine.kernel_radius must be at most {MAX_KERNEL_RADIUS}, got {}",
                self.kernel_radius
            )));
        }
        if self.binarization_cut == u8::MAX {
            return Err(SegError::invalid_config(
                "refine.binarization_cut must be below 255",
            ));
        }
        Ok(())
    }
}

impl EvaluationConfig {
    pub fn validate(&self) -> SegResult<()> {
        if self.binarization_cut == u8::MAX {
            return Err(SegError::invalid_config(
                "evaluation.binarization_cut must be below 255",
            ));
        }
        Ok(())
    }
}

impl BackgroundConfig {
    pub fn validate(&self) -> SegResult<()> {
        if self.history == 0 {
            return Err(SegError::invalid_config("background.history must be positive"));
        }
        if self.mixtures == 0 || self.mixtures > MAX_MIXTURES {
            return Err(SegError::invalid_config(format!(
                "background.mixtures must be in 1..={MAX_MIXTURES}, got {}",
                self.mixtures
            )));
        }
        if !(self.var_threshold > 0.0 && self.var_threshold_gen > 0.0) {
            return Err(SegError::invalid_config("variance thresholds must be positive"));
        }
        if !(self.background_ratio > 0.0 && self.background_ratio <= 1.0) {
            return Err(SegError::invalid_config("background.background_ratio must be in (0, 1]"));
        }
        if !(self.var_min > 0.0 && self.var_min <= self.var_init && self.var_init <= self.var_max) {
            return Err(SegError::invalid_config(
                "variances must satisfy 0 < var_min <= var_init <= var_max",
            ));
        }
        if let Some(rate) = self.learning_rate {
            if !(rate > 0.0 && rate <= 1.0) {
                return Err(SegError::invalid_config("background.learning_rate must be in (0, 1]"));
            }
        }
        if !(0.0..=1.0).contains(&self.shadow_threshold) {
            return Err(SegError::invalid_config("background.shadow_threshold must be in [0, 1]"));
        }
        Ok(())
    }
}
