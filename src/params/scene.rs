//! Mapping from energy metrics to scene parameters.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Scene mapping constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneMapping {
    /// Upper bound on bars per row. Actual count: min(max_bars, bins / 16)
    pub max_bars: usize,

    /// Bar width in world units (meters)
    pub bar_width: f32,

    /// Gap between bars (meters)
    pub bar_spacing: f32,

    /// Height response multiplier
    /// Formula: target = 0.05 + sqrt(level) * sensitivity * 12 * boost
    pub bar_sensitivity: f32,

    /// Front row EMA blend toward target height (faster)
    pub front_bar_blend: f32,

    /// Back row EMA blend toward target height (slower)
    pub back_bar_blend: f32,

    /// Back row height as a fraction of the front row target
    pub back_bar_ratio: f32,

    /// EMA blend used by every beat transient on the way back to rest
    pub transient_blend: f32,

    /// Group scale set on a beat frame
    pub beat_pulse_scale: f32,

    /// Z offset (meters) given to even bars on a beat frame
    pub beat_z_kick: f32,

    /// Roll (radians) given to bars on a beat frame, scaled by bar level
    pub beat_roll_kick: f32,

    /// Hue spread across one row (fraction of the colour wheel)
    pub hue_spread: f32,

    /// Hue rotation speed (turns per second)
    pub hue_speed: f32,

    /// Hue offset of the back row
    pub back_row_hue_offset: f32,

    /// Sun breathing rate (radians per second)
    pub breath_rate: f32,

    /// Sun breathing depth (fraction of scale)
    pub breath_depth: f32,

    /// Camera sway amplitude (meters at full bass)
    pub camera_sway_m: f32,
}

impl Default for SceneMapping {
    fn default() -> Self {
        Self {
            max_bars: 64,
            bar_width: 0.15,
            bar_spacing: 0.05,
            bar_sensitivity: 1.0,
            front_bar_blend: 0.4,
            back_bar_blend: 0.3,
            back_bar_ratio: 0.7,
            transient_blend: 0.2,
            beat_pulse_scale: 1.05,
            beat_z_kick: 0.3,
            beat_roll_kick: 0.1,
            hue_spread: 0.3,
            hue_speed: 0.05,
            back_row_hue_offset: 0.5,
            breath_rate: 0.5,
            breath_depth: 0.1,
            camera_sway_m: 0.3,
        }
    }
}

impl SceneMapping {
    /// Bars per row for a spectrum of `bin_count` bins (at least one)
    pub fn bar_count(&self, bin_count: usize) -> usize {
        (bin_count / 16).min(self.max_bars).max(1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bars == 0 {
            return Err(ConfigError::Invalid("max_bars must be at least 1".into()));
        }
        for (name, blend) in [
            ("front_bar_blend", self.front_bar_blend),
            ("back_bar_blend", self.back_bar_blend),
            ("transient_blend", self.transient_blend),
        ] {
            if !(blend > 0.0 && blend <= 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be in (0, 1], got {blend}"
                )));
            }
        }
        if self.bar_width <= 0.0 || self.bar_spacing < 0.0 {
            return Err(ConfigError::Invalid(
                "bar_width must be positive and bar_spacing non-negative".into(),
            ));
        }
        Ok(())
    }
}
