//! Spectrum analysis configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Analyser settings, mirroring a browser analyser node plus the shaping
/// curve applied to each polled frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyserConfig {
    /// FFT window size in samples (power of 2). Bin count is half of this.
    pub fft_size: usize,

    /// Blend with the previous poll's magnitudes, 0.0 = none, <1.0.
    pub smoothing_time_constant: f32,

    /// Magnitude (dB) mapped to byte 0
    pub min_decibels: f32,

    /// Magnitude (dB) mapped to byte 255
    pub max_decibels: f32,

    /// Shaping exponent applied to each normalized bin.
    /// Formula: v' = (v / 255)^curve * 255 * boost
    pub spectrum_curve: f32,

    /// Gain for the lowest bins (beats live there)
    pub low_boost: f32,

    /// Number of bins receiving `low_boost`
    pub low_boost_bins: usize,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: 512,
            smoothing_time_constant: 0.85,
            min_decibels: -100.0,
            max_decibels: -30.0,
            spectrum_curve: 0.7,
            low_boost: 1.3,
            low_boost_bins: 20,
        }
    }
}

impl AnalyserConfig {
    /// Number of frequency bins produced per poll
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// True when shaping leaves every bin unchanged
    pub fn shaping_is_identity(&self) -> bool {
        self.spectrum_curve == 1.0 && (self.low_boost == 1.0 || self.low_boost_bins == 0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.fft_size.is_power_of_two() || !(32..=32768).contains(&self.fft_size) {
            return Err(ConfigError::Invalid(format!(
                "fft_size must be a power of 2 in 32..=32768, got {}",
                self.fft_size
            )));
        }
        if !(0.0..1.0).contains(&self.smoothing_time_constant) {
            return Err(ConfigError::Invalid(format!(
                "smoothing_time_constant must be in [0, 1), got {}",
                self.smoothing_time_constant
            )));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(ConfigError::Invalid(format!(
                "min_decibels ({}) must be below max_decibels ({})",
                self.min_decibels, self.max_decibels
            )));
        }
        if self.spectrum_curve <= 0.0 || self.low_boost <= 0.0 {
            return Err(ConfigError::Invalid(
                "spectrum_curve and low_boost must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
