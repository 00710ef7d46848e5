//! Energy extraction, smoothing and beat detection tunables.
//!
//! The beat thresholds were picked by eye for visual effect, not derived from
//! audio theory. Treat them as knobs.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Fractional bin range `[start, end)` of a spectrum, e.g. 0.3..0.6
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandRange {
    pub start: f32,
    pub end: f32,
}

impl BandRange {
    pub const fn new(start: f32, end: f32) -> Self {
        Self { start, end }
    }

    /// Bin indices covered by this band for a spectrum of `len` bins
    pub fn bins(&self, len: usize) -> std::ops::Range<usize> {
        let start = (len as f32 * self.start).floor() as usize;
        let end = (len as f32 * self.end).floor() as usize;
        start.min(len)..end.min(len)
    }
}

/// Per-frame energy and beat parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactiveTuning {
    /// Bass band (fraction of bins). Default: first 10%
    pub bass_band: BandRange,

    /// Mid band (fraction of bins). Default: 30%-60%
    pub mid_band: BandRange,

    /// Transient band searched for the loudest single bin. Default: 20%-80%
    pub peak_band: BandRange,

    /// Exponent applied to the loudest bin (2.0 favours strong transients)
    pub peak_exponent: f32,

    /// EMA blend per frame for bass (slow = steady pulse)
    pub bass_blend: f32,

    /// EMA blend per frame for mids
    pub mid_blend: f32,

    /// EMA blend per frame for peak (fast = sharp flash)
    pub peak_blend: f32,

    /// Peak tracker decay per frame, <1.0
    /// Formula: tracker = max(tracker * decay, bass)
    pub peak_decay: f32,

    /// Beat when bass exceeds this fraction of the peak tracker
    pub beat_fraction: f32,

    /// Beat never fires below this absolute bass level
    pub beat_floor: f32,
}

impl Default for ReactiveTuning {
    fn default() -> Self {
        Self {
            bass_band: BandRange::new(0.0, 0.1),
            mid_band: BandRange::new(0.3, 0.6),
            peak_band: BandRange::new(0.2, 0.8),
            peak_exponent: 2.0,
            bass_blend: 0.2,
            mid_blend: 0.3,
            peak_blend: 0.4,
            peak_decay: 0.95,
            beat_fraction: 0.8,
            beat_floor: 0.2,
        }
    }
}

impl ReactiveTuning {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, band) in [
            ("bass_band", self.bass_band),
            ("mid_band", self.mid_band),
            ("peak_band", self.peak_band),
        ] {
            if !(0.0..=1.0).contains(&band.start)
                || !(0.0..=1.0).contains(&band.end)
                || band.start >= band.end
            {
                return Err(ConfigError::Invalid(format!(
                    "{name} must satisfy 0 <= start < end <= 1, got {}..{}",
                    band.start, band.end
                )));
            }
        }
        for (name, blend) in [
            ("bass_blend", self.bass_blend),
            ("mid_blend", self.mid_blend),
            ("peak_blend", self.peak_blend),
        ] {
            if !(blend > 0.0 && blend <= 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be in (0, 1], got {blend}"
                )));
            }
        }
        if !(self.peak_decay > 0.0 && self.peak_decay < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "peak_decay must be in (0, 1), got {}",
                self.peak_decay
            )));
        }
        if self.peak_exponent <= 0.0 {
            return Err(ConfigError::Invalid("peak_exponent must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.beat_fraction) || !(0.0..=1.0).contains(&self.beat_floor) {
            return Err(ConfigError::Invalid(
                "beat_fraction and beat_floor must be in [0, 1]".into(),
            ));
        }
        Ok(())
    }
}
