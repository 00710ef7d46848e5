//! Band energies, smoothing and beat detection.

use crate::params::ReactiveTuning;

/// Instantaneous band energies of one spectrum, each in [0, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandEnergies {
    pub bass: f32,
    pub mid: f32,
    pub peak: f32,
}

/// Mean of `bins[range]` scaled to [0, 1]; 0 for an empty range
fn band_mean(bins: &[u8], range: std::ops::Range<usize>) -> f32 {
    let slice = &bins[range];
    if slice.is_empty() {
        return 0.0;
    }
    let sum: u32 = slice.iter().map(|&b| b as u32).sum();
    sum as f32 / slice.len() as f32 / 255.0
}

/// Extract bass, mid and peak energy from raw bin bytes.
///
/// Formula:
/// - bass = mean(bass band) / 255
/// - mid = mean(mid band) / 255
/// - peak = (max(peak band) / 255)^peak_exponent
pub fn band_energies(bins: &[u8], tuning: &ReactiveTuning) -> BandEnergies {
    let len = bins.len();
    let bass = band_mean(bins, tuning.bass_band.bins(len));
    let mid = band_mean(bins, tuning.mid_band.bins(len));

    let loudest = bins[tuning.peak_band.bins(len)]
        .iter()
        .copied()
        .max()
        .unwrap_or(0);
    let peak = (loudest as f32 / 255.0).powf(tuning.peak_exponent);

    BandEnergies { bass, mid, peak }
}

/// Exponential moving average step
///
/// Formula: current + (target - current) * blend
#[inline]
pub fn ema(current: f32, target: f32, blend: f32) -> f32 {
    current + (target - current) * blend
}

/// Decaying peak tracker with a relative threshold
#[derive(Debug, Clone, Default)]
pub struct BeatDetector {
    peak_tracker: f32,
}

impl BeatDetector {
    /// Feed this frame's bass level; returns whether it is a beat.
    ///
    /// The tracker is updated before the comparison, so a sustained level
    /// keeps firing until the tracker outgrows it.
    pub fn observe(&mut self, bass: f32, tuning: &ReactiveTuning) -> bool {
        self.peak_tracker = (self.peak_tracker * tuning.peak_decay).max(bass);
        bass > tuning.beat_floor && bass > self.peak_tracker * tuning.beat_fraction
    }

    /// Let the tracker decay without a new reading
    pub fn decay(&mut self, tuning: &ReactiveTuning) {
        self.peak_tracker *= tuning.peak_decay;
    }

    pub fn peak_tracker(&self) -> f32 {
        self.peak_tracker
    }

    pub fn reset(&mut self) {
        self.peak_tracker = 0.0;
    }
}

/// Smoothed energy plus beat state, read by the scene mapper
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergyMetrics {
    pub bass: f32,
    pub mid: f32,
    pub peak: f32,
    pub beat_active: bool,
    pub peak_tracker: f32,
}

/// Owns the smoothed metrics and the beat detector
#[derive(Debug, Clone, Default)]
pub struct EnergyTracker {
    tuning: ReactiveTuning,
    metrics: EnergyMetrics,
    beat: BeatDetector,
}

impl EnergyTracker {
    pub fn new(tuning: ReactiveTuning) -> Self {
        Self {
            tuning,
            metrics: EnergyMetrics::default(),
            beat: BeatDetector::default(),
        }
    }

    pub fn metrics(&self) -> &EnergyMetrics {
        &self.metrics
    }

    pub fn tuning(&self) -> &ReactiveTuning {
        &self.tuning
    }

    /// Fold one spectrum into the smoothed metrics
    pub fn update(&mut self, bins: &[u8]) -> &EnergyMetrics {
        let instant = band_energies(bins, &self.tuning);
        self.update_with(instant)
    }

    /// Fold precomputed band energies into the smoothed metrics.
    ///
    /// The beat is judged on the instantaneous bass; only the visuals see the
    /// smoothed value.
    pub fn update_with(&mut self, instant: BandEnergies) -> &EnergyMetrics {
        let t = &self.tuning;
        let m = &mut self.metrics;
        m.bass = ema(m.bass, instant.bass, t.bass_blend);
        m.mid = ema(m.mid, instant.mid, t.mid_blend);
        m.peak = ema(m.peak, instant.peak, t.peak_blend);
        m.beat_active = self.beat.observe(instant.bass, t);
        m.peak_tracker = self.beat.peak_tracker();
        &self.metrics
    }

    /// Idle step: relax toward silence with no beat
    pub fn relax(&mut self) -> &EnergyMetrics {
        let t = &self.tuning;
        let m = &mut self.metrics;
        m.bass = ema(m.bass, 0.0, t.bass_blend);
        m.mid = ema(m.mid, 0.0, t.mid_blend);
        m.peak = ema(m.peak, 0.0, t.peak_blend);
        m.beat_active = false;
        self.beat.decay(t);
        m.peak_tracker = self.beat.peak_tracker();
        &self.metrics
    }

    pub fn reset(&mut self) {
        self.metrics = EnergyMetrics::default();
        self.beat.reset();
    }
}
