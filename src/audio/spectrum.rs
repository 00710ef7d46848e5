//! Fixed-size byte spectrum shared between analysis and the render loop.

use crate::params::AnalyserConfig;

/// Largest value a bin can hold
pub const MAX_MAGNITUDE: u8 = u8::MAX;

/// One magnitude byte per frequency bin, 0 Hz to Nyquist.
///
/// Allocated once and refreshed in place on every poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpectrumFrame {
    bins: Vec<u8>,
}

impl SpectrumFrame {
    /// Zeroed frame with `bin_count` bins
    pub fn new(bin_count: usize) -> Self {
        Self {
            bins: vec![0; bin_count],
        }
    }

    #[cfg(test)]
    pub(crate) fn from_bins(bins: Vec<u8>) -> Self {
        Self { bins }
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn bins(&self) -> &[u8] {
        &self.bins
    }

    pub fn bins_mut(&mut self) -> &mut [u8] {
        &mut self.bins
    }

    /// Zero every bin without reallocating
    pub fn clear(&mut self) {
        self.bins.fill(0);
    }

    /// Apply the shaping curve and low-bin boost in place.
    ///
    /// Formula: v' = min(255, (v / 255)^curve * 255 * boost)
    pub fn shape(&mut self, config: &AnalyserConfig) {
        if config.shaping_is_identity() {
            return;
        }
        let max = MAX_MAGNITUDE as f32;
        for (i, bin) in self.bins.iter_mut().enumerate() {
            let boost = if i < config.low_boost_bins {
                config.low_boost
            } else {
                1.0
            };
            let value = (*bin as f32 / max).powf(config.spectrum_curve) * max * boost;
            *bin = value.min(max) as u8;
        }
    }
}
