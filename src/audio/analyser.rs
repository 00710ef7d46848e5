//! Frequency analysis stage of a signal chain.
//!
//! The output callback pushes what it plays into a [`SampleTap`]; the frame
//! callback turns the newest window into byte magnitudes with [`Analyser`].
//! The byte mapping follows the browser analyser node: Blackman window,
//! magnitude / N, temporal smoothing, then dB range to 0..=255.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::{Arc, Mutex};

use super::spectrum::{SpectrumFrame, MAX_MAGNITUDE};
use crate::error::PollError;
use crate::params::AnalyserConfig;

/// Ring of the most recent mono samples sent to the output
#[derive(Debug)]
struct TapRing {
    samples: Vec<f32>,
    write_pos: usize,
    written: u64,
}

/// Shared handle to the analysis tap (cloned into the output callback)
#[derive(Debug, Clone)]
pub struct SampleTap {
    inner: Arc<Mutex<TapRing>>,
}

impl SampleTap {
    pub fn new(size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TapRing {
                samples: vec![0.0; size],
                write_pos: 0,
                written: 0,
            })),
        }
    }

    /// Mix interleaved frames down to mono and append them
    pub fn push_interleaved(&self, data: &[f32], channels: usize) {
        let channels = channels.max(1);
        let Ok(mut ring) = self.inner.lock() else {
            return;
        };
        let len = ring.samples.len();
        for frame in data.chunks_exact(channels) {
            let mono = frame.iter().sum::<f32>() / channels as f32;
            let pos = ring.write_pos;
            ring.samples[pos] = mono;
            ring.write_pos = (pos + 1) % len;
            ring.written += 1;
        }
    }

    /// Total mono samples pushed since creation or the last reset
    #[cfg(test)]
    pub(crate) fn samples_written(&self) -> u64 {
        self.inner.lock().map_or(0, |ring| ring.written)
    }

    /// Forget everything pushed so far
    pub fn reset(&self) {
        if let Ok(mut ring) = self.inner.lock() {
            ring.samples.fill(0.0);
            ring.write_pos = 0;
            ring.written = 0;
        }
    }

    /// Copy the window oldest-first into `out`
    pub(super) fn snapshot(&self, out: &mut [f32]) -> Result<(), PollError> {
        let ring = self.inner.lock().map_err(|_| PollError::TapUnavailable)?;
        if ring.written == 0 {
            return Err(PollError::NoData);
        }
        let (newer, older) = ring.samples.split_at(ring.write_pos);
        out[..older.len()].copy_from_slice(older);
        out[older.len()..].copy_from_slice(newer);
        Ok(())
    }
}

/// Blackman window (alpha = 0.16)
pub fn blackman_window(index: usize, size: usize) -> f32 {
    let a0 = 0.42;
    let a1 = 0.5;
    let a2 = 0.08;
    let x = index as f32 / size as f32;
    a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
}

/// FFT analysis node producing byte magnitudes
pub struct Analyser {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
    window: Vec<f32>,
    time_domain: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    /// Smoothed linear magnitudes, one per bin
    smoothed: Vec<f32>,
    tap: SampleTap,
}

impl Analyser {
    pub fn new(config: &AnalyserConfig) -> Self {
        let fft_size = config.fft_size;
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch_len = fft.get_inplace_scratch_len();

        Self {
            fft,
            fft_size,
            smoothing: config.smoothing_time_constant,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
            window: (0..fft_size).map(|i| blackman_window(i, fft_size)).collect(),
            time_domain: vec![0.0; fft_size],
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            smoothed: vec![0.0; fft_size / 2],
            tap: SampleTap::new(fft_size),
        }
    }

    /// Handle for the output callback to feed
    pub fn tap(&self) -> SampleTap {
        self.tap.clone()
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Fill `frame` from the newest `fft_size` samples.
    ///
    /// Aggregates whatever the tap holds now, not what arrived since the last
    /// call: polling faster than the output refreshes repeats data.
    pub fn get_byte_frequency_data(&mut self, frame: &mut SpectrumFrame) -> Result<(), PollError> {
        if frame.len() != self.bin_count() {
            return Err(PollError::SizeMismatch {
                expected: self.bin_count(),
                actual: frame.len(),
            });
        }
        self.tap.snapshot(&mut self.time_domain)?;

        for ((slot, &sample), &w) in self
            .buffer
            .iter_mut()
            .zip(&self.time_domain)
            .zip(&self.window)
        {
            *slot = Complex::new(sample * w, 0.0);
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let scale = 1.0 / self.fft_size as f32;
        let range = self.max_decibels - self.min_decibels;
        let max = MAX_MAGNITUDE as f32;

        for ((smoothed, bin), out) in self
            .smoothed
            .iter_mut()
            .zip(&self.buffer)
            .zip(frame.bins_mut())
        {
            let magnitude = bin.norm() * scale;
            *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;

            *out = if *smoothed > 0.0 {
                let db = 20.0 * smoothed.log10();
                ((db - self.min_decibels) / range * max).clamp(0.0, max) as u8
            } else {
                0
            };
        }
        Ok(())
    }
}
