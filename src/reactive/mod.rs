//! Reactive render loop: spectrum in, smoothed energy and scene out.
//!
//! Runs on the frame callback. Never blocks on audio and never propagates
//! poll failures; a failed poll while active holds the previous frame.

mod energy;
mod frame_loop;

// Re-export public types
pub use energy::{band_energies, ema, BandEnergies, BeatDetector, EnergyMetrics, EnergyTracker};
pub use frame_loop::{FrameOutcome, LoopPhase, ReactiveLoop};
