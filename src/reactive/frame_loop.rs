//! Per-frame driver: poll, measure, map.

use tracing::{info, trace};

use super::energy::{EnergyMetrics, EnergyTracker};
use crate::audio::{AudioSource, PlaybackState};
use crate::params::{ReactiveTuning, SceneMapping};
use crate::scene::{bar_levels, SceneMapper, SceneState};

/// Whether the loop is driven by audio or by time alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    Active,
}

/// What one call to [`ReactiveLoop::frame`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Time-driven animation, no audio
    Idle,
    /// Scene advanced from a fresh spectrum
    Active { beat: bool },
    /// Poll failed while active; previous frame kept as-is
    Held,
}

/// Owns the energy tracker and the scene, advanced once per display frame
pub struct ReactiveLoop {
    phase: LoopPhase,
    tracker: EnergyTracker,
    mapper: SceneMapper,
    scene: SceneState,
    /// Per-bar levels, reused every frame
    levels: Vec<f32>,
    held_frames: u64,
}

impl ReactiveLoop {
    /// Loop for spectra of `bin_count` bins
    pub fn new(tuning: ReactiveTuning, mapping: SceneMapping, bin_count: usize) -> Self {
        let bar_count = mapping.bar_count(bin_count);
        let scene = SceneState::new(bar_count, &mapping);
        Self {
            phase: LoopPhase::Idle,
            tracker: EnergyTracker::new(tuning),
            mapper: SceneMapper::new(mapping),
            scene,
            levels: vec![0.0; bar_count],
            held_frames: 0,
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn metrics(&self) -> &EnergyMetrics {
        self.tracker.metrics()
    }

    pub fn scene(&self) -> &SceneState {
        &self.scene
    }

    /// Frames held because a poll failed while active
    pub fn held_frames(&self) -> u64 {
        self.held_frames
    }

    /// Tint the scene with a track's accent hue
    pub fn set_base_hue(&mut self, hue: f32) {
        self.scene.set_base_hue(hue);
    }

    /// Run one frame at `time_s` seconds since start
    pub fn frame(&mut self, source: &mut dyn AudioSource, time_s: f32) -> FrameOutcome {
        if source.state() != PlaybackState::Playing {
            self.enter(LoopPhase::Idle);
            self.idle_step(time_s);
            return FrameOutcome::Idle;
        }

        match source.poll_spectrum() {
            Ok(frame) => {
                let bins = frame.bins();
                self.tracker.update(bins);
                bar_levels(bins, self.scene.bars.len(), &mut self.levels);
                self.enter(LoopPhase::Active);

                let metrics = *self.tracker.metrics();
                self.mapper
                    .advance(&mut self.scene, &metrics, &self.levels, time_s);
                FrameOutcome::Active {
                    beat: metrics.beat_active,
                }
            }
            Err(e) => match self.phase {
                LoopPhase::Active => {
                    self.held_frames += 1;
                    trace!("Holding frame {}: {}", self.held_frames, e);
                    FrameOutcome::Held
                }
                LoopPhase::Idle => {
                    // Chain still warming up
                    self.idle_step(time_s);
                    FrameOutcome::Idle
                }
            },
        }
    }

    fn idle_step(&mut self, time_s: f32) {
        let metrics = *self.tracker.relax();
        self.levels.fill(0.0);
        self.mapper
            .advance(&mut self.scene, &metrics, &self.levels, time_s);
    }

    fn enter(&mut self, phase: LoopPhase) {
        if self.phase != phase {
            info!("Reactive loop {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }
}
