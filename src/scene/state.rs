//! Scene state and the per-frame mapping from audio energy to visuals.

use crate::params::SceneMapping;
use crate::reactive::{ema, EnergyMetrics};

/// Grid zoom response to bass (linear and cubic terms)
const GRID_BASS_SCALE: f32 = 0.5;
const GRID_BASS_CUBIC_SCALE: f32 = 0.5;

/// Grid scroll speed (units per second at silence, extra per unit bass)
const GRID_SCROLL_BASE: f32 = 0.5;
const GRID_SCROLL_BASS: f32 = 0.8;

/// Grid roll wobble: rate (rad/s) and depth (rad at full bass)
const GRID_ROLL_RATE: f32 = 0.2;
const GRID_ROLL_DEPTH: f32 = 0.03;

/// Mountain shader time runs slower than wall time
const MOUNTAIN_TIME_SCALE: f32 = 0.2;

/// Minimum bar height (meters)
const BAR_BASE_HEIGHT: f32 = 0.05;
/// Height of a full-level bar before sensitivity (meters)
const BAR_HEIGHT_RANGE: f32 = 12.0;
/// Every Nth bar gets the beat height boost
const BAR_BEAT_STRIDE: usize = 3;
const BAR_BEAT_BOOST: f32 = 1.5;

const FRONT_EMISSIVE_BASE: f32 = 0.6;
const FRONT_EMISSIVE_GAIN: f32 = 2.5;
const FRONT_EMISSIVE_BEAT: f32 = 1.0;
const BACK_EMISSIVE_BASE: f32 = 0.6;
const BACK_EMISSIVE_GAIN: f32 = 2.0;
const BACK_EMISSIVE_BEAT: f32 = 0.5;

/// Group sway: slow yaw always, quick wobble on beats, pitch from bass
const GROUP_YAW_RATE: f32 = 0.1;
const GROUP_YAW_DEPTH: f32 = 0.1;
const GROUP_BEAT_YAW_RATE: f32 = 4.0;
const GROUP_BEAT_YAW_DEPTH: f32 = 0.05;
const GROUP_PITCH_DEPTH: f32 = 0.05;

const SCANLINE_BEAT_KEEP: f32 = 0.6;
const SCANLINE_BEAT_GAIN: f32 = 0.4;
const SCANLINE_DECAY: f32 = 0.9;
const GLITCH_BASS_THRESHOLD: f32 = 0.7;
const GLITCH_STRONG_BASE: f32 = 0.2;
const GLITCH_STRONG_RANGE: f32 = 0.3;
const GLITCH_SOFT: f32 = 0.05;
const SCANLINE_INTENSITY_BASE: f32 = 0.3;
const SCANLINE_INTENSITY_GAIN: f32 = 0.2;
const SCANLINE_DISTORTION_BASE: f32 = 0.02;
const SCANLINE_DISTORTION_BASS: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridState {
    /// Horizontal (xz) scale factor
    pub scale_xz: f32,
    /// Texture scroll offset in [0, 1)
    pub scroll: f32,
    /// Roll around the view axis (radians)
    pub roll: f32,
}

impl Default for GridState {
    fn default() -> Self {
        Self {
            scale_xz: 1.0,
            scroll: 0.0,
            roll: 0.0,
        }
    }
}

/// Uniforms for the mountain silhouette shader
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MountainUniforms {
    pub time: f32,
    pub audio_level: f32,
    pub peak_level: f32,
    pub bass_pulse: f32,
}

/// One column of the equalizer: a front bar and the one behind it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarState {
    /// Center x position (meters)
    pub x: f32,
    /// Spectrum level this frame, [0, 1]
    pub level: f32,
    pub front_height: f32,
    pub back_height: f32,
    /// Beat kick toward the viewer (meters)
    pub z_offset: f32,
    /// Beat roll (radians)
    pub roll: f32,
    pub front_emissive: f32,
    pub back_emissive: f32,
    pub front_hue: f32,
    pub back_hue: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupTransform {
    pub scale: f32,
    pub rotation_x: f32,
    pub rotation_y: f32,
}

impl Default for GroupTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rotation_x: 0.0,
            rotation_y: 0.0,
        }
    }
}

/// Uniforms for the CRT scanline overlay
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScanlineUniforms {
    pub time: f32,
    pub intensity: f32,
    pub distortion: f32,
    pub glitch: f32,
    pub beat_level: f32,
}

/// Everything the renderer needs for one frame. Plain data.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneState {
    /// Seconds since the loop started
    pub elapsed: f32,
    pub sun_scale: f32,
    /// Accent hue of the current track, [0, 1)
    pub base_hue: f32,
    pub grid: GridState,
    pub mountains: MountainUniforms,
    pub bars: Vec<BarState>,
    pub group: GroupTransform,
    pub scanlines: ScanlineUniforms,
    /// Smoothed bass, kept for the camera
    pub bass: f32,
}

impl SceneState {
    /// Resting scene with `bar_count` bars centred on x = 0
    pub fn new(bar_count: usize, mapping: &SceneMapping) -> Self {
        let pitch = mapping.bar_width + mapping.bar_spacing;
        let row_width = bar_count as f32 * pitch - mapping.bar_spacing;
        let bars = (0..bar_count)
            .map(|i| BarState {
                x: -row_width / 2.0 + i as f32 * pitch + mapping.bar_width / 2.0,
                level: 0.0,
                front_height: BAR_BASE_HEIGHT,
                back_height: BAR_BASE_HEIGHT,
                z_offset: 0.0,
                roll: 0.0,
                front_emissive: FRONT_EMISSIVE_BASE,
                back_emissive: BACK_EMISSIVE_BASE,
                front_hue: 0.0,
                back_hue: 0.0,
            })
            .collect();

        Self {
            elapsed: 0.0,
            sun_scale: 1.0,
            base_hue: 0.0,
            grid: GridState::default(),
            mountains: MountainUniforms::default(),
            bars,
            group: GroupTransform::default(),
            scanlines: ScanlineUniforms::default(),
            bass: 0.0,
        }
    }

    pub fn set_base_hue(&mut self, hue: f32) {
        self.base_hue = hue.rem_euclid(1.0);
    }

    /// Mean bar level this frame
    pub fn overall_level(&self) -> f32 {
        if self.bars.is_empty() {
            return 0.0;
        }
        self.bars.iter().map(|b| b.level).sum::<f32>() / self.bars.len() as f32
    }
}

/// Per-bar spectrum levels: mean of each bar's bin group, scaled to [0, 1].
///
/// Bins beyond `count * (len / count)` are ignored.
pub fn bar_levels(bins: &[u8], count: usize, out: &mut Vec<f32>) {
    out.clear();
    if count == 0 {
        return;
    }
    let group = bins.len() / count;
    if group == 0 {
        out.resize(count, 0.0);
        return;
    }
    out.extend(bins.chunks_exact(group).take(count).map(|chunk| {
        chunk.iter().map(|&b| b as f32).sum::<f32>() / (group as f32 * 255.0)
    }));
}

/// Deterministic pseudo-random value in [0, 1) for a time stamp
fn glitch_noise(t: f32) -> f32 {
    let x = (t * 12.9898).sin() * 43758.547;
    x - x.floor()
}

/// Maps energy metrics onto the scene, one frame at a time
#[derive(Debug, Clone, Default)]
pub struct SceneMapper {
    mapping: SceneMapping,
}

impl SceneMapper {
    pub fn new(mapping: SceneMapping) -> Self {
        Self { mapping }
    }

    pub fn mapping(&self) -> &SceneMapping {
        &self.mapping
    }

    /// Advance `scene` to `time_s`.
    ///
    /// Deterministic: the same previous state, metrics, levels and time
    /// always give the same result.
    pub fn advance(
        &self,
        scene: &mut SceneState,
        metrics: &EnergyMetrics,
        levels: &[f32],
        time_s: f32,
    ) {
        let m = &self.mapping;
        let t = time_s;
        let bass = metrics.bass;
        let beat = metrics.beat_active;

        scene.elapsed = t;
        scene.bass = bass;
        scene.sun_scale = 1.0 + (t * m.breath_rate).sin() * m.breath_depth;

        scene.grid = GridState {
            scale_xz: (1.0 + bass * GRID_BASS_SCALE)
                * (1.0 + bass.powi(3) * GRID_BASS_CUBIC_SCALE),
            scroll: (t * (GRID_SCROLL_BASE + bass * GRID_SCROLL_BASS)).rem_euclid(1.0),
            roll: (t * GRID_ROLL_RATE).sin() * GRID_ROLL_DEPTH * bass,
        };

        scene.mountains = MountainUniforms {
            time: t * MOUNTAIN_TIME_SCALE,
            audio_level: metrics.mid,
            peak_level: metrics.peak,
            bass_pulse: bass,
        };

        self.advance_bars(scene, levels, beat, t);

        let group = &mut scene.group;
        group.scale = if beat {
            m.beat_pulse_scale
        } else {
            ema(group.scale, 1.0, m.transient_blend)
        };
        let beat_yaw = if beat {
            (t * GROUP_BEAT_YAW_RATE).sin() * GROUP_BEAT_YAW_DEPTH
        } else {
            0.0
        };
        group.rotation_y = (t * GROUP_YAW_RATE).sin() * GROUP_YAW_DEPTH + beat_yaw;
        group.rotation_x = bass * GROUP_PITCH_DEPTH;

        let overall = scene.overall_level();
        let lines = &mut scene.scanlines;
        lines.time = t;
        if beat {
            lines.beat_level = lines.beat_level * SCANLINE_BEAT_KEEP + SCANLINE_BEAT_GAIN;
            lines.glitch = if bass > GLITCH_BASS_THRESHOLD {
                GLITCH_STRONG_BASE + GLITCH_STRONG_RANGE * glitch_noise(t)
            } else {
                GLITCH_SOFT
            };
        } else {
            lines.beat_level *= SCANLINE_DECAY;
            lines.glitch *= SCANLINE_DECAY;
        }
        lines.intensity = SCANLINE_INTENSITY_BASE + overall * SCANLINE_INTENSITY_GAIN;
        lines.distortion = SCANLINE_DISTORTION_BASE + bass * SCANLINE_DISTORTION_BASS;
    }

    fn advance_bars(&self, scene: &mut SceneState, levels: &[f32], beat: bool, t: f32) {
        let m = &self.mapping;
        let count = scene.bars.len();
        let base_hue = scene.base_hue;

        for (i, bar) in scene.bars.iter_mut().enumerate() {
            let level = levels.get(i).copied().unwrap_or(0.0).clamp(0.0, 1.0);
            bar.level = level;

            let boost = if beat && i % BAR_BEAT_STRIDE == 0 {
                BAR_BEAT_BOOST
            } else {
                1.0
            };
            let target = BAR_BASE_HEIGHT + level.sqrt() * m.bar_sensitivity * BAR_HEIGHT_RANGE * boost;
            bar.front_height = ema(bar.front_height, target, m.front_bar_blend);
            bar.back_height = ema(bar.back_height, target * m.back_bar_ratio, m.back_bar_blend);

            let (front_kick, back_kick) = if beat {
                (FRONT_EMISSIVE_BEAT, BACK_EMISSIVE_BEAT)
            } else {
                (0.0, 0.0)
            };
            bar.front_emissive = FRONT_EMISSIVE_BASE + level * FRONT_EMISSIVE_GAIN + front_kick;
            bar.back_emissive = BACK_EMISSIVE_BASE + level * BACK_EMISSIVE_GAIN + back_kick;

            let spread = i as f32 / count as f32 * m.hue_spread;
            bar.front_hue = (base_hue + spread + t * m.hue_speed).rem_euclid(1.0);
            bar.back_hue = (bar.front_hue + m.back_row_hue_offset).rem_euclid(1.0);

            if beat && i % 2 == 0 {
                bar.z_offset = m.beat_z_kick;
            } else {
                bar.z_offset = ema(bar.z_offset, 0.0, m.transient_blend);
            }
            if beat {
                // Neighbours lean opposite ways
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                bar.roll = sign * m.beat_roll_kick * level;
            } else {
                bar.roll = ema(bar.roll, 0.0, m.transient_blend);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn metrics(bass: f32, beat: bool) -> EnergyMetrics {
        EnergyMetrics {
            bass,
            mid: bass,
            peak: bass,
            beat_active: beat,
            peak_tracker: bass,
        }
    }

    fn scene() -> (SceneMapper, SceneState) {
        let mapping = SceneMapping::default();
        let scene = SceneState::new(16, &mapping);
        (SceneMapper::new(mapping), scene)
    }

    #[test]
    fn test_bar_positions_are_centred() {
        let (_, scene) = scene();
        let first = scene.bars.first().unwrap().x;
        let last = scene.bars.last().unwrap().x;
        assert!((first + last).abs() < 1e-5);
        assert!((scene.bars[1].x - scene.bars[0].x - 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_bar_levels_group_means() {
        let mut bins = vec![0u8; 256];
        bins[..16].fill(255);
        let mut out = Vec::new();
        bar_levels(&bins, 16, &mut out);

        assert_eq!(out.len(), 16);
        assert_eq!(out[0], 1.0);
        assert!(out[1..].iter().all(|&l| l == 0.0));
    }

    #[test]
    fn test_bar_levels_short_spectrum() {
        let mut out = vec![0.5; 3];
        bar_levels(&[255, 255], 4, &mut out);
        assert_eq!(out, vec![0.0; 4]);
    }

    #[test]
    fn test_silence_at_time_zero() {
        let (mapper, mut scene) = scene();
        mapper.advance(&mut scene, &EnergyMetrics::default(), &[], 0.0);

        assert_eq!(scene.sun_scale, 1.0);
        assert_eq!(scene.grid, GridState::default());
        assert_eq!(scene.group.scale, 1.0);
        assert!((scene.scanlines.intensity - 0.3).abs() < 1e-6);
        assert!((scene.scanlines.distortion - 0.02).abs() < 1e-6);
    }

    #[test]
    fn test_grid_scales_with_bass() {
        let (mapper, mut scene) = scene();
        mapper.advance(&mut scene, &metrics(1.0, false), &[], 0.0);
        assert!((scene.grid.scale_xz - 2.25).abs() < 1e-6);
    }

    #[test]
    fn test_sun_breathes() {
        let (mapper, mut scene) = scene();
        let t = PI; // sin(t * 0.5) = 1
        mapper.advance(&mut scene, &EnergyMetrics::default(), &[], t);
        assert!((scene.sun_scale - 1.1).abs() < 1e-5);
    }

    #[test]
    fn test_beat_pulse_then_relax() {
        let (mapper, mut scene) = scene();
        mapper.advance(&mut scene, &metrics(0.5, true), &[], 0.0);
        assert_eq!(scene.group.scale, 1.05);

        mapper.advance(&mut scene, &metrics(0.5, false), &[], 0.016);
        assert!((scene.group.scale - 1.04).abs() < 1e-5);
    }

    #[test]
    fn test_beat_kicks_even_bars() {
        let (mapper, mut scene) = scene();
        let levels = vec![0.5; 16];
        mapper.advance(&mut scene, &metrics(0.5, true), &levels, 0.0);

        assert_eq!(scene.bars[0].z_offset, 0.3);
        assert_eq!(scene.bars[1].z_offset, 0.0);
        assert!((scene.bars[0].roll - 0.05).abs() < 1e-6);
        assert!((scene.bars[1].roll + 0.05).abs() < 1e-6);
        assert!((scene.bars[0].front_emissive - (0.6 + 1.25 + 1.0)).abs() < 1e-5);
        assert!((scene.bars[0].back_emissive - (0.6 + 1.0 + 0.5)).abs() < 1e-5);

        mapper.advance(&mut scene, &metrics(0.5, false), &levels, 0.016);
        assert!((scene.bars[0].z_offset - 0.24).abs() < 1e-5);
    }

    #[test]
    fn test_heights_converge_to_target() {
        let (mapper, mut scene) = scene();
        let levels = vec![0.25; 16];
        for frame in 0..200 {
            mapper.advance(&mut scene, &metrics(0.2, false), &levels, frame as f32 / 60.0);
        }
        // 0.05 + sqrt(0.25) * 12
        let target = 6.05;
        assert!((scene.bars[4].front_height - target).abs() < 1e-3);
        assert!((scene.bars[4].back_height - target * 0.7).abs() < 1e-3);
    }

    #[test]
    fn test_beat_boosts_every_third_bar() {
        let (mapper, mut a) = scene();
        let mut b = a.clone();
        let levels = vec![1.0; 16];
        mapper.advance(&mut a, &metrics(0.5, true), &levels, 0.0);
        mapper.advance(&mut b, &metrics(0.5, false), &levels, 0.0);

        assert!(a.bars[0].front_height > b.bars[0].front_height);
        assert_eq!(a.bars[1].front_height, b.bars[1].front_height);
        assert!(a.bars[3].front_height > b.bars[3].front_height);
    }

    #[test]
    fn test_hues_wrap() {
        let (mapper, mut scene) = scene();
        scene.set_base_hue(0.95);
        mapper.advance(&mut scene, &EnergyMetrics::default(), &[], 100.0);
        for bar in &scene.bars {
            assert!((0.0..1.0).contains(&bar.front_hue));
            assert!((0.0..1.0).contains(&bar.back_hue));
        }
    }

    #[test]
    fn test_glitch_on_strong_beat() {
        let (mapper, mut scene) = scene();
        mapper.advance(&mut scene, &metrics(0.9, true), &[], 1.234);
        assert!((0.2..=0.5).contains(&scene.scanlines.glitch));
        assert!((scene.scanlines.beat_level - 0.4).abs() < 1e-6);

        let glitch = scene.scanlines.glitch;
        mapper.advance(&mut scene, &metrics(0.9, false), &[], 1.25);
        assert!((scene.scanlines.glitch - glitch * 0.9).abs() < 1e-6);

        mapper.advance(&mut scene, &metrics(0.5, true), &[], 1.3);
        assert_eq!(scene.scanlines.glitch, 0.05);
    }

    #[test]
    fn test_advance_is_deterministic() {
        let (mapper, mut a) = scene();
        let mut b = a.clone();
        let levels: Vec<f32> = (0..16).map(|i| i as f32 / 16.0).collect();
        for frame in 0..30 {
            let m = metrics(0.8, frame % 7 == 0);
            let t = frame as f32 / 60.0;
            mapper.advance(&mut a, &m, &levels, t);
            mapper.advance(&mut b, &m, &levels, t);
        }
        assert_eq!(a, b);
    }
}
