//! Fixed camera with a small bass-driven sway.

use glam::{Mat4, Vec3};

use crate::params::RenderConfig;
use crate::scene::SceneState;

/// Sway frequencies (radians per second) for the horizontal and vertical axes
const SWAY_RATE_X: f32 = 0.5;
const SWAY_RATE_Y: f32 = 0.3;

/// Vertical sway relative to horizontal
const SWAY_Y_RATIO: f32 = 0.5;

/// Camera looking down the bar row toward the sun
pub struct CameraSystem {
    position: Vec3,
    target: Vec3,
    /// Sway amplitude at full bass (meters)
    sway_m: f32,
}

impl CameraSystem {
    pub fn new(render_config: &RenderConfig, sway_m: f32) -> Self {
        Self {
            position: Vec3::from_array(render_config.camera_position),
            target: Vec3::from_array(render_config.camera_target),
            sway_m,
        }
    }

    /// Compute camera position and look-at target
    ///
    /// # Arguments
    /// * `time_s` - Current time in seconds
    /// * `bass` - Smoothed bass energy in [0, 1]
    ///
    /// # Returns
    /// Tuple of (eye_position, target_position)
    pub fn compute_position_and_target(&self, time_s: f32, bass: f32) -> (Vec3, Vec3) {
        let amplitude = self.sway_m * bass.clamp(0.0, 1.0);
        let sway = Vec3::new(
            (time_s * SWAY_RATE_X).sin() * amplitude,
            (time_s * SWAY_RATE_Y).cos() * amplitude * SWAY_Y_RATIO,
            0.0,
        );
        (self.position + sway, self.target)
    }

    /// Create view-projection matrix for the current scene
    ///
    /// # Returns
    /// Tuple of (view_proj_matrix, camera_position)
    pub fn create_view_proj_matrix(
        &self,
        scene: &SceneState,
        render_config: &RenderConfig,
    ) -> (Mat4, Vec3) {
        let (eye, target) = self.compute_position_and_target(scene.elapsed, scene.bass);

        // Always keep Y as up vector (camera never rolls)
        let up = Vec3::Y;

        let view = Mat4::look_at_rh(eye, target, up);
        let proj = Mat4::perspective_rh(
            render_config.fov_degrees.to_radians(),
            render_config.aspect_ratio(),
            render_config.near_plane_m,
            render_config.far_plane_m,
        );

        (proj * view, eye)
    }
}
