//! Scene description produced by the reactive loop and read by the renderer.

mod color;
mod state;

// Re-export public types
pub use color::{hex_to_hue, hsl_to_rgb, parse_hex_color, rgb_to_hue};
pub use state::{
    bar_levels, BarState, GridState, GroupTransform, MountainUniforms, SceneMapper, SceneState,
    ScanlineUniforms,
};
