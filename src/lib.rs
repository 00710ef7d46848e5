//! Pulsewave library - audio-reactive synthwave visualizer

pub mod audio;
pub mod camera;
pub mod cli;
pub mod error;
pub mod params;
pub mod player;
pub mod playlist;
pub mod reactive;
pub mod rendering;
pub mod scene;
