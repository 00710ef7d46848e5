//! Parameter definitions with units and documented semantics.
//!
//! All magic numbers live here with:
//! - Units where they have one (meters, seconds, dB)
//! - Documented ranges and meanings
//! - A `Default` matching the tuned look, overridable from a TOML file

mod audio;
mod reactive;
mod render;
mod scene;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// Re-export all types
pub use audio::AnalyserConfig;
pub use reactive::{BandRange, ReactiveTuning};
pub use render::RenderConfig;
pub use scene::SceneMapping;

/// Complete visualizer configuration. Every section is optional in the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    pub analyser: AnalyserConfig,
    pub reactive: ReactiveTuning,
    pub scene: SceneMapping,
    pub render: RenderConfig,
}

impl VisualizerConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.analyser.validate()?;
        self.reactive.validate()?;
        self.scene.validate()?;
        Ok(())
    }
}
