//! Command-line argument parsing.

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::info;

use crate::audio::DEFAULT_VOLUME;
use crate::error::ConfigError;
use crate::params::VisualizerConfig;
use crate::playlist::{Playlist, Track};

/// Accent colour for a file given with `--source`
const SINGLE_SOURCE_COLOR: &str = "#00aaff";

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "pulsewave")]
#[command(about = "Audio-reactive synthwave visualizer", long_about = None)]
pub struct Args {
    /// TOML configuration file (every section optional)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// JSON track list to use instead of the built-in one
    #[arg(long, value_name = "PATH")]
    pub tracks: Option<PathBuf>,

    /// Start with the track that has this id
    #[arg(long, value_name = "ID")]
    pub track: Option<String>,

    /// Play a single local file instead of a track list
    #[arg(long, value_name = "PATH", conflicts_with = "tracks")]
    pub source: Option<String>,

    /// Initial volume, 0.0 to 1.0
    #[arg(long, value_name = "LEVEL", default_value_t = DEFAULT_VOLUME)]
    pub volume: f32,

    /// Start playing immediately
    #[arg(long)]
    pub autoplay: bool,

    /// Run without a window for this many seconds, logging energy readings
    #[arg(long, value_name = "SECONDS")]
    pub headless: Option<f32>,

    /// Default log filter (RUST_LOG takes precedence)
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Load the configuration file, or defaults when none is given
    pub fn load_config(&self) -> Result<VisualizerConfig, ConfigError> {
        match &self.config {
            Some(path) => {
                let config = VisualizerConfig::load(path)?;
                info!("Config: {}", path.display());
                Ok(config)
            }
            None => Ok(VisualizerConfig::default()),
        }
    }

    /// Build the playlist from `--source`, `--tracks` or the built-in list
    pub fn load_playlist(&self) -> Result<Playlist, ConfigError> {
        if let Some(src) = &self.source {
            return Ok(Playlist::new(vec![single_track(src)]));
        }
        match &self.tracks {
            Some(path) => {
                let playlist = Playlist::load(path)?;
                info!("Tracks: {} from {}", playlist.len(), path.display());
                Ok(playlist)
            }
            None => Ok(Playlist::default_tracks()),
        }
    }
}

/// Track entry for a bare file path
fn single_track(src: &str) -> Track {
    let path = Path::new(src.strip_prefix("file://").unwrap_or(src));
    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| src.to_string());
    Track::new("source", &title, "", src, SINGLE_SOURCE_COLOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["pulsewave"]).unwrap();
        assert_eq!(args.volume, 0.7);
        assert_eq!(args.log_level, "info");
        assert!(!args.autoplay);
        assert!(args.headless.is_none());
        assert_eq!(args.load_playlist().unwrap(), Playlist::default_tracks());
        assert_eq!(args.load_config().unwrap(), VisualizerConfig::default());
    }

    #[test]
    fn test_single_source_playlist() {
        let args =
            Args::try_parse_from(["pulsewave", "--source", "file:///music/night drive.mp3"])
                .unwrap();
        let playlist = args.load_playlist().unwrap();

        assert_eq!(playlist.len(), 1);
        let track = playlist.get(0).unwrap();
        assert_eq!(track.title, "night drive");
        assert_eq!(track.src, "file:///music/night drive.mp3");
    }

    #[test]
    fn test_source_conflicts_with_tracks() {
        assert!(Args::try_parse_from([
            "pulsewave",
            "--source",
            "a.mp3",
            "--tracks",
            "list.json"
        ])
        .is_err());
    }

    #[test]
    fn test_headless_and_flags() {
        let args = Args::try_parse_from([
            "pulsewave",
            "--headless",
            "5",
            "--autoplay",
            "--volume",
            "0.25",
            "--track",
            "taint",
        ])
        .unwrap();
        assert_eq!(args.headless, Some(5.0));
        assert!(args.autoplay);
        assert_eq!(args.volume, 0.25);
        assert_eq!(args.track.as_deref(), Some("taint"));
    }

    #[test]
    fn test_missing_config_file_is_error() {
        let args =
            Args::try_parse_from(["pulsewave", "--config", "/nonexistent/pulsewave.toml"]).unwrap();
        assert!(matches!(args.load_config(), Err(ConfigError::Io { .. })));
    }
}
