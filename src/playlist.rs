//! Track metadata and the ordered playlist.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::scene::hex_to_hue;

/// Static metadata for one track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    /// Local path or `file://` URL
    pub src: String,
    /// Accent colour, `#rrggbb`
    pub color: String,
}

impl Track {
    pub fn new(id: &str, title: &str, artist: &str, src: &str, color: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            src: src.to_string(),
            color: color.to_string(),
        }
    }

    /// Hue of the accent colour, if it parses
    pub fn hue(&self) -> Option<f32> {
        hex_to_hue(&self.color)
    }

    /// "Title - Artist"
    pub fn label(&self) -> String {
        format!("{} - {}", self.title, self.artist)
    }
}

/// Ordered list of tracks. Serialises as a bare JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Playlist {
    tracks: Vec<Track>,
}

impl Playlist {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }

    /// Built-in track list
    pub fn default_tracks() -> Self {
        Self::new(vec![
            Track::new(
                "light-of-you",
                "Light of You",
                "Swif7",
                "audio/music/ES_Light of You - Swif7.mp3",
                "#00aaff",
            ),
            Track::new(
                "dont-want-it",
                "Don't Want It",
                "Hallman",
                "audio/music/ES_Don't Want It - Hallman.mp3",
                "#a855f7",
            ),
            Track::new(
                "look-to-the-future",
                "Look to the Future",
                "Purple Dive",
                "audio/music/ES_Look to the Future - Purple Dive.mp3",
                "#10b981",
            ),
            Track::new(
                "taint",
                "Taint",
                "Hampus Naeselius",
                "audio/music/ES_Taint - Hampus Naeselius.mp3",
                "#ec4899",
            ),
            Track::new(
                "wish-you-well",
                "Wish You Well",
                "Purple Dive",
                "audio/music/ES_Wish You Well - Purple Dive.mp3",
                "#f97316",
            ),
        ])
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let playlist: Self = serde_json::from_str(text)?;
        if playlist.is_empty() {
            return Err(ConfigError::Invalid("track list is empty".into()));
        }
        Ok(playlist)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a JSON track list from disk
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Index of the track with `id`
    pub fn find(&self, id: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == id)
    }

    /// Following index, wrapping to the start
    pub fn next_index(&self, index: usize) -> usize {
        if self.tracks.is_empty() {
            return 0;
        }
        (index + 1) % self.tracks.len()
    }

    /// Preceding index, wrapping to the end
    pub fn prev_index(&self, index: usize) -> usize {
        if self.tracks.is_empty() {
            return 0;
        }
        (index + self.tracks.len() - 1) % self.tracks.len()
    }
}
