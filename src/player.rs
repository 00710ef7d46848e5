//! Playback controls over a playlist.

use tracing::info;

use crate::audio::{AudioBackend, AudioSource, PlaybackState, SignalAnalyzer};
use crate::error::PlaybackError;
use crate::playlist::{Playlist, Track};

/// Seconds skipped by one seek step
pub const SEEK_STEP_SECS: f64 = 10.0;

/// Volume change per key press
pub const VOLUME_STEP: f32 = 0.1;

/// Playlist-aware player. Track changes keep the play/pause intent.
pub struct Player<B: AudioBackend> {
    analyzer: SignalAnalyzer<B>,
    playlist: Playlist,
    current: usize,
}

impl<B: AudioBackend> Player<B> {
    pub fn new(analyzer: SignalAnalyzer<B>, playlist: Playlist) -> Self {
        Self {
            analyzer,
            playlist,
            current: 0,
        }
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.playlist.get(self.current)
    }

    pub fn state(&self) -> PlaybackState {
        self.analyzer.state()
    }

    pub fn volume(&self) -> f32 {
        self.analyzer.volume()
    }

    pub fn position_secs(&self) -> f64 {
        self.analyzer.position_secs()
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.analyzer.duration_secs()
    }

    pub fn analyzer(&self) -> &SignalAnalyzer<B> {
        &self.analyzer
    }

    /// The audio source the reactive loop polls
    pub fn source_mut(&mut self) -> &mut SignalAnalyzer<B> {
        &mut self.analyzer
    }

    /// Play the current track, resuming if it is already loaded
    pub fn play(&mut self) -> Result<(), PlaybackError> {
        let src = self
            .current_track()
            .map(|t| t.src.clone())
            .ok_or(PlaybackError::NoSource)?;
        if self.analyzer.current_source() == Some(src.as_str()) {
            self.analyzer.resume()
        } else {
            self.analyzer.start(&src)
        }
    }

    pub fn pause(&mut self) -> Result<(), PlaybackError> {
        self.analyzer.pause()
    }

    pub fn toggle(&mut self) -> Result<(), PlaybackError> {
        if self.state() == PlaybackState::Playing {
            self.pause()
        } else {
            self.play()
        }
    }

    pub fn next(&mut self) -> Result<(), PlaybackError> {
        self.change_track(self.playlist.next_index(self.current))
    }

    pub fn previous(&mut self) -> Result<(), PlaybackError> {
        self.change_track(self.playlist.prev_index(self.current))
    }

    /// Jump to the track with `id`. Returns false if there is no such track.
    pub fn select(&mut self, id: &str) -> Result<bool, PlaybackError> {
        match self.playlist.find(id) {
            Some(index) => self.change_track(index).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.analyzer.set_volume(volume);
    }

    /// Seek within the current track, clamped to [0, duration]
    pub fn seek(&mut self, seconds: f64) -> Result<(), PlaybackError> {
        self.analyzer.seek(seconds)
    }

    /// Seek relative to the current position
    pub fn seek_by(&mut self, delta_secs: f64) -> Result<(), PlaybackError> {
        let target = self.position_secs() + delta_secs;
        self.seek(target)
    }

    /// Per-frame housekeeping: advance when the current track has ended.
    ///
    /// Returns true if the track changed.
    pub fn tick(&mut self) -> Result<bool, PlaybackError> {
        if self.state() == PlaybackState::Playing && self.analyzer.has_ended() {
            info!("Track ended, advancing");
            self.next()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn change_track(&mut self, index: usize) -> Result<(), PlaybackError> {
        let track = self.playlist.get(index).ok_or(PlaybackError::NoSource)?;
        let src = track.src.clone();
        info!("Track {}: {}", index + 1, track.label());
        self.current = index;
        self.analyzer.switch_source(&src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock::MockBackend;
    use crate::params::AnalyserConfig;

    fn player() -> Player<MockBackend> {
        let analyzer = SignalAnalyzer::new(MockBackend::default(), AnalyserConfig::default());
        Player::new(analyzer, Playlist::default_tracks())
    }

    fn playing_src(player: &Player<MockBackend>) -> Option<String> {
        player.analyzer().backend().last_url()
    }

    #[test]
    fn test_play_starts_first_track() {
        let mut player = player();
        player.play().unwrap();

        assert_eq!(player.state(), PlaybackState::Playing);
        assert_eq!(
            playing_src(&player).as_deref(),
            Some("audio/music/ES_Light of You - Swif7.mp3")
        );
    }

    #[test]
    fn test_toggle_pauses_and_resumes_same_chain() {
        let mut player = player();
        player.toggle().unwrap();
        player.toggle().unwrap();
        assert_eq!(player.state(), PlaybackState::Paused);

        player.toggle().unwrap();
        assert_eq!(player.state(), PlaybackState::Playing);
        assert_eq!(player.analyzer().backend().connects(), 1);
    }

    #[test]
    fn test_next_and_previous_wrap() {
        let mut player = player();
        player.previous().unwrap();
        assert_eq!(player.current_index(), 4);

        player.next().unwrap();
        assert_eq!(player.current_index(), 0);
    }

    #[test]
    fn test_track_change_keeps_playing() {
        let mut player = player();
        player.play().unwrap();
        player.next().unwrap();

        assert_eq!(player.state(), PlaybackState::Playing);
        assert_eq!(player.current_track().unwrap().id, "dont-want-it");
        assert_eq!(
            playing_src(&player).as_deref(),
            Some("audio/music/ES_Don't Want It - Hallman.mp3")
        );
        assert_eq!(player.analyzer().backend().live_chains(), 1);
    }

    #[test]
    fn test_track_change_while_paused_stays_silent() {
        let mut player = player();
        player.play().unwrap();
        player.pause().unwrap();
        player.next().unwrap();

        assert_ne!(player.state(), PlaybackState::Playing);
        assert_eq!(player.analyzer().backend().connects(), 1);

        player.play().unwrap();
        assert_eq!(player.current_track().unwrap().id, "dont-want-it");
        assert_eq!(player.analyzer().backend().connects(), 2);
    }

    #[test]
    fn test_select_by_id() {
        let mut player = player();
        assert!(player.select("wish-you-well").unwrap());
        assert_eq!(player.current_index(), 4);
        assert!(!player.select("nope").unwrap());
        assert_eq!(player.current_index(), 4);
    }

    #[test]
    fn test_tick_advances_after_end() {
        let mut player = player();
        player.play().unwrap();
        assert!(!player.tick().unwrap());

        player.analyzer().backend().finish_track();
        assert!(player.tick().unwrap());
        assert_eq!(player.current_index(), 1);
        assert_eq!(player.state(), PlaybackState::Playing);
        assert!(!player.tick().unwrap());
    }

    #[test]
    fn test_seek_by_clamps() {
        let mut player = player();
        player.play().unwrap();
        player.seek_by(-SEEK_STEP_SECS).unwrap();
        assert_eq!(player.position_secs(), 0.0);

        player.seek(115.0).unwrap();
        player.seek_by(SEEK_STEP_SECS).unwrap();
        assert_eq!(player.position_secs(), 120.0);
    }

    #[test]
    fn test_seek_without_track_fails() {
        let mut player = player();
        assert!(matches!(player.seek(5.0), Err(PlaybackError::NoSource)));
    }

    #[test]
    fn test_volume_is_remembered_across_tracks() {
        let mut player = player();
        player.set_volume(0.3);
        player.play().unwrap();
        player.next().unwrap();
        assert_eq!(player.analyzer().backend().last_volume(), Some(0.3));
    }
}
