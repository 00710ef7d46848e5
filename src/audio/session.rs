//! Playback session and the analysis-facing audio source.
//!
//! [`SignalAnalyzer`] owns at most one live signal chain (decoder, output,
//! analyser). Starting a new source always tears down the previous chain
//! first, so two chains never coexist.

use tracing::{debug, info, warn};

use super::spectrum::SpectrumFrame;
use crate::error::{PlaybackError, PollError, TeardownError};
use crate::params::AnalyserConfig;

/// Default output gain for a new session
pub const DEFAULT_VOLUME: f32 = 0.7;

/// Playback state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Anything the reactive loop can pull spectra from
pub trait AudioSource {
    /// Begin playing `url` (replacing whatever was playing)
    fn start(&mut self, url: &str) -> Result<(), PlaybackError>;

    /// Stop and release the signal chain. Safe to call repeatedly.
    fn stop(&mut self);

    /// Output gain, clamped to [0, 1]
    fn set_volume(&mut self, volume: f32);

    /// Refresh and return the current spectrum
    fn poll_spectrum(&mut self) -> Result<&SpectrumFrame, PollError>;

    fn state(&self) -> PlaybackState;
}

/// Builds signal chains for a source URL
pub trait AudioBackend {
    fn connect(
        &mut self,
        url: &str,
        config: &AnalyserConfig,
    ) -> Result<Box<dyn SignalChain>, PlaybackError>;
}

/// One live decoder -> analyser -> output chain
pub trait SignalChain {
    fn play(&mut self) -> Result<(), PlaybackError>;
    fn pause(&mut self) -> Result<(), PlaybackError>;
    fn set_volume(&mut self, volume: f32);
    fn seek(&mut self, seconds: f64) -> Result<(), PlaybackError>;

    /// Seconds of audio sent to the output since the last seek origin
    fn position_secs(&self) -> f64;
    fn duration_secs(&self) -> Option<f64>;

    /// True once the decoder ran dry and the output drained
    fn has_ended(&self) -> bool;

    /// Fill `frame` with unshaped analyser bytes
    fn read_spectrum(&mut self, frame: &mut SpectrumFrame) -> Result<(), PollError>;

    /// Release the chain. A second call reports `AlreadyClosed`.
    fn disconnect(&mut self) -> Result<(), TeardownError>;
}

/// What is loaded and how it is playing
pub struct AudioSession {
    pub source: Option<String>,
    pub state: PlaybackState,
    pub volume: f32,
    chain: Option<Box<dyn SignalChain>>,
}

impl Default for AudioSession {
    fn default() -> Self {
        Self {
            source: None,
            state: PlaybackState::Stopped,
            volume: DEFAULT_VOLUME,
            chain: None,
        }
    }
}

impl AudioSession {
    #[cfg(test)]
    pub(crate) fn is_connected(&self) -> bool {
        self.chain.is_some()
    }
}

/// Audio source backed by a real signal chain
pub struct SignalAnalyzer<B: AudioBackend> {
    backend: B,
    config: AnalyserConfig,
    session: AudioSession,
    frame: SpectrumFrame,
}

impl<B: AudioBackend> SignalAnalyzer<B> {
    pub fn new(backend: B, config: AnalyserConfig) -> Self {
        let frame = SpectrumFrame::new(config.bin_count());
        Self {
            backend,
            config,
            session: AudioSession::default(),
            frame,
        }
    }

    pub fn session(&self) -> &AudioSession {
        &self.session
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn volume(&self) -> f32 {
        self.session.volume
    }

    pub fn current_source(&self) -> Option<&str> {
        self.session.source.as_deref()
    }

    /// Change the source, keeping the play/pause intent.
    ///
    /// Only a playing session resumes; a paused or stopped one stays silent
    /// with the new source loaded on the next `start`.
    pub fn switch_source(&mut self, url: &str) -> Result<(), PlaybackError> {
        let was_playing = self.session.state == PlaybackState::Playing;
        self.stop();
        self.session.source = Some(url.to_string());
        if was_playing {
            self.start(url)?;
        }
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), PlaybackError> {
        if self.session.state != PlaybackState::Playing {
            return Ok(());
        }
        let chain = self.session.chain.as_mut().ok_or(PlaybackError::NoSource)?;
        if let Err(e) = chain.pause() {
            self.stop();
            return Err(e);
        }
        self.session.state = PlaybackState::Paused;
        info!("Paused");
        Ok(())
    }

    /// Resume a paused chain, or start the loaded source from scratch
    pub fn resume(&mut self) -> Result<(), PlaybackError> {
        match (self.session.state, self.session.chain.as_mut()) {
            (PlaybackState::Playing, _) => Ok(()),
            (PlaybackState::Paused, Some(chain)) => {
                if let Err(e) = chain.play() {
                    self.stop();
                    return Err(e);
                }
                self.session.state = PlaybackState::Playing;
                info!("Resumed");
                Ok(())
            }
            _ => {
                let url = self.session.source.clone().ok_or(PlaybackError::NoSource)?;
                self.start(&url)
            }
        }
    }

    /// Seek within the loaded track, clamped to [0, duration].
    ///
    /// A chain that cannot seek is torn down and the session stops.
    pub fn seek(&mut self, seconds: f64) -> Result<(), PlaybackError> {
        let chain = self.session.chain.as_mut().ok_or(PlaybackError::NoSource)?;
        let target = match chain.duration_secs() {
            Some(duration) => seconds.clamp(0.0, duration),
            None => seconds.max(0.0),
        };
        if let Err(e) = chain.seek(target) {
            self.stop();
            return Err(e);
        }
        Ok(())
    }

    pub fn position_secs(&self) -> f64 {
        self.session.chain.as_ref().map_or(0.0, |c| c.position_secs())
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.session.chain.as_ref().and_then(|c| c.duration_secs())
    }

    pub fn has_ended(&self) -> bool {
        self.session.chain.as_ref().is_some_and(|c| c.has_ended())
    }

    fn teardown(&mut self) {
        if let Some(mut chain) = self.session.chain.take() {
            if let Err(e) = chain.disconnect() {
                warn!("Signal chain teardown: {}", e);
            }
            debug!("Signal chain released");
        }
    }
}

impl<B: AudioBackend> AudioSource for SignalAnalyzer<B> {
    fn start(&mut self, url: &str) -> Result<(), PlaybackError> {
        self.teardown();
        self.session.source = Some(url.to_string());
        self.frame.clear();

        let mut chain = match self.backend.connect(url, &self.config) {
            Ok(chain) => chain,
            Err(e) => {
                self.session.state = PlaybackState::Stopped;
                return Err(e);
            }
        };
        chain.set_volume(self.session.volume);

        if let Err(e) = chain.play() {
            if let Err(teardown) = chain.disconnect() {
                warn!("Signal chain teardown after failed start: {}", teardown);
            }
            self.session.state = PlaybackState::Stopped;
            return Err(e);
        }

        self.session.chain = Some(chain);
        self.session.state = PlaybackState::Playing;
        info!("Playing {}", url);
        Ok(())
    }

    fn stop(&mut self) {
        self.teardown();
        self.session.state = PlaybackState::Stopped;
        self.frame.clear();
    }

    fn set_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.session.volume = volume;
        if let Some(chain) = self.session.chain.as_mut() {
            chain.set_volume(volume);
        }
    }

    fn poll_spectrum(&mut self) -> Result<&SpectrumFrame, PollError> {
        let chain = self.session.chain.as_mut().ok_or(PollError::NotConnected)?;
        chain.read_spectrum(&mut self.frame)?;
        self.frame.shape(&self.config);
        Ok(&self.frame)
    }

    fn state(&self) -> PlaybackState {
        self.session.state
    }
}

impl<B: AudioBackend> Drop for SignalAnalyzer<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock::MockBackend;
    use proptest::prelude::*;

    fn analyzer() -> SignalAnalyzer<MockBackend> {
        SignalAnalyzer::new(MockBackend::default(), AnalyserConfig::default())
    }

    #[test]
    fn test_new_session_defaults() {
        let analyzer = analyzer();
        assert_eq!(analyzer.state(), PlaybackState::Stopped);
        assert_eq!(analyzer.volume(), DEFAULT_VOLUME);
        assert!(!analyzer.session().is_connected());
    }

    #[test]
    fn test_start_plays_with_session_volume() {
        let mut analyzer = analyzer();
        analyzer.set_volume(0.4);
        analyzer.start("a.mp3").unwrap();

        assert_eq!(analyzer.state(), PlaybackState::Playing);
        assert_eq!(analyzer.backend().last_volume(), Some(0.4));
        assert_eq!(analyzer.backend().live_chains(), 1);
    }

    #[test]
    fn test_restart_never_leaves_two_chains() {
        let mut analyzer = analyzer();
        analyzer.start("a.mp3").unwrap();
        analyzer.start("b.mp3").unwrap();
        analyzer.start("c.mp3").unwrap();

        assert_eq!(analyzer.backend().live_chains(), 1);
        assert_eq!(analyzer.backend().max_live_chains(), 1);
        assert_eq!(analyzer.session().source.as_deref(), Some("c.mp3"));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut analyzer = analyzer();
        analyzer.start("a.mp3").unwrap();
        analyzer.stop();
        analyzer.stop();

        assert_eq!(analyzer.state(), PlaybackState::Stopped);
        assert_eq!(analyzer.backend().live_chains(), 0);
        assert_eq!(analyzer.poll_spectrum().err(), Some(PollError::NotConnected));
    }

    #[test]
    fn test_failed_connect_leaves_stopped() {
        let mut backend = MockBackend::default();
        backend.fail_source("missing.mp3");
        let mut analyzer = SignalAnalyzer::new(backend, AnalyserConfig::default());

        analyzer.start("a.mp3").unwrap();
        let err = analyzer.start("missing.mp3").unwrap_err();

        assert!(matches!(err, PlaybackError::Unreachable { .. }));
        assert_eq!(analyzer.state(), PlaybackState::Stopped);
        assert_eq!(analyzer.backend().live_chains(), 0);
    }

    #[test]
    fn test_rejected_play_releases_chain() {
        let mut backend = MockBackend::default();
        backend.reject_play(true);
        let mut analyzer = SignalAnalyzer::new(backend, AnalyserConfig::default());

        let err = analyzer.start("a.mp3").unwrap_err();
        assert!(matches!(err, PlaybackError::Rejected(_)));
        assert_eq!(analyzer.state(), PlaybackState::Stopped);
        assert_eq!(analyzer.backend().live_chains(), 0);
    }

    #[test]
    fn test_switch_source_keeps_pause_intent() {
        let mut analyzer = analyzer();
        analyzer.start("a.mp3").unwrap();
        analyzer.pause().unwrap();
        analyzer.switch_source("b.mp3").unwrap();

        assert_eq!(analyzer.state(), PlaybackState::Stopped);
        assert_eq!(analyzer.session().source.as_deref(), Some("b.mp3"));
        assert_eq!(analyzer.backend().live_chains(), 0);

        analyzer.resume().unwrap();
        assert_eq!(analyzer.state(), PlaybackState::Playing);
        assert_eq!(analyzer.backend().last_url().as_deref(), Some("b.mp3"));
    }

    #[test]
    fn test_switch_source_while_playing_restarts() {
        let mut analyzer = analyzer();
        analyzer.start("a.mp3").unwrap();
        analyzer.switch_source("b.mp3").unwrap();

        assert_eq!(analyzer.state(), PlaybackState::Playing);
        assert_eq!(analyzer.backend().last_url().as_deref(), Some("b.mp3"));
        assert_eq!(analyzer.backend().live_chains(), 1);
    }

    #[test]
    fn test_pause_resume_same_chain() {
        let mut analyzer = analyzer();
        analyzer.start("a.mp3").unwrap();
        analyzer.pause().unwrap();
        assert_eq!(analyzer.state(), PlaybackState::Paused);

        analyzer.resume().unwrap();
        assert_eq!(analyzer.state(), PlaybackState::Playing);
        assert_eq!(analyzer.backend().connects(), 1);
    }

    #[test]
    fn test_resume_without_source() {
        let mut analyzer = analyzer();
        assert!(matches!(analyzer.resume(), Err(PlaybackError::NoSource)));
    }

    #[test]
    fn test_poll_shapes_spectrum() {
        let mut backend = MockBackend::default();
        backend.set_spectrum(vec![100; 256]);
        let mut analyzer = SignalAnalyzer::new(backend, AnalyserConfig::default());
        analyzer.start("a.mp3").unwrap();

        let frame = analyzer.poll_spectrum().unwrap();
        assert_eq!(frame.len(), 256);
        // Shaping lifts mid values and boosts the lowest bins further
        assert!(frame.bins()[100] > 100);
        assert!(frame.bins()[0] > frame.bins()[100]);
    }

    #[test]
    fn test_seek_is_clamped_to_duration() {
        let mut analyzer = analyzer();
        analyzer.start("a.mp3").unwrap();

        analyzer.seek(500.0).unwrap();
        assert_eq!(analyzer.position_secs(), 120.0);

        analyzer.seek(-3.0).unwrap();
        assert_eq!(analyzer.position_secs(), 0.0);
    }

    #[test]
    fn test_failed_seek_stops_session() {
        let mut backend = MockBackend::default();
        backend.fail_seek(true);
        let mut analyzer = SignalAnalyzer::new(backend, AnalyserConfig::default());
        analyzer.start("a.mp3").unwrap();

        let result = analyzer.seek(3.0);

        assert!(matches!(result, Err(PlaybackError::Seek(_))));
        assert_eq!(analyzer.state(), PlaybackState::Stopped);
        assert!(!analyzer.session().is_connected());
        assert_eq!(analyzer.backend().live_chains(), 0);
        assert_eq!(analyzer.current_source(), Some("a.mp3"));
    }

    #[test]
    fn test_volume_clamped() {
        let mut analyzer = analyzer();
        analyzer.set_volume(1.7);
        assert_eq!(analyzer.volume(), 1.0);
        analyzer.set_volume(-0.2);
        assert_eq!(analyzer.volume(), 0.0);
    }

    #[derive(Debug, Clone)]
    enum Command {
        Start(u8),
        Stop,
        Switch(u8),
        Pause,
        Resume,
    }

    fn command() -> impl Strategy<Value = Command> {
        prop_oneof![
            (0u8..4).prop_map(Command::Start),
            Just(Command::Stop),
            (0u8..4).prop_map(Command::Switch),
            Just(Command::Pause),
            Just(Command::Resume),
        ]
    }

    proptest! {
        #[test]
        fn prop_at_most_one_chain(commands in prop::collection::vec(command(), 1..40)) {
            let mut backend = MockBackend::default();
            backend.fail_source("track-3.mp3");
            let mut analyzer = SignalAnalyzer::new(backend, AnalyserConfig::default());

            for command in commands {
                let _ = match command {
                    Command::Start(n) => analyzer.start(&format!("track-{n}.mp3")),
                    Command::Stop => {
                        analyzer.stop();
                        Ok(())
                    }
                    Command::Switch(n) => analyzer.switch_source(&format!("track-{n}.mp3")),
                    Command::Pause => analyzer.pause(),
                    Command::Resume => analyzer.resume(),
                };
                prop_assert!(analyzer.backend().live_chains() <= 1);
                prop_assert_eq!(
                    analyzer.backend().live_chains() == 1,
                    analyzer.state() != PlaybackState::Stopped
                );
            }
            prop_assert!(analyzer.backend().max_live_chains() <= 1);
        }
    }
}
