//! In-memory backend for exercising sessions without an audio device.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use super::session::{AudioBackend, SignalChain};
use super::spectrum::SpectrumFrame;
use crate::error::{PlaybackError, PollError, TeardownError};
use crate::params::AnalyserConfig;

/// Duration every mock track reports (seconds)
pub const MOCK_DURATION_SECS: f64 = 120.0;

#[derive(Debug, Default)]
struct MockState {
    live: usize,
    max_live: usize,
    connects: usize,
    last_url: Option<String>,
    last_volume: Option<f32>,
    spectrum: Option<Vec<u8>>,
    ended: bool,
}

/// Backend whose chains only record what was asked of them
#[derive(Default)]
pub struct MockBackend {
    state: Rc<RefCell<MockState>>,
    failing: HashSet<String>,
    reject_play: bool,
    fail_seek: bool,
}

impl MockBackend {
    /// Connecting to `url` will fail as unreachable
    pub fn fail_source(&mut self, url: &str) {
        self.failing.insert(url.to_string());
    }

    /// `play` on new chains will be rejected
    pub fn reject_play(&mut self, reject: bool) {
        self.reject_play = reject;
    }

    /// `seek` on new chains will fail as if the decoder had gone away
    pub fn fail_seek(&mut self, fail: bool) {
        self.fail_seek = fail;
    }

    /// Bytes every chain reports from `read_spectrum`
    pub fn set_spectrum(&mut self, bins: Vec<u8>) {
        self.state.borrow_mut().spectrum = Some(bins);
    }

    /// Make every live chain report end of track
    pub fn finish_track(&self) {
        self.state.borrow_mut().ended = true;
    }

    pub fn live_chains(&self) -> usize {
        self.state.borrow().live
    }

    pub fn max_live_chains(&self) -> usize {
        self.state.borrow().max_live
    }

    pub fn connects(&self) -> usize {
        self.state.borrow().connects
    }

    pub fn last_url(&self) -> Option<String> {
        self.state.borrow().last_url.clone()
    }

    pub fn last_volume(&self) -> Option<f32> {
        self.state.borrow().last_volume
    }
}

impl AudioBackend for MockBackend {
    fn connect(
        &mut self,
        url: &str,
        _config: &AnalyserConfig,
    ) -> Result<Box<dyn SignalChain>, PlaybackError> {
        if self.failing.contains(url) {
            return Err(PlaybackError::Unreachable {
                url: url.to_string(),
                error: std::io::Error::new(std::io::ErrorKind::NotFound, "mock"),
            });
        }

        let mut state = self.state.borrow_mut();
        state.live += 1;
        state.max_live = state.max_live.max(state.live);
        state.connects += 1;
        state.last_url = Some(url.to_string());
        state.ended = false;

        Ok(Box::new(MockChain {
            state: Rc::clone(&self.state),
            reject_play: self.reject_play,
            fail_seek: self.fail_seek,
            position: 0.0,
            closed: false,
        }))
    }
}

struct MockChain {
    state: Rc<RefCell<MockState>>,
    reject_play: bool,
    fail_seek: bool,
    position: f64,
    closed: bool,
}

impl SignalChain for MockChain {
    fn play(&mut self) -> Result<(), PlaybackError> {
        if self.reject_play {
            return Err(PlaybackError::Rejected("autoplay blocked".to_string()));
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PlaybackError> {
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.state.borrow_mut().last_volume = Some(volume);
    }

    fn seek(&mut self, seconds: f64) -> Result<(), PlaybackError> {
        if self.fail_seek {
            return Err(PlaybackError::Seek("decoder stopped".to_string()));
        }
        self.position = seconds;
        Ok(())
    }

    fn position_secs(&self) -> f64 {
        self.position
    }

    fn duration_secs(&self) -> Option<f64> {
        Some(MOCK_DURATION_SECS)
    }

    fn has_ended(&self) -> bool {
        self.state.borrow().ended
    }

    fn read_spectrum(&mut self, frame: &mut SpectrumFrame) -> Result<(), PollError> {
        let state = self.state.borrow();
        let bins = state.spectrum.as_ref().ok_or(PollError::NoData)?;
        if bins.len() != frame.len() {
            return Err(PollError::SizeMismatch {
                expected: frame.len(),
                actual: bins.len(),
            });
        }
        frame.bins_mut().copy_from_slice(bins);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TeardownError> {
        if self.closed {
            return Err(TeardownError::AlreadyClosed);
        }
        self.closed = true;
        self.state.borrow_mut().live -= 1;
        Ok(())
    }
}

impl Drop for MockChain {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.borrow_mut().live -= 1;
        }
    }
}
