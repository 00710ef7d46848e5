//! Audio playback and spectrum analysis.
//!
//! A local file is decoded with symphonia, played through cpal and tapped
//! for FFT analysis. The render loop only sees the [`AudioSource`] trait.

mod analyser;
mod decoder;
#[cfg(test)]
pub(crate) mod mock;
mod output;
mod session;
mod spectrum;

// Re-export public types
pub use analyser::{blackman_window, Analyser, SampleTap};
pub use decoder::{source_path, FormatConverter, TrackDecoder};
pub use output::{CpalBackend, CpalChain};
pub use session::{
    AudioBackend, AudioSession, AudioSource, PlaybackState, SignalAnalyzer, SignalChain,
    DEFAULT_VOLUME,
};
pub use spectrum::{SpectrumFrame, MAX_MAGNITUDE};
