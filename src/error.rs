//! Error types for pulsewave.
//!
//! Only [`PlaybackError`] crosses from the audio layer to the controls
//! surface. [`PollError`] and [`TeardownError`] are absorbed where they occur.

use std::path::PathBuf;

use thiserror::Error;

/// Decode, play, resume or seek failure. The session is `Stopped` whenever
/// one of these is returned.
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("no audio source selected")]
    NoSource,

    #[error("cannot open {url}: {error}")]
    Unreachable {
        url: String,
        #[source]
        error: std::io::Error,
    },

    #[error("unsupported source scheme in {0} (only local files are played)")]
    UnsupportedScheme(String),

    #[error("cannot decode {url}: {reason}")]
    Undecodable { url: String, reason: String },

    #[error("no audio output device available")]
    NoOutputDevice,

    #[error("output device refused playback: {0}")]
    Rejected(String),

    #[error("seek failed: {0}")]
    Seek(String),
}

/// A single failed or empty spectrum read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("no signal chain connected")]
    NotConnected,

    #[error("no analysis data yet")]
    NoData,

    #[error("spectrum size mismatch: expected {expected} bins, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("analysis tap unavailable")]
    TapUnavailable,
}

/// Failure while disconnecting a signal chain. Logged and swallowed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TeardownError {
    #[error("signal chain already closed")]
    AlreadyClosed,

    #[error("decoder thread panicked")]
    DecoderPanicked,
}

/// Mid-stream failure on the decoder thread. Ends or skips within the track.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("cannot read packet: {0}")]
    Packet(#[source] symphonia::core::errors::Error),

    #[error("cannot seek to {seconds:.1}s: {source}")]
    Seek {
        seconds: f64,
        #[source]
        source: symphonia::core::errors::Error,
    },
}

/// Unreadable or invalid configuration / track list.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// GPU setup failure. Fatal at startup.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("no suitable GPU adapter found")]
    NoAdapter,

    #[error("failed to request device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("surface reports no supported formats")]
    NoSurfaceFormat,
}
