//! cpal output backend.
//!
//! Each chain runs three parts:
//! - a decoder thread converting the file to the device format
//! - the cpal callback, which applies gain and feeds the analysis tap
//! - the [`Analyser`] that the frame loop polls
//!
//! Decoded chunks travel over a bounded channel tagged with a seek
//! generation, so stale audio queued before a seek is dropped on arrival.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use crossbeam_channel::{bounded, unbounded, Receiver, SendTimeoutError, Sender, TryRecvError};
use tracing::{debug, error, info, warn};

use super::analyser::{Analyser, SampleTap};
use super::decoder::{FormatConverter, TrackDecoder};
use super::session::{AudioBackend, SignalChain};
use super::spectrum::SpectrumFrame;
use crate::error::{PlaybackError, PollError, TeardownError};
use crate::params::AnalyserConfig;

/// Decoded chunks buffered ahead of the output
const CHUNK_QUEUE_DEPTH: usize = 16;

/// How often a blocked decoder thread checks for commands
const COMMAND_POLL: Duration = Duration::from_millis(20);

enum FeedMessage {
    Chunk { generation: u64, samples: Vec<f32> },
    End { generation: u64 },
}

enum DecoderCommand {
    Seek { seconds: f64, generation: u64 },
    Stop,
}

/// State shared between the chain handle and the output callback
struct PlaybackShared {
    volume_bits: AtomicU32,
    paused: AtomicBool,
    ended: AtomicBool,
    generation: AtomicU64,
    frames_played: AtomicU64,
    /// Seconds at which frame counting restarted (f64 bits)
    origin_bits: AtomicU64,
    sample_rate: u32,
}

impl PlaybackShared {
    fn new(sample_rate: u32) -> Self {
        Self {
            volume_bits: AtomicU32::new(1.0f32.to_bits()),
            paused: AtomicBool::new(true),
            ended: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            frames_played: AtomicU64::new(0),
            origin_bits: AtomicU64::new(0.0f64.to_bits()),
            sample_rate,
        }
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    fn set_volume(&self, volume: f32) {
        self.volume_bits.store(volume.to_bits(), Ordering::Relaxed);
    }

    fn position_secs(&self) -> f64 {
        let origin = f64::from_bits(self.origin_bits.load(Ordering::Acquire));
        let frames = self.frames_played.load(Ordering::Acquire);
        origin + frames as f64 / self.sample_rate.max(1) as f64
    }

    /// Start a new seek generation at `seconds`
    fn restart_at(&self, seconds: f64) -> u64 {
        self.origin_bits.store(seconds.to_bits(), Ordering::Release);
        self.frames_played.store(0, Ordering::Release);
        self.ended.store(false, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Callback-side state: pulls decoded chunks and writes device samples
struct OutputFeed {
    chunks: Receiver<FeedMessage>,
    shared: Arc<PlaybackShared>,
    tap: SampleTap,
    channels: usize,
    current: Vec<f32>,
    cursor: usize,
    current_generation: u64,
}

impl OutputFeed {
    fn render(&mut self, out: &mut [f32]) {
        let generation = self.shared.generation.load(Ordering::Acquire);
        if generation != self.current_generation {
            self.current.clear();
            self.cursor = 0;
            self.current_generation = generation;
        }

        if self.shared.paused.load(Ordering::Relaxed) {
            out.fill(0.0);
            self.tap.push_interleaved(out, self.channels);
            return;
        }

        let volume = self.shared.volume();
        let mut written = 0;
        while written < out.len() {
            if self.cursor >= self.current.len() {
                if !self.refill(generation) {
                    break;
                }
                continue;
            }
            let n = (out.len() - written).min(self.current.len() - self.cursor);
            let source = &self.current[self.cursor..self.cursor + n];
            for (o, &s) in out[written..written + n].iter_mut().zip(source) {
                *o = s * volume;
            }
            written += n;
            self.cursor += n;
        }
        // Underrun, seek gap or end of track
        out[written..].fill(0.0);

        if written > 0 {
            let frames = (written / self.channels.max(1)) as u64;
            self.shared.frames_played.fetch_add(frames, Ordering::AcqRel);
        }
        // The analyser sees exactly what the device plays, silence included
        self.tap.push_interleaved(out, self.channels);
    }

    /// Load the next chunk of the current generation
    fn refill(&mut self, generation: u64) -> bool {
        loop {
            match self.chunks.try_recv() {
                Ok(FeedMessage::Chunk { generation: g, samples }) if g == generation => {
                    self.current = samples;
                    self.cursor = 0;
                    return true;
                }
                Ok(FeedMessage::End { generation: g }) if g == generation => {
                    self.shared.ended.store(true, Ordering::Release);
                    return false;
                }
                // Queued before the last seek
                Ok(_) => continue,
                Err(_) => return false,
            }
        }
    }
}

/// Decoder thread body
struct DecodeWorker {
    decoder: TrackDecoder,
    converter: FormatConverter,
    chunks: Sender<FeedMessage>,
    commands: Receiver<DecoderCommand>,
    out_rate: u32,
    generation: u64,
    raw: Vec<f32>,
}

impl DecodeWorker {
    fn run(mut self) {
        let mut pending: Option<FeedMessage> = None;
        loop {
            match self.commands.try_recv() {
                Ok(DecoderCommand::Stop) | Err(TryRecvError::Disconnected) => return,
                Ok(DecoderCommand::Seek { seconds, generation }) => {
                    pending = None;
                    self.seek(seconds, generation);
                    continue;
                }
                Err(TryRecvError::Empty) => {}
            }

            let message = match pending.take() {
                Some(message) => message,
                None => self.decode_next(),
            };
            let is_end = matches!(message, FeedMessage::End { .. });

            match self.chunks.send_timeout(message, COMMAND_POLL) {
                Ok(()) if is_end => {
                    // Idle until the track is sought back into or torn down
                    match self.commands.recv() {
                        Ok(DecoderCommand::Seek { seconds, generation }) => {
                            self.seek(seconds, generation)
                        }
                        Ok(DecoderCommand::Stop) | Err(_) => return,
                    }
                }
                Ok(()) => {}
                Err(SendTimeoutError::Timeout(message)) => pending = Some(message),
                Err(SendTimeoutError::Disconnected(_)) => return,
            }
        }
    }

    fn decode_next(&mut self) -> FeedMessage {
        self.raw.clear();
        match self.decoder.next_chunk(&mut self.raw) {
            Ok(true) => {
                self.converter.reconfigure(
                    self.decoder.sample_rate(),
                    self.decoder.channels(),
                    self.out_rate,
                );
                let mut samples = Vec::with_capacity(self.raw.len() * 2);
                self.converter.process(&self.raw, &mut samples);
                FeedMessage::Chunk {
                    generation: self.generation,
                    samples,
                }
            }
            Ok(false) => {
                debug!("Decoder reached end of stream");
                FeedMessage::End {
                    generation: self.generation,
                }
            }
            Err(e) => {
                error!("Decode failed, ending track: {}", e);
                FeedMessage::End {
                    generation: self.generation,
                }
            }
        }
    }

    fn seek(&mut self, seconds: f64, generation: u64) {
        self.generation = generation;
        if let Err(e) = self.decoder.seek(seconds) {
            warn!("Seek to {:.1}s failed: {}", seconds, e);
        }
        self.converter.reset();
    }
}

/// Backend playing through the default cpal output device
pub struct CpalBackend {
    host: cpal::Host,
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }
}

impl AudioBackend for CpalBackend {
    fn connect(
        &mut self,
        url: &str,
        config: &AnalyserConfig,
    ) -> Result<Box<dyn SignalChain>, PlaybackError> {
        let decoder = TrackDecoder::open(url)?;

        let device = self
            .host
            .default_output_device()
            .ok_or(PlaybackError::NoOutputDevice)?;
        let supported = device
            .default_output_config()
            .map_err(|e| PlaybackError::Rejected(format!("no usable output config: {}", e)))?;
        let sample_format = supported.sample_format();
        let stream_config: cpal::StreamConfig = supported.into();
        let out_channels = stream_config.channels as usize;
        let out_rate = stream_config.sample_rate.0;

        info!(
            "Audio: {} @ {}Hz, {} channel(s)",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            out_rate,
            out_channels
        );

        let analyser = Analyser::new(config);
        let tap = analyser.tap();
        let shared = Arc::new(PlaybackShared::new(out_rate));
        let duration = decoder.duration_secs();

        let (chunk_tx, chunk_rx) = bounded(CHUNK_QUEUE_DEPTH);
        let (command_tx, command_rx) = unbounded();

        let converter =
            FormatConverter::new(decoder.sample_rate(), decoder.channels(), out_rate, out_channels);
        let worker = DecodeWorker {
            decoder,
            converter,
            chunks: chunk_tx,
            commands: command_rx,
            out_rate,
            generation: 0,
            raw: Vec::new(),
        };
        let decoder_thread = thread::Builder::new()
            .name("pulsewave-decoder".to_string())
            .spawn(move || worker.run())
            .map_err(|e| PlaybackError::Rejected(format!("decoder thread: {}", e)))?;

        let feed = OutputFeed {
            chunks: chunk_rx,
            shared: Arc::clone(&shared),
            tap: tap.clone(),
            channels: out_channels,
            current: Vec::new(),
            cursor: 0,
            current_generation: 0,
        };

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, feed),
            SampleFormat::F64 => build_stream::<f64>(&device, &stream_config, feed),
            SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, feed),
            SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, feed),
            SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, feed),
            other => Err(PlaybackError::Rejected(format!(
                "unsupported sample format {:?}",
                other
            ))),
        };

        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                let _ = command_tx.send(DecoderCommand::Stop);
                let _ = decoder_thread.join();
                return Err(e);
            }
        };

        Ok(Box::new(CpalChain {
            url: url.to_string(),
            stream: Some(stream),
            decoder_thread: Some(decoder_thread),
            commands: command_tx,
            shared,
            analyser,
            tap,
            duration,
        }))
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut feed: OutputFeed,
) -> Result<cpal::Stream, PlaybackError>
where
    T: SizedSample + FromSample<f32>,
{
    let mut mix: Vec<f32> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                mix.resize(data.len(), 0.0);
                feed.render(&mut mix);
                for (out, &sample) in data.iter_mut().zip(&mix) {
                    *out = T::from_sample(sample);
                }
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| PlaybackError::Rejected(format!("failed to build audio stream: {}", e)))
}

/// Live chain on a cpal stream
pub struct CpalChain {
    url: String,
    stream: Option<cpal::Stream>,
    decoder_thread: Option<JoinHandle<()>>,
    commands: Sender<DecoderCommand>,
    shared: Arc<PlaybackShared>,
    analyser: Analyser,
    tap: SampleTap,
    duration: Option<f64>,
}

impl SignalChain for CpalChain {
    fn play(&mut self) -> Result<(), PlaybackError> {
        let stream = self.stream.as_ref().ok_or(PlaybackError::NoSource)?;
        self.shared.paused.store(false, Ordering::Release);
        stream
            .play()
            .map_err(|e| PlaybackError::Rejected(format!("failed to start audio stream: {}", e)))
    }

    fn pause(&mut self) -> Result<(), PlaybackError> {
        self.shared.paused.store(true, Ordering::Release);
        if let Some(stream) = &self.stream {
            // The feed already outputs silence when paused
            if let Err(e) = stream.pause() {
                debug!("Device does not support pause: {}", e);
            }
        }
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.shared.set_volume(volume);
    }

    fn seek(&mut self, seconds: f64) -> Result<(), PlaybackError> {
        let generation = self.shared.restart_at(seconds);
        self.commands
            .send(DecoderCommand::Seek {
                seconds,
                generation,
            })
            .map_err(|_| PlaybackError::Seek(format!("decoder for {} has stopped", self.url)))
    }

    fn position_secs(&self) -> f64 {
        self.shared.position_secs()
    }

    fn duration_secs(&self) -> Option<f64> {
        self.duration
    }

    fn has_ended(&self) -> bool {
        self.shared.ended.load(Ordering::Acquire)
    }

    fn read_spectrum(&mut self, frame: &mut SpectrumFrame) -> Result<(), PollError> {
        self.analyser.get_byte_frequency_data(frame)
    }

    fn disconnect(&mut self) -> Result<(), TeardownError> {
        if self.stream.is_none() && self.decoder_thread.is_none() {
            return Err(TeardownError::AlreadyClosed);
        }

        // Stop the callback before the decoder so it never reads a dead channel
        drop(self.stream.take());
        let _ = self.commands.send(DecoderCommand::Stop);
        self.tap.reset();

        if let Some(handle) = self.decoder_thread.take() {
            handle.join().map_err(|_| TeardownError::DecoderPanicked)?;
        }
        debug!("Disconnected {}", self.url);
        Ok(())
    }
}

impl Drop for CpalChain {
    fn drop(&mut self) {
        if self.stream.is_some() || self.decoder_thread.is_some() {
            if let Err(e) = self.disconnect() {
                warn!("Signal chain teardown on drop: {}", e);
            }
        }
    }
}
