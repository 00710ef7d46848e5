//! File decoding (symphonia) and conversion to the output format.

use std::fs::File;
use std::path::PathBuf;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use tracing::{debug, warn};

use crate::error::{DecodeError, PlaybackError};

/// Resolve a source URL to a local path. Only bare paths and `file://` URLs
/// are accepted.
pub fn source_path(url: &str) -> Result<PathBuf, PlaybackError> {
    if let Some(path) = url.strip_prefix("file://") {
        return Ok(PathBuf::from(path));
    }
    if url.contains("://") {
        return Err(PlaybackError::UnsupportedScheme(url.to_string()));
    }
    Ok(PathBuf::from(url))
}

fn undecodable(url: &str, reason: impl ToString) -> PlaybackError {
    PlaybackError::Undecodable {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

/// Decoder for the first audio track of a file
pub struct TrackDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: usize,
    sample_rate: u32,
    duration_secs: Option<f64>,
    sample_buf: Option<SampleBuffer<f32>>,
}

impl TrackDecoder {
    /// Open and probe a local file
    pub fn open(url: &str) -> Result<Self, PlaybackError> {
        let path = source_path(url)?;
        let file = File::open(&path).map_err(|error| PlaybackError::Unreachable {
            url: url.to_string(),
            error,
        })?;
        let extension = path.extension().and_then(|e| e.to_str());
        Self::from_media(url, Box::new(file), extension)
    }

    /// Probe an arbitrary media source; `url` is only used in errors and logs
    pub fn from_media(
        url: &str,
        media: Box<dyn MediaSource>,
        extension: Option<&str>,
    ) -> Result<Self, PlaybackError> {
        let mss = MediaSourceStream::new(media, Default::default());
        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| undecodable(url, e))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| undecodable(url, "no audio track found"))?;

        let track_id = track.id;
        let params = track.codec_params.clone();
        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| undecodable(url, e))?;

        let sample_rate = params.sample_rate.unwrap_or(44100);
        let channels = params.channels.map(|c| c.count()).unwrap_or(2);
        let duration_secs = params
            .n_frames
            .map(|frames| frames as f64 / sample_rate as f64);

        debug!(
            "Decoder ready for {}: {} Hz, {} channel(s), duration {:?}",
            url, sample_rate, channels, duration_secs
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            channels,
            sample_rate,
            duration_secs,
            sample_buf: None,
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_secs
    }

    /// Decode the next packet and append its interleaved samples to `out`.
    ///
    /// Returns `Ok(false)` at end of stream.
    pub fn next_chunk(&mut self, out: &mut Vec<f32>) -> Result<bool, DecodeError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(DecodeError::Packet(e)),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let capacity = decoded.capacity();
                    self.channels = spec.channels.count();
                    self.sample_rate = spec.rate;

                    let needed = capacity * self.channels;
                    if self
                        .sample_buf
                        .as_ref()
                        .map_or(true, |buf| buf.capacity() < needed)
                    {
                        self.sample_buf = Some(SampleBuffer::new(capacity as u64, spec));
                    }
                    if let Some(buf) = &mut self.sample_buf {
                        buf.copy_interleaved_ref(decoded);
                        out.extend_from_slice(buf.samples());
                    }
                    return Ok(true);
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    // Corrupt frame: skip it and keep going
                    warn!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(DecodeError::Packet(e)),
            }
        }
    }

    /// Jump to `seconds` from the start of the track
    pub fn seek(&mut self, seconds: f64) -> Result<(), DecodeError> {
        let seconds = seconds.max(0.0);
        self.format
            .seek(
                SeekMode::Coarse,
                SeekTo::Time {
                    time: Time::from(seconds),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|source| DecodeError::Seek { seconds, source })?;
        self.decoder.reset();
        Ok(())
    }
}

/// Channel remix and linear-interpolation resampling to the output format.
///
/// Keeps the last input frame between calls so chunk boundaries are seamless.
pub struct FormatConverter {
    in_channels: usize,
    out_channels: usize,
    /// Input frames advanced per output frame
    step: f64,
    /// Read position relative to the carried frame
    pos: f64,
    carry: Option<Vec<f32>>,
    remixed: Vec<f32>,
}

impl FormatConverter {
    pub fn new(in_rate: u32, in_channels: usize, out_rate: u32, out_channels: usize) -> Self {
        Self {
            in_channels: in_channels.max(1),
            out_channels: out_channels.max(1),
            step: in_rate as f64 / out_rate.max(1) as f64,
            pos: 0.0,
            carry: None,
            remixed: Vec::new(),
        }
    }

    /// Input format changed mid-stream (rare, some codecs do it after the
    /// first frame)
    pub fn reconfigure(&mut self, in_rate: u32, in_channels: usize, out_rate: u32) {
        self.in_channels = in_channels.max(1);
        self.step = in_rate as f64 / out_rate.max(1) as f64;
    }

    /// Drop carried state (after a seek)
    pub fn reset(&mut self) {
        self.pos = 0.0;
        self.carry = None;
    }

    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        self.remix(input);
        let oc = self.out_channels;

        if self.step == 1.0 {
            out.extend_from_slice(&self.remixed);
            return;
        }

        let base = usize::from(self.carry.is_some());
        let total = base + self.remixed.len() / oc;
        if total == 0 {
            return;
        }

        let carry = self.carry.take().unwrap_or_default();

        while self.pos + 1.0 < total as f64 {
            let i = self.pos.floor() as usize;
            let frac = (self.pos - i as f64) as f32;
            let a = frame_at(&carry, &self.remixed, base, oc, i);
            let b = frame_at(&carry, &self.remixed, base, oc, i + 1);
            out.extend(a.iter().zip(b).map(|(&a, &b)| a + (b - a) * frac));
            self.pos += self.step;
        }

        self.pos -= (total - 1) as f64;
        let last = frame_at(&carry, &self.remixed, base, oc, total - 1).to_vec();
        self.carry = Some(last);
    }

    fn remix(&mut self, input: &[f32]) {
        let (ic, oc) = (self.in_channels, self.out_channels);
        self.remixed.clear();
        for frame in input.chunks_exact(ic) {
            for c in 0..oc {
                let sample = if ic == oc {
                    frame[c]
                } else if ic == 1 {
                    frame[0]
                } else if oc == 1 {
                    frame.iter().sum::<f32>() / ic as f32
                } else {
                    frame[c % ic]
                };
                self.remixed.push(sample);
            }
        }
    }
}

/// Frame `i` of the sequence "carried frame, then remixed input"
fn frame_at<'a>(carry: &'a [f32], remixed: &'a [f32], base: usize, oc: usize, i: usize) -> &'a [f32] {
    if i < base {
        carry
    } else {
        &remixed[(i - base) * oc..(i - base + 1) * oc]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Build a WAV file in memory
    fn make_wav(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                let value = ((i as f32 * 0.05).sin() * 8000.0) as i16;
                for _ in 0..channels {
                    writer.write_sample(value).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn decode_all(decoder: &mut TrackDecoder) -> Vec<f32> {
        let mut out = Vec::new();
        while decoder.next_chunk(&mut out).unwrap() {}
        out
    }

    #[test]
    fn test_source_path() {
        assert_eq!(
            source_path("file:///music/a.mp3").unwrap(),
            PathBuf::from("/music/a.mp3")
        );
        assert_eq!(source_path("audio/b.mp3").unwrap(), PathBuf::from("audio/b.mp3"));
        assert!(matches!(
            source_path("https://example.com/a.mp3"),
            Err(PlaybackError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_missing_file_is_unreachable() {
        let err = TrackDecoder::open("/nonexistent/pulsewave/track.mp3").err().unwrap();
        assert!(matches!(err, PlaybackError::Unreachable { .. }));
    }

    #[test]
    fn test_garbage_is_undecodable() {
        let media = Box::new(Cursor::new(vec![0x42u8; 4096]));
        let err = TrackDecoder::from_media("garbage.bin", media, None).err().unwrap();
        assert!(matches!(err, PlaybackError::Undecodable { .. }));
    }

    #[test]
    fn test_decode_wav_stereo() {
        let wav = make_wav(22050, 2, 22050);
        let mut decoder =
            TrackDecoder::from_media("tone.wav", Box::new(Cursor::new(wav)), Some("wav")).unwrap();

        assert_eq!(decoder.channels(), 2);
        assert_eq!(decoder.sample_rate(), 22050);
        assert!((decoder.duration_secs().unwrap() - 1.0).abs() < 1e-6);

        let samples = decode_all(&mut decoder);
        assert_eq!(samples.len(), 22050 * 2);
        assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_seek_then_decode() {
        let wav = make_wav(8000, 1, 16000);
        let mut decoder =
            TrackDecoder::from_media("tone.wav", Box::new(Cursor::new(wav)), Some("wav")).unwrap();

        decoder.seek(1.5).unwrap();
        let rest = decode_all(&mut decoder);
        assert!(!rest.is_empty());
        assert!(rest.len() < 16000);
    }

    #[test]
    fn test_seek_past_end_reports_target() {
        let wav = make_wav(8000, 1, 16000);
        let mut decoder =
            TrackDecoder::from_media("tone.wav", Box::new(Cursor::new(wav)), Some("wav")).unwrap();

        let err = decoder.seek(10.0).unwrap_err();
        assert!(matches!(err, DecodeError::Seek { seconds, .. } if seconds == 10.0));
        assert!(err.to_string().starts_with("cannot seek to 10.0s"));
    }

    #[test]
    fn test_converter_passthrough() {
        let mut conv = FormatConverter::new(48000, 2, 48000, 2);
        let mut out = Vec::new();
        conv.process(&[0.1, 0.2, 0.3, 0.4], &mut out);
        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_converter_mono_to_stereo() {
        let mut conv = FormatConverter::new(44100, 1, 44100, 2);
        let mut out = Vec::new();
        conv.process(&[0.5, -0.5], &mut out);
        assert_eq!(out, vec![0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn test_converter_stereo_to_mono() {
        let mut conv = FormatConverter::new(44100, 2, 44100, 1);
        let mut out = Vec::new();
        conv.process(&[1.0, 0.0, 0.0, -1.0], &mut out);
        assert_eq!(out, vec![0.5, -0.5]);
    }

    #[test]
    fn test_converter_upsample_interpolates() {
        let mut conv = FormatConverter::new(22050, 1, 44100, 1);
        let mut out = Vec::new();
        conv.process(&[0.0, 1.0, 0.0], &mut out);
        assert_eq!(out, vec![0.0, 0.5, 1.0, 0.5]);
    }

    #[test]
    fn test_converter_chunking_is_seamless() {
        let input: Vec<f32> = (0..64).map(|i| (i as f32 * 0.3).sin()).collect();

        let mut whole = FormatConverter::new(44100, 1, 48000, 1);
        let mut expected = Vec::new();
        whole.process(&input, &mut expected);

        let mut split = FormatConverter::new(44100, 1, 48000, 1);
        let mut actual = Vec::new();
        for chunk in input.chunks(7) {
            split.process(chunk, &mut actual);
        }

        assert_eq!(expected.len(), actual.len());
        for (a, b) in expected.iter().zip(&actual) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}
