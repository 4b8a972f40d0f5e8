//! PCM frames and WAV helpers
//!
//! Capture works in fixed 20ms frames of 16-bit mono PCM at 16kHz. Playback
//! always receives WAV bytes, so MP3 output from TTS providers is converted
//! here before it reaches a sink.

use std::fmt;
use std::io::Cursor;
use std::time::Duration;

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Samples per capture frame (20ms at 16kHz)
pub const FRAME_SAMPLES: usize = 320;

/// Bytes per capture frame in `s16le` wire format
pub const FRAME_BYTES: usize = FRAME_SAMPLES * 2;

/// Duration covered by a single frame
pub const FRAME_DURATION: Duration = Duration::from_millis(20);

/// Number of frames covering `duration`, rounded up
#[must_use]
pub fn frames_for(duration: Duration) -> usize {
    let frame_ms = FRAME_DURATION.as_millis();
    usize::try_from(duration.as_millis().div_ceil(frame_ms)).unwrap_or(usize::MAX)
}

/// One fixed-size block of 16-bit mono PCM
#[derive(Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: [i16; FRAME_SAMPLES],
}

impl AudioFrame {
    /// Wrap a full block of samples
    #[must_use]
    pub const fn new(samples: [i16; FRAME_SAMPLES]) -> Self {
        Self { samples }
    }

    /// A frame of digital silence
    #[must_use]
    pub const fn silent() -> Self {
        Self {
            samples: [0; FRAME_SAMPLES],
        }
    }

    /// A frame where every sample has the same value
    #[must_use]
    pub const fn constant(value: i16) -> Self {
        Self {
            samples: [value; FRAME_SAMPLES],
        }
    }

    /// Parse one frame from little-endian `s16le` bytes
    ///
    /// Returns `None` unless exactly [`FRAME_BYTES`] bytes are given
    #[must_use]
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != FRAME_BYTES {
            return None;
        }

        let mut samples = [0i16; FRAME_SAMPLES];
        for (sample, pair) in samples.iter_mut().zip(bytes.chunks_exact(2)) {
            *sample = i16::from_le_bytes([pair[0], pair[1]]);
        }
        Some(Self { samples })
    }

    /// Build one frame from `f32` samples in [-1.0, 1.0]
    ///
    /// Returns `None` unless exactly [`FRAME_SAMPLES`] samples are given
    #[must_use]
    pub fn from_f32(input: &[f32]) -> Option<Self> {
        if input.len() != FRAME_SAMPLES {
            return None;
        }

        let mut samples = [0i16; FRAME_SAMPLES];
        for (out, &sample) in samples.iter_mut().zip(input) {
            *out = f32_to_i16(sample);
        }
        Some(Self { samples })
    }

    /// Raw samples
    #[must_use]
    pub const fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Root-mean-square energy with samples normalized to [-1, 1]
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rms(&self) -> f32 {
        let sum_squares: f32 = self
            .samples
            .iter()
            .map(|&s| {
                let v = f32::from(s) / 32768.0;
                v * v
            })
            .sum();
        (sum_squares / FRAME_SAMPLES as f32).sqrt()
    }
}

impl fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioFrame")
            .field("rms", &self.rms())
            .finish()
    }
}

/// Convert an `f32` sample in [-1.0, 1.0] to `i16`
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Encode 16-bit mono samples as WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Encode a run of frames as a 16kHz mono WAV
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn frames_to_wav(frames: &[AudioFrame]) -> Result<Vec<u8>> {
    let samples: Vec<i16> = frames
        .iter()
        .flat_map(|f| f.samples().iter().copied())
        .collect();
    samples_to_wav(&samples, SAMPLE_RATE)
}

/// Decoded PCM ready for an output device
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Mono samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

/// Check for a RIFF/WAVE header
#[must_use]
pub fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Decode WAV bytes to mono `f32` samples
///
/// Multi-channel input is downmixed by averaging.
///
/// # Errors
///
/// Returns error if the bytes are not a readable WAV file
#[allow(clippy::cast_precision_loss)]
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Decode MP3 bytes to mono `i16` samples and their sample rate
fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<i16>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or(sample_rate);
                if frame.channels == 2 {
                    // Stereo: average channels
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = i32::from(chunk[0]);
                        let right = i32::from(chunk.get(1).copied().unwrap_or(chunk[0]));
                        #[allow(clippy::cast_possible_truncation)]
                        let mixed = ((left + right) / 2) as i16;
                        mixed
                    }));
                } else {
                    samples.extend_from_slice(&frame.data);
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Audio("MP3 stream contained no frames".to_string()));
    }

    Ok((samples, sample_rate))
}

/// Normalize synthesized audio to WAV
///
/// WAV input is returned unchanged; anything else is decoded as MP3.
///
/// # Errors
///
/// Returns error if the audio cannot be decoded or re-encoded
pub fn ensure_wav(bytes: Vec<u8>) -> Result<Vec<u8>> {
    if is_wav(&bytes) {
        return Ok(bytes);
    }

    let (samples, sample_rate) = decode_mp3(&bytes)?;
    tracing::debug!(samples = samples.len(), sample_rate, "converted mp3 to wav");
    samples_to_wav(&samples, sample_rate)
}
