//! Voice processing module
//!
//! Audio framing, voice activity detection, utterance segmentation, wake
//! phrase matching, and the capture/playback/STT/TTS adapters used by the
//! talk runtime.

mod audio;
mod capture;
mod directive;
mod playback;
mod segment;
mod stt;
mod tts;
mod vad;
mod wake_word;

pub use audio::{
    AudioFrame, DecodedAudio, FRAME_BYTES, FRAME_DURATION, FRAME_SAMPLES, SAMPLE_RATE,
    decode_wav, ensure_wav, f32_to_i16, frames_for, frames_to_wav, is_wav, samples_to_wav,
};
pub use capture::{CaptureSession, CaptureSource, CommandCapture, CpalCapture};
pub use directive::{ParsedReply, SpeechDirective, parse_reply};
pub use playback::{CommandPlayback, CpalPlayback, PlaybackOutcome, PlaybackSink};
pub use segment::{
    DEFAULT_MAX_PHRASE_DURATION, MAX_TURN_DURATION, PRE_ROLL_FRAMES, SILENCE_TIMEOUT,
    SegmentAssembler, Utterance,
};
pub use stt::{SpeechToText, Transcriber};
pub use tts::{SpeechRequest, Synthesizer, TextToSpeech};
pub use vad::{DEFAULT_MIN_SPEECH_RMS, DEFAULT_NOISE_BOOST, VadVerdict, VoiceActivityDetector};
pub use wake_word::{WakePhrase, extract_remainder, matches, normalize};

/// Build the configured capture source
pub use capture::from_config as capture_from_config;
/// Build the configured playback sink
pub use playback::from_config as playback_from_config;
