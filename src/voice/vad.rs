//! Energy-based voice activity detection
//!
//! Tracks an adaptive noise floor so the threshold follows the room. The floor
//! falls quickly toward quieter readings and rises slowly, which keeps a long
//! stretch of speech from dragging the threshold up until nothing counts as
//! speech any more.

use super::audio::AudioFrame;

/// Absolute minimum RMS considered speech
pub const DEFAULT_MIN_SPEECH_RMS: f32 = 0.015;

/// Multiplier applied to the noise floor to derive the threshold
pub const DEFAULT_NOISE_BOOST: f32 = 3.0;

/// Initial noise floor estimate
const INITIAL_NOISE_FLOOR: f32 = 0.005;

/// Smoothing factor when the reading is quieter than the floor
const FLOOR_DECAY_ALPHA: f32 = 0.08;

/// Smoothing factor when the reading is louder than the floor
const FLOOR_RISE_ALPHA: f32 = 0.01;

/// Fraction of the threshold that keeps an ongoing speech run alive
const HYSTERESIS: f32 = 0.9;

/// Classification of a single frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadVerdict {
    /// Whether the frame counts as speech
    pub is_speech: bool,
    /// Frame RMS energy
    pub rms: f32,
    /// Threshold the frame was compared against
    pub threshold: f32,
}

/// Voice activity detector with an adaptive noise floor
///
/// Owned by whichever loop currently consumes capture; never shared.
#[derive(Debug, Clone)]
pub struct VoiceActivityDetector {
    min_speech_rms: f32,
    boost: f32,
    noise_floor: f32,
    in_speech: bool,
}

impl Default for VoiceActivityDetector {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SPEECH_RMS)
    }
}

impl VoiceActivityDetector {
    /// Create a detector with the given absolute speech floor
    #[must_use]
    pub const fn new(min_speech_rms: f32) -> Self {
        Self {
            min_speech_rms,
            boost: DEFAULT_NOISE_BOOST,
            noise_floor: INITIAL_NOISE_FLOOR,
            in_speech: false,
        }
    }

    /// Override the noise boost factor
    #[must_use]
    pub const fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// Classify a frame and update the noise floor
    pub fn note(&mut self, frame: &AudioFrame) -> VadVerdict {
        self.note_rms(frame.rms())
    }

    /// Classify a precomputed RMS reading
    pub fn note_rms(&mut self, rms: f32) -> VadVerdict {
        let alpha = if rms < self.noise_floor {
            FLOOR_DECAY_ALPHA
        } else {
            FLOOR_RISE_ALPHA
        };
        self.noise_floor += alpha * (rms - self.noise_floor);

        let threshold = self.threshold();
        let cutoff = if self.in_speech {
            threshold * HYSTERESIS
        } else {
            threshold
        };
        let is_speech = rms >= cutoff;
        self.in_speech = is_speech;

        VadVerdict {
            is_speech,
            rms,
            threshold,
        }
    }

    /// Current effective threshold
    #[must_use]
    pub fn threshold(&self) -> f32 {
        self.min_speech_rms.max(self.noise_floor * self.boost)
    }

    /// Current noise floor estimate
    #[must_use]
    pub const fn noise_floor(&self) -> f32 {
        self.noise_floor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_input_never_speech() {
        let mut vad = VoiceActivityDetector::default();
        for i in 0..2000 {
            #[allow(clippy::cast_precision_loss)]
            let rms = DEFAULT_MIN_SPEECH_RMS * ((i % 10) as f32 / 10.0);
            assert!(!vad.note_rms(rms).is_speech, "frame {i} reported speech");
        }
    }

    #[test]
    fn test_floor_converges_toward_input() {
        let mut vad = VoiceActivityDetector::default();
        for _ in 0..500 {
            vad.note_rms(0.001);
        }
        assert!((vad.noise_floor() - 0.001).abs() < 1e-4);

        let mut vad = VoiceActivityDetector::default();
        for _ in 0..2000 {
            vad.note_rms(0.012);
        }
        assert!((vad.noise_floor() - 0.012).abs() < 1e-3);
    }

    #[test]
    fn test_loud_frame_is_speech() {
        let mut vad = VoiceActivityDetector::default();
        let verdict = vad.note(&AudioFrame::constant(8000));
        assert!(verdict.is_speech);
        assert!(verdict.rms > verdict.threshold);
    }

    #[test]
    fn test_sustained_speech_stays_detected() {
        let mut vad = VoiceActivityDetector::default();
        // Ten seconds of syllables separated by short gaps
        for _ in 0..50 {
            for _ in 0..5 {
                assert!(vad.note_rms(0.1).is_speech);
            }
            for _ in 0..5 {
                assert!(!vad.note_rms(0.002).is_speech);
            }
        }
        assert!(vad.threshold() < 0.05);
    }

    #[test]
    fn test_hysteresis_keeps_speech_near_threshold() {
        let mut vad = VoiceActivityDetector::default();
        assert!(vad.note_rms(0.05).is_speech);

        let threshold = vad.threshold();
        // Just under threshold but inside the band: still speech
        assert!(vad.note_rms(threshold * 0.95).is_speech);
        // Below the band: silence
        assert!(!vad.note_rms(threshold * 0.5).is_speech);
        // Back inside the band from silence: onset needs the full threshold
        let threshold = vad.threshold();
        assert!(!vad.note_rms(threshold * 0.95).is_speech);
    }

    #[test]
    fn test_silent_frame() {
        let mut vad = VoiceActivityDetector::default();
        let verdict = vad.note(&AudioFrame::silent());
        assert!(!verdict.is_speech);
        assert!(verdict.threshold >= DEFAULT_MIN_SPEECH_RMS);
    }
}
