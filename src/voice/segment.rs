//! Utterance segmentation
//!
//! Turns a stream of frames plus VAD verdicts into finalized utterances. A
//! short pre-roll ring is kept while idle so the first syllable is not clipped.
//! All durations are audio time (frame count), not wall-clock time.

use std::collections::VecDeque;
use std::time::Duration;

use super::audio::{AudioFrame, FRAME_DURATION, frames_for, frames_to_wav};
use crate::Result;

/// Frames kept from before speech onset
pub const PRE_ROLL_FRAMES: usize = 6;

/// Silence after the last speech frame that closes an utterance
pub const SILENCE_TIMEOUT: Duration = Duration::from_millis(700);

/// Hard cap on a conversation turn
pub const MAX_TURN_DURATION: Duration = Duration::from_secs(12);

/// Default cap on a wake phrase segment
pub const DEFAULT_MAX_PHRASE_DURATION: Duration = Duration::from_secs(5);

/// A finalized span of captured speech
#[derive(Debug, Clone)]
pub struct Utterance {
    frames: Vec<AudioFrame>,
    forced: bool,
}

impl Utterance {
    /// Frames in capture order, pre-roll first
    #[must_use]
    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    /// Number of frames
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always false for a finalized utterance
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Whether the duration cap closed this utterance
    #[must_use]
    pub const fn forced(&self) -> bool {
        self.forced
    }

    /// Audio duration
    #[must_use]
    pub fn duration(&self) -> Duration {
        FRAME_DURATION * u32::try_from(self.frames.len()).unwrap_or(u32::MAX)
    }

    /// Encode as WAV for transcription
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        frames_to_wav(&self.frames)
    }
}

#[derive(Debug)]
struct ActiveCapture {
    frames: Vec<AudioFrame>,
    captured: usize,
    since_speech: usize,
}

/// Assembles frames into utterances
#[derive(Debug)]
pub struct SegmentAssembler {
    pre_roll: VecDeque<AudioFrame>,
    active: Option<ActiveCapture>,
    silence_frames: usize,
    max_frames: usize,
}

impl SegmentAssembler {
    /// Create an assembler that force-finalizes after `max_duration`
    #[must_use]
    pub fn new(max_duration: Duration) -> Self {
        Self {
            pre_roll: VecDeque::with_capacity(PRE_ROLL_FRAMES),
            active: None,
            silence_frames: frames_for(SILENCE_TIMEOUT),
            max_frames: frames_for(max_duration).max(1),
        }
    }

    /// Assembler sized for a conversation turn
    #[must_use]
    pub fn for_turn() -> Self {
        Self::new(MAX_TURN_DURATION)
    }

    /// Feed one frame with its VAD verdict
    ///
    /// Returns the utterance when this frame finalizes one
    pub fn push(&mut self, frame: AudioFrame, is_speech: bool) -> Option<Utterance> {
        let Some(active) = self.active.as_mut() else {
            if is_speech {
                let mut frames: Vec<AudioFrame> = self.pre_roll.drain(..).collect();
                frames.push(frame);
                tracing::trace!(pre_roll = frames.len() - 1, "speech onset");
                self.active = Some(ActiveCapture {
                    frames,
                    captured: 1,
                    since_speech: 0,
                });
                return self.finalize_if_capped();
            }

            if self.pre_roll.len() == PRE_ROLL_FRAMES {
                self.pre_roll.pop_front();
            }
            self.pre_roll.push_back(frame);
            return None;
        };

        active.frames.push(frame);
        active.captured += 1;
        if is_speech {
            active.since_speech = 0;
        } else {
            active.since_speech += 1;
        }

        if active.since_speech >= self.silence_frames {
            return self.finalize(false);
        }

        self.finalize_if_capped()
    }

    /// Whether an utterance is in progress
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.active.is_some()
    }

    /// Discard any in-progress utterance and the pre-roll
    pub fn reset(&mut self) {
        self.pre_roll.clear();
        self.active = None;
    }

    fn finalize_if_capped(&mut self) -> Option<Utterance> {
        let captured = self.active.as_ref().map_or(0, |a| a.captured);
        if captured >= self.max_frames {
            tracing::info!(frames = captured, "utterance hit duration cap, forcing finalize");
            return self.finalize(true);
        }
        None
    }

    fn finalize(&mut self, forced: bool) -> Option<Utterance> {
        let active = self.active.take()?;
        self.pre_roll.clear();
        tracing::debug!(frames = active.frames.len(), forced, "utterance finalized");
        Some(Utterance {
            frames: active.frames,
            forced,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loud() -> AudioFrame {
        AudioFrame::constant(8000)
    }

    fn quiet() -> AudioFrame {
        AudioFrame::silent()
    }

    #[test]
    fn test_pre_roll_capped() {
        let mut assembler = SegmentAssembler::for_turn();
        for _ in 0..20 {
            assert!(assembler.push(quiet(), false).is_none());
        }
        assert!(!assembler.is_capturing());

        assert!(assembler.push(loud(), true).is_none());
        assert!(assembler.is_capturing());

        let mut utterance = None;
        for _ in 0..35 {
            utterance = assembler.push(quiet(), false);
        }
        let utterance = utterance.expect("silence should finalize");
        // 6 pre-roll + 1 speech + 35 silence
        assert_eq!(utterance.len(), PRE_ROLL_FRAMES + 1 + 35);
        assert!(!utterance.forced());
    }

    #[test]
    fn test_silence_resets_on_speech() {
        let mut assembler = SegmentAssembler::for_turn();
        assembler.push(loud(), true);
        for _ in 0..34 {
            assert!(assembler.push(quiet(), false).is_none());
        }
        // Speech just before the timeout keeps the utterance open
        assert!(assembler.push(loud(), true).is_none());
        for _ in 0..34 {
            assert!(assembler.push(quiet(), false).is_none());
        }
        assert!(assembler.push(quiet(), false).is_some());
    }

    #[test]
    fn test_forced_finalize_bounds_length() {
        let max = Duration::from_secs(1);
        let mut assembler = SegmentAssembler::new(max);
        for _ in 0..10 {
            assembler.push(quiet(), false);
        }

        let mut finalized = None;
        for i in 0..100 {
            if let Some(u) = assembler.push(loud(), true) {
                finalized = Some((i, u));
                break;
            }
        }
        let (index, utterance) = finalized.expect("cap should finalize");
        assert_eq!(index, 49);
        assert!(utterance.forced());
        assert!(utterance.len() <= frames_for(max) + PRE_ROLL_FRAMES);
        assert_eq!(utterance.len(), 50 + PRE_ROLL_FRAMES);
    }

    #[test]
    fn test_next_pre_roll_starts_empty() {
        let mut assembler = SegmentAssembler::for_turn();
        assembler.push(loud(), true);
        let mut done = None;
        while done.is_none() {
            done = assembler.push(quiet(), false);
        }

        // Immediate onset after finalize has no pre-roll
        assembler.push(loud(), true);
        let mut second = None;
        while second.is_none() {
            second = assembler.push(quiet(), false);
        }
        assert_eq!(second.unwrap().len(), 1 + 35);
    }

    #[test]
    fn test_reset_discards_capture() {
        let mut assembler = SegmentAssembler::for_turn();
        assembler.push(quiet(), false);
        assembler.push(loud(), true);
        assembler.reset();
        assert!(!assembler.is_capturing());

        assembler.push(loud(), true);
        let mut utterance = None;
        while utterance.is_none() {
            utterance = assembler.push(quiet(), false);
        }
        assert_eq!(utterance.unwrap().len(), 1 + 35);
    }

    #[test]
    fn test_utterance_to_wav() {
        let mut assembler = SegmentAssembler::new(Duration::from_millis(20));
        let utterance = assembler.push(loud(), true).expect("single-frame cap");
        assert_eq!(utterance.duration(), Duration::from_millis(20));
        let wav = utterance.to_wav().unwrap();
        assert!(crate::voice::audio::is_wav(&wav));
    }
}
