//! Background wake phrase listener

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::capture_loop::{FrameSink, drive_capture, with_timeout};
use super::{CaptureOwner, TalkRuntime};
use crate::Result;
use crate::voice::{AudioFrame, SegmentAssembler, Utterance, VoiceActivityDetector};

/// Listen for the wake phrase until cancelled or superseded
pub(super) async fn run(
    runtime: TalkRuntime,
    generation: u64,
    cancel: CancellationToken,
    previous: Option<JoinHandle<()>>,
) {
    let wake = &runtime.options().wake;
    tracing::debug!(generation, threshold = wake.threshold, "wake listener running");

    let mut session = ListenerCapture {
        runtime: runtime.clone(),
        generation,
        vad: VoiceActivityDetector::new(wake.threshold),
        assembler: SegmentAssembler::new(wake.max_phrase),
    };
    drive_capture(
        &runtime,
        CaptureOwner::Listener(generation),
        &cancel,
        previous,
        &mut session,
    )
    .await;
}

struct ListenerCapture {
    runtime: TalkRuntime,
    generation: u64,
    vad: VoiceActivityDetector,
    assembler: SegmentAssembler,
}

impl FrameSink for ListenerCapture {
    fn frame(&mut self, frame: AudioFrame) {
        let verdict = self.vad.note(&frame);
        if let Some(segment) = self.assembler.push(frame, verdict.is_speech) {
            tokio::spawn(check_segment(
                self.runtime.clone(),
                self.generation,
                segment,
            ));
        }
    }

    fn restarted(&mut self) {
        self.assembler.reset();
    }
}

async fn check_segment(runtime: TalkRuntime, generation: u64, segment: Utterance) {
    match detect(&runtime, generation, &segment).await {
        Ok(Some(remainder)) => {
            tracing::debug!(generation, remainder = %remainder, "activating from wake phrase");
            runtime.activate_from_wake(generation, &remainder);
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(generation, error = %e, "wake segment transcription failed"),
    }
}

/// Transcribe a segment and match it against the wake phrase
///
/// Returns `None` for a stale listener or a non-matching segment.
async fn detect(
    runtime: &TalkRuntime,
    generation: u64,
    segment: &Utterance,
) -> Result<Option<String>> {
    if !runtime.is_listener_current(generation) {
        return Ok(None);
    }

    let options = runtime.options();
    let wav = segment.to_wav()?;
    let text = with_timeout(
        options.timings.transcribe_timeout,
        "transcription",
        runtime
            .deps()
            .transcriber
            .transcribe(wav, options.language.as_deref()),
    )
    .await?;

    if !runtime.is_listener_current(generation) {
        tracing::debug!(generation, "discarding transcript from stale listener");
        return Ok(None);
    }

    let remainder = runtime.wake_phrase().detect(&text);
    if remainder.is_none() {
        tracing::debug!(generation, text = %text, "no wake phrase");
    }
    Ok(remainder)
}
