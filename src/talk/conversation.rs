//! Foreground conversation: capture, turns, barge-in

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::agent::{AgentReply, wait_for_reply};
use super::capture_loop::{FrameSink, drive_capture, with_timeout};
use super::{CaptureOwner, TalkRuntime};
use crate::Result;
use crate::voice::{
    AudioFrame, SegmentAssembler, Utterance, VoiceActivityDetector, ensure_wav, parse_reply,
};

/// Punctuation ignored around a spoken "stop"
const STOP_PUNCTUATION: &[char] = &['.', ',', '!', '?', ';', ':'];

/// What a transcript asks the runtime to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// Bare "stop": interrupt, dispatch nothing
    Stop,
    /// Send this text to the agent
    Message(String),
}

/// Classify a non-empty transcript
///
/// "stop" on its own (any case, trailing punctuation ignored) is a bare
/// interruption; "stop" followed by more words dispatches only the words
/// after it.
#[must_use]
pub fn parse_command(transcript: &str) -> UserCommand {
    let text = transcript.trim();
    let is_separator = |c: char| c.is_whitespace() || STOP_PUNCTUATION.contains(&c);

    if let Some(head) = text.get(..4)
        && head.eq_ignore_ascii_case("stop")
    {
        let rest = &text[4..];
        if rest.is_empty() || rest.starts_with(is_separator) {
            let rest = rest.trim_start_matches(is_separator);
            return if rest.is_empty() {
                UserCommand::Stop
            } else {
                UserCommand::Message(rest.to_string())
            };
        }
    }

    UserCommand::Message(text.to_string())
}

/// Conversation capture loop for one lifecycle
pub(super) async fn run_capture(
    runtime: TalkRuntime,
    lifecycle: u64,
    cancel: CancellationToken,
    previous: Option<JoinHandle<()>>,
) {
    tracing::info!(lifecycle, "conversation listening");

    let mut session = ConversationCapture {
        runtime: runtime.clone(),
        lifecycle,
        vad: VoiceActivityDetector::default(),
        assembler: SegmentAssembler::for_turn(),
    };
    drive_capture(
        &runtime,
        CaptureOwner::Conversation(lifecycle),
        &cancel,
        previous,
        &mut session,
    )
    .await;
}

struct ConversationCapture {
    runtime: TalkRuntime,
    lifecycle: u64,
    vad: VoiceActivityDetector,
    assembler: SegmentAssembler,
}

impl FrameSink for ConversationCapture {
    fn frame(&mut self, frame: AudioFrame) {
        let verdict = self.vad.note(&frame);
        // Speech during thinking or speaking abandons the in-flight turn
        if verdict.is_speech && self.runtime.barge_in(self.lifecycle) {
            self.assembler.reset();
        }

        let Some(utterance) = self.assembler.push(frame, verdict.is_speech) else {
            return;
        };
        let Some(turn) = self.runtime.begin_turn(self.lifecycle) else {
            return;
        };

        tracing::debug!(
            turn,
            frames = utterance.len(),
            forced = utterance.forced(),
            "utterance finalized"
        );
        tokio::spawn(run_voice_turn(
            self.runtime.clone(),
            self.lifecycle,
            turn,
            utterance,
        ));
    }

    fn restarted(&mut self) {
        self.assembler.reset();
    }
}

/// Turn started by finalized speech
async fn run_voice_turn(runtime: TalkRuntime, lifecycle: u64, turn: u64, utterance: Utterance) {
    if let Err(e) = transcribe_and_respond(&runtime, lifecycle, turn, utterance).await {
        tracing::warn!(turn, error = %e, "turn failed");
    }
    runtime.end_turn(lifecycle, turn);
}

/// Turn started from text (the remainder after a wake phrase)
pub(super) async fn run_text_turn(runtime: TalkRuntime, lifecycle: u64, turn: u64, text: String) {
    if let Err(e) = respond(&runtime, lifecycle, turn, &text).await {
        tracing::warn!(turn, error = %e, "turn failed");
    }
    runtime.end_turn(lifecycle, turn);
}

async fn transcribe_and_respond(
    runtime: &TalkRuntime,
    lifecycle: u64,
    turn: u64,
    utterance: Utterance,
) -> Result<()> {
    let options = runtime.options();
    let wav = utterance.to_wav()?;
    drop(utterance);

    let transcript = with_timeout(
        options.timings.transcribe_timeout,
        "transcription",
        runtime
            .deps()
            .transcriber
            .transcribe(wav, options.language.as_deref()),
    )
    .await?;

    if !runtime.is_turn_current(lifecycle, turn) {
        tracing::debug!(turn, "discarding transcript from superseded turn");
        return Ok(());
    }

    let transcript = transcript.trim();
    if transcript.is_empty() {
        tracing::debug!(turn, "empty transcript");
        return Ok(());
    }

    match parse_command(transcript) {
        UserCommand::Stop => {
            runtime.acknowledge_stop(lifecycle, turn);
            Ok(())
        }
        UserCommand::Message(text) => respond(runtime, lifecycle, turn, &text).await,
    }
}

/// Dispatch, wait for the reply, speak it
async fn respond(runtime: &TalkRuntime, lifecycle: u64, turn: u64, text: &str) -> Result<()> {
    let options = runtime.options();
    let deps = runtime.deps();

    let Some(meta) = runtime.enter_thinking(lifecycle, turn) else {
        return Ok(());
    };

    tracing::info!(turn, text, "user turn");
    with_timeout(
        options.timings.dispatch_timeout,
        "agent dispatch",
        deps.agent.dispatch(&options.session_key, text, &meta),
    )
    .await?;

    let reply = wait_for_reply(
        deps.agent.as_ref(),
        &options.session_key,
        meta.message_id,
        options.timings.reply_poll_interval,
        options.timings.reply_timeout,
        || runtime.is_turn_current(lifecycle, turn),
    )
    .await?;
    let Some(reply) = reply else {
        tracing::debug!(turn, "reply wait superseded");
        return Ok(());
    };

    let (spoken, audio) = match reply {
        AgentReply::Text(reply) => {
            let parsed = parse_reply(&reply);
            if parsed.text.is_empty() {
                tracing::debug!(turn, "reply has nothing to speak");
                return Ok(());
            }

            let mut request = options.speech.clone();
            request.text.clone_from(&parsed.text);
            if let Some(directive) = &parsed.directive {
                request = request.with_directive(directive);
            }

            let audio = with_timeout(
                options.timings.synthesize_timeout,
                "synthesis",
                deps.synthesizer.synthesize(&request),
            )
            .await?;
            (parsed.text, audio)
        }
        AgentReply::Media(path) => {
            tracing::debug!(turn, path = %path.display(), "playing media reply");
            let audio = tokio::fs::read(&path).await?;
            (path.display().to_string(), audio)
        }
    };

    if !runtime.is_turn_current(lifecycle, turn) {
        tracing::debug!(turn, "discarding synthesized reply from superseded turn");
        return Ok(());
    }

    let wav = ensure_wav(audio)?;
    let Some(cancel) = runtime.enter_speaking(lifecycle, turn, spoken) else {
        return Ok(());
    };

    let outcome = with_timeout(
        options.timings.playback_timeout,
        "playback",
        deps.playback.play(wav, cancel),
    )
    .await?;

    tracing::debug!(turn, ?outcome, "playback finished");
    runtime.finish_playback(lifecycle, turn, outcome);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_stop() {
        assert_eq!(parse_command("stop"), UserCommand::Stop);
        assert_eq!(parse_command("Stop."), UserCommand::Stop);
        assert_eq!(parse_command("  STOP!! "), UserCommand::Stop);
    }

    #[test]
    fn test_stop_with_message() {
        assert_eq!(
            parse_command("stop what's the time"),
            UserCommand::Message("what's the time".to_string())
        );
        assert_eq!(
            parse_command("Stop, turn the lights off."),
            UserCommand::Message("turn the lights off.".to_string())
        );
    }

    #[test]
    fn test_not_a_stop() {
        assert_eq!(
            parse_command("stopwatch for five minutes"),
            UserCommand::Message("stopwatch for five minutes".to_string())
        );
        assert_eq!(
            parse_command("please stop"),
            UserCommand::Message("please stop".to_string())
        );
        assert_eq!(parse_command("stö"), UserCommand::Message("stö".to_string()));
    }
}
