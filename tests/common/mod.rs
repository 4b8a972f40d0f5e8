//! Shared test utilities: scripted collaborators for the talk runtime

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use beacon_talk::talk::{AgentGateway, DispatchMeta, Role, TranscriptEntry};
use beacon_talk::voice::{
    AudioFrame, CaptureSession, CaptureSource, PlaybackOutcome, PlaybackSink, SAMPLE_RATE,
    SpeechRequest, Synthesizer, Transcriber, samples_to_wav,
};
use beacon_talk::{Result, TalkDeps, TalkOptions, TalkRuntime};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Loud frames in one spoken phrase (300ms)
pub const SPEECH_FRAMES: usize = 15;

/// Trailing silence that closes an utterance (800ms)
pub const TRAILING_SILENCE_FRAMES: usize = 40;

/// Microphone fed by the test
///
/// Every `open` replaces the live channel, so frames always reach the most
/// recent capture session. A session holds the device from `open` until
/// `release_delay` after it is cancelled.
#[derive(Default)]
pub struct FakeMic {
    state: Arc<Mutex<MicState>>,
    release_delay: Duration,
}

#[derive(Default)]
struct MicState {
    sender: Option<mpsc::Sender<AudioFrame>>,
    opens: usize,
    held: usize,
    max_held: usize,
}

impl FakeMic {
    /// Take `delay` to free the device after a session is cancelled
    pub fn with_release_delay(delay: Duration) -> Self {
        Self {
            release_delay: delay,
            ..Self::default()
        }
    }

    /// Most sessions ever holding the device at the same time
    pub fn max_held(&self) -> usize {
        self.state.lock().unwrap().max_held
    }

    /// Number of capture sessions opened so far
    pub fn opens(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    /// Send one spoken phrase followed by enough silence to finalize it
    pub fn speak(&self) {
        let state = self.state.lock().unwrap();
        let sender = state.sender.as_ref().expect("microphone not open");
        let frames = std::iter::repeat_n(AudioFrame::constant(8000), SPEECH_FRAMES)
            .chain(std::iter::repeat_n(AudioFrame::silent(), TRAILING_SILENCE_FRAMES));
        for frame in frames {
            sender.try_send(frame).expect("capture channel full");
        }
    }

    /// End the live capture stream, as if the device went away
    pub fn end_stream(&self) {
        self.state.lock().unwrap().sender = None;
    }

    /// Wait until at least `count` sessions have been opened
    pub async fn wait_open(&self, count: usize) {
        wait_for("microphone open", || self.opens() >= count).await;
    }
}

#[async_trait]
impl CaptureSource for FakeMic {
    async fn open(&self, cancel: CancellationToken) -> Result<CaptureSession> {
        let (tx, rx) = mpsc::channel(1024);
        let (released_tx, released_rx) = oneshot::channel();
        {
            let mut state = self.state.lock().unwrap();
            state.sender = Some(tx);
            state.opens += 1;
            state.held += 1;
            state.max_held = state.max_held.max(state.held);
        }

        let state = Arc::clone(&self.state);
        let delay = self.release_delay;
        tokio::spawn(async move {
            cancel.cancelled().await;
            tokio::time::sleep(delay).await;
            state.lock().unwrap().held -= 1;
            drop(released_tx);
        });

        Ok(CaptureSession::new(rx, released_rx))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Transcriber returning scripted transcripts in order
///
/// Once the script runs out every call returns an empty transcript.
pub struct ScriptedTranscriber {
    script: Mutex<VecDeque<String>>,
    delay: Duration,
    calls: Mutex<usize>,
}

impl ScriptedTranscriber {
    pub fn new<I, S>(script: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(script.into_iter().map(Into::into).collect()),
            delay: Duration::ZERO,
            calls: Mutex::new(0),
        }
    }

    /// Take `delay` to answer each call
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, wav: Vec<u8>, _language: Option<&str>) -> Result<String> {
        assert!(wav.starts_with(b"RIFF"), "transcriber expects WAV input");
        let text = {
            *self.calls.lock().unwrap() += 1;
            self.script.lock().unwrap().pop_front().unwrap_or_default()
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(text)
    }
}

/// Synthesizer returning a short silent WAV and recording requests
#[derive(Default)]
pub struct FakeSynthesizer {
    requests: Mutex<Vec<SpeechRequest>>,
}

impl FakeSynthesizer {
    pub fn requests(&self) -> Vec<SpeechRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(request.clone());
        samples_to_wav(&[0; 1600], SAMPLE_RATE)
    }
}

/// Speaker that "plays" for a fixed duration unless cancelled
pub struct RecordingPlayback {
    duration: Duration,
    played: Mutex<Vec<(Vec<u8>, PlaybackOutcome)>>,
}

impl RecordingPlayback {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            played: Mutex::new(Vec::new()),
        }
    }

    /// Outcomes of finished playbacks, in order
    pub fn outcomes(&self) -> Vec<PlaybackOutcome> {
        self.played.lock().unwrap().iter().map(|(_, o)| *o).collect()
    }

    /// Audio of finished playbacks, in order
    pub fn audio(&self) -> Vec<Vec<u8>> {
        self.played.lock().unwrap().iter().map(|(a, _)| a.clone()).collect()
    }
}

#[async_trait]
impl PlaybackSink for RecordingPlayback {
    async fn play(&self, wav: Vec<u8>, cancel: CancellationToken) -> Result<PlaybackOutcome> {
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => PlaybackOutcome::Interrupted,
            () = tokio::time::sleep(self.duration) => PlaybackOutcome::Completed,
        };
        self.played.lock().unwrap().push((wav, outcome));
        Ok(outcome)
    }
}

enum ReplyMode {
    /// Reply "You said: <text>"
    Echo,
    /// Reply with these texts in order
    Script(VecDeque<String>),
    /// Never reply
    Silent,
}

/// Agent that answers dispatches from a script
pub struct ScriptedAgent {
    mode: Mutex<ReplyMode>,
    delays: Mutex<VecDeque<Duration>>,
    dispatches: Mutex<Vec<(String, DispatchMeta)>>,
    transcript: Arc<Mutex<Vec<TranscriptEntry>>>,
}

impl ScriptedAgent {
    fn with_mode(mode: ReplyMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            delays: Mutex::new(VecDeque::new()),
            dispatches: Mutex::new(Vec::new()),
            transcript: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Post the reply to the n-th dispatch after the n-th delay
    ///
    /// Dispatches past the end of `delays` are answered immediately.
    #[must_use]
    pub fn with_reply_delays<I>(self, delays: I) -> Self
    where
        I: IntoIterator<Item = Duration>,
    {
        *self.delays.lock().unwrap() = delays.into_iter().collect();
        self
    }

    pub fn echo() -> Self {
        Self::with_mode(ReplyMode::Echo)
    }

    pub fn silent() -> Self {
        Self::with_mode(ReplyMode::Silent)
    }

    pub fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_mode(ReplyMode::Script(
            replies.into_iter().map(Into::into).collect(),
        ))
    }

    /// Texts dispatched so far, in order
    pub fn dispatched(&self) -> Vec<String> {
        self.dispatches
            .lock()
            .unwrap()
            .iter()
            .map(|(text, _)| text.clone())
            .collect()
    }

    pub fn metas(&self) -> Vec<DispatchMeta> {
        self.dispatches
            .lock()
            .unwrap()
            .iter()
            .map(|(_, meta)| meta.clone())
            .collect()
    }
}

#[async_trait]
impl AgentGateway for ScriptedAgent {
    async fn dispatch(&self, _session_key: &str, text: &str, meta: &DispatchMeta) -> Result<()> {
        self.dispatches
            .lock()
            .unwrap()
            .push((text.to_string(), meta.clone()));

        let reply = match &mut *self.mode.lock().unwrap() {
            ReplyMode::Echo => Some(format!("You said: {text}")),
            ReplyMode::Script(replies) => replies.pop_front(),
            ReplyMode::Silent => None,
        };
        let delay = self.delays.lock().unwrap().pop_front().unwrap_or_default();

        self.transcript.lock().unwrap().push(TranscriptEntry {
            id: meta.message_id,
            ..TranscriptEntry::new(Role::User, text)
        });
        let Some(reply) = reply else {
            return Ok(());
        };

        let entry = TranscriptEntry::new(Role::Assistant, reply).in_reply_to(meta.message_id);
        if delay.is_zero() {
            self.transcript.lock().unwrap().push(entry);
        } else {
            let transcript = Arc::clone(&self.transcript);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                transcript.lock().unwrap().push(entry);
            });
        }
        Ok(())
    }

    async fn history(&self, _session_key: &str, limit: usize) -> Result<Vec<TranscriptEntry>> {
        let transcript = self.transcript.lock().unwrap();
        Ok(transcript[transcript.len().saturating_sub(limit)..].to_vec())
    }
}

/// A runtime wired to fakes, with handles to inspect them
pub struct Harness {
    pub runtime: TalkRuntime,
    pub mic: Arc<FakeMic>,
    pub stt: Arc<ScriptedTranscriber>,
    pub tts: Arc<FakeSynthesizer>,
    pub speaker: Arc<RecordingPlayback>,
    pub agent: Arc<ScriptedAgent>,
}

impl Harness {
    /// Harness whose replies play for two seconds
    pub fn new(stt: ScriptedTranscriber, agent: ScriptedAgent) -> Self {
        Self::with_playback(stt, agent, Duration::from_secs(2))
    }

    pub fn with_playback(
        stt: ScriptedTranscriber,
        agent: ScriptedAgent,
        playback: Duration,
    ) -> Self {
        Self::assemble(stt, agent, playback, FakeMic::default())
    }

    /// Harness over a custom microphone
    pub fn with_mic(stt: ScriptedTranscriber, agent: ScriptedAgent, mic: FakeMic) -> Self {
        Self::assemble(stt, agent, Duration::from_secs(2), mic)
    }

    fn assemble(
        stt: ScriptedTranscriber,
        agent: ScriptedAgent,
        playback: Duration,
        mic: FakeMic,
    ) -> Self {
        let mic = Arc::new(mic);
        let stt = Arc::new(stt);
        let tts = Arc::new(FakeSynthesizer::default());
        let speaker = Arc::new(RecordingPlayback::new(playback));
        let agent = Arc::new(agent);

        let deps = TalkDeps {
            capture: mic.clone(),
            playback: speaker.clone(),
            transcriber: stt.clone(),
            synthesizer: tts.clone(),
            agent: agent.clone(),
        };

        Self {
            runtime: TalkRuntime::new(deps, TalkOptions::default()),
            mic,
            stt,
            tts,
            speaker,
            agent,
        }
    }
}

/// Poll `check` every 10ms of (virtual) time for up to a minute
pub async fn wait_for(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..6000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
