//! Voice conversation runtime
//!
//! Turns a continuous microphone stream into a listen, transcribe, think,
//! speak loop with barge-in, and runs a background wake phrase listener
//! that activates the conversation hands-free.
//!
//! # Concurrency
//!
//! All mutable state lives in one `TalkState` behind a `std::sync::Mutex`
//! that is never held across an `.await`. Long-running work (capture loops,
//! transcription, reply polling, playback) runs in tokio tasks that capture
//! a lifecycle generation and a turn generation when they start and compare
//! them after every suspension point; a mismatch means the work was
//! superseded and its result is dropped.
//!
//! Exactly one task owns the capture device at a time. Ownership moves
//! through `TalkRuntime::hand_capture_to`, which cancels the previous
//! owner's session and makes the new owner wait for the previous task to
//! finish before opening the device.

pub mod agent;
mod auto_disable;
mod capture_loop;
mod conversation;
mod listener;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use agent::{
    AgentGateway, AgentReply, ChatAgent, DispatchMeta, MEDIA_PREFIX, Role, TranscriptEntry,
    wait_for_reply,
};
pub use conversation::{UserCommand, parse_command};

use self::auto_disable::AutoDisable;
use crate::config::{Config, WakeConfig};
use crate::voice::{
    self, CaptureSource, PlaybackOutcome, PlaybackSink, SpeechRequest, SpeechToText, Synthesizer,
    TextToSpeech, Transcriber, WakePhrase,
};
use crate::{Error, Result};

/// Spoken replies shorter than this (non-whitespace chars) can't be interrupted
const MIN_INTERRUPTIBLE_CHARS: usize = 3;

/// Conversation phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Listening,
    Thinking,
    Speaking,
}

/// How the conversation was turned on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// Control API or CLI flag
    Manual,
    /// Wake phrase match
    Wake,
}

/// Which loop currently holds the capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "owner", content = "generation", rename_all = "lowercase")]
pub enum CaptureOwner {
    None,
    /// Wake listener run with this listener generation
    Listener(u64),
    /// Conversation with this lifecycle generation
    Conversation(u64),
}

/// Runtime timing knobs
#[derive(Debug, Clone)]
pub struct TalkTimings {
    /// Interval between transcript history reads
    pub reply_poll_interval: Duration,
    /// How long to wait for an assistant reply
    pub reply_timeout: Duration,
    /// Inactivity after wake-triggered playback before turning off
    pub auto_disable: Duration,
    /// Backoff before reopening a capture stream that ended
    pub capture_restart_delay: Duration,
    /// Bound on waiting for the previous capture owner to release the device
    pub handoff_timeout: Duration,
    pub transcribe_timeout: Duration,
    pub dispatch_timeout: Duration,
    pub synthesize_timeout: Duration,
    pub playback_timeout: Duration,
}

impl Default for TalkTimings {
    fn default() -> Self {
        Self {
            reply_poll_interval: Duration::from_millis(300),
            reply_timeout: Duration::from_secs(45),
            auto_disable: Duration::from_secs(20),
            capture_restart_delay: Duration::from_millis(500),
            handoff_timeout: Duration::from_secs(2),
            transcribe_timeout: Duration::from_secs(30),
            dispatch_timeout: Duration::from_secs(10),
            synthesize_timeout: Duration::from_secs(30),
            playback_timeout: Duration::from_secs(300),
        }
    }
}

/// Runtime settings
#[derive(Debug, Clone)]
pub struct TalkOptions {
    /// Transcript session the conversation writes to
    pub session_key: String,
    /// Language hint for transcription
    pub language: Option<String>,
    /// Synthesis defaults; `text` is ignored
    pub speech: SpeechRequest,
    /// Wake listener settings
    pub wake: WakeConfig,
    pub timings: TalkTimings,
}

impl Default for TalkOptions {
    fn default() -> Self {
        Self {
            session_key: crate::config::DEFAULT_SESSION_KEY.to_string(),
            language: None,
            speech: SpeechRequest {
                voice: "alloy".to_string(),
                model: "tts-1".to_string(),
                ..SpeechRequest::default()
            },
            wake: WakeConfig::default(),
            timings: TalkTimings::default(),
        }
    }
}

impl TalkOptions {
    /// Derive settings from loaded configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            session_key: config.agent.session_key.clone(),
            language: config.stt.language.clone(),
            speech: SpeechRequest::from_config(&config.tts, String::new()),
            wake: config.wake.clone(),
            timings: TalkTimings {
                transcribe_timeout: config.stt.timeout,
                synthesize_timeout: config.tts.timeout,
                ..TalkTimings::default()
            },
        }
    }
}

/// External collaborators
#[derive(Clone)]
pub struct TalkDeps {
    pub capture: Arc<dyn CaptureSource>,
    pub playback: Arc<dyn PlaybackSink>,
    pub transcriber: Arc<dyn Transcriber>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub agent: Arc<dyn AgentGateway>,
}

impl TalkDeps {
    /// Build the configured adapters
    ///
    /// # Errors
    ///
    /// Returns error if any adapter is misconfigured
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            capture: voice::capture_from_config(&config.capture)?,
            playback: voice::playback_from_config(&config.playback)?,
            transcriber: Arc::new(SpeechToText::new(&config.stt)?),
            synthesizer: Arc::new(TextToSpeech::new(&config.tts)?),
            agent: Arc::new(ChatAgent::new(&config.agent)?),
        })
    }
}

/// Wake listener status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WakeStatus {
    pub enabled: bool,
    pub listener_active: bool,
    pub generation: u64,
    pub phrase: String,
    pub words: Vec<String>,
}

/// Snapshot of the runtime
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TalkStatus {
    pub phase: Phase,
    pub enabled: bool,
    pub paused: bool,
    pub activation: Option<Activation>,
    pub wake_triggered: bool,
    pub auto_disable_armed: bool,
    pub lifecycle: u64,
    pub turn: u64,
    pub capture: CaptureOwner,
    pub wake: WakeStatus,
}

struct CaptureSlot {
    owner: CaptureOwner,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

struct WakeState {
    enabled: bool,
    phrase: WakePhrase,
    generation: u64,
    listener_active: bool,
    warned_empty: bool,
}

struct TalkState {
    phase: Phase,
    enabled: bool,
    paused: bool,
    lifecycle: u64,
    turn: u64,
    activation: Option<Activation>,
    auto_disable: AutoDisable,
    capture: CaptureSlot,
    playback_cancel: Option<CancellationToken>,
    last_spoken: Option<String>,
    wake: WakeState,
}

impl TalkState {
    fn new(wake: &WakeConfig) -> Self {
        Self {
            phase: Phase::Idle,
            enabled: false,
            paused: false,
            lifecycle: 0,
            turn: 0,
            activation: None,
            auto_disable: AutoDisable::default(),
            capture: CaptureSlot {
                owner: CaptureOwner::None,
                cancel: None,
                task: None,
            },
            playback_cancel: None,
            last_spoken: None,
            wake: WakeState {
                enabled: false,
                phrase: wake.phrase.clone(),
                generation: 0,
                listener_active: false,
                warned_empty: false,
            },
        }
    }

    const fn lifecycle_current(&self, lifecycle: u64) -> bool {
        self.enabled && self.lifecycle == lifecycle
    }

    const fn turn_current(&self, lifecycle: u64, turn: u64) -> bool {
        self.lifecycle_current(lifecycle) && !self.paused && self.turn == turn
    }

    fn listener_current(&self, generation: u64) -> bool {
        self.wake.enabled
            && !self.enabled
            && self.wake.generation == generation
            && self.capture.owner == CaptureOwner::Listener(generation)
    }

    /// Whether the reply being spoken is long enough to barge in on
    fn speech_interruptible(&self) -> bool {
        self.last_spoken.as_deref().is_some_and(|text| {
            text.chars().filter(|c| !c.is_whitespace()).count() >= MIN_INTERRUPTIBLE_CHARS
        })
    }

    fn cancel_playback(&mut self) {
        if let Some(cancel) = self.playback_cancel.take() {
            cancel.cancel();
        }
    }

    fn status(&self) -> TalkStatus {
        TalkStatus {
            phase: self.phase,
            enabled: self.enabled,
            paused: self.paused,
            activation: self.activation,
            wake_triggered: self.auto_disable.activated_by_wake(),
            auto_disable_armed: self.auto_disable.is_armed(),
            lifecycle: self.lifecycle,
            turn: self.turn,
            capture: self.capture.owner,
            wake: WakeStatus {
                enabled: self.wake.enabled,
                listener_active: self.wake.listener_active,
                generation: self.wake.generation,
                phrase: self.wake.phrase.as_str().to_string(),
                words: self.wake.phrase.words().to_vec(),
            },
        }
    }
}

struct Inner {
    deps: TalkDeps,
    options: TalkOptions,
    state: Mutex<TalkState>,
}

/// Handle to the voice conversation runtime
///
/// Cheap to clone; all clones drive the same conversation.
#[derive(Clone)]
pub struct TalkRuntime {
    inner: Arc<Inner>,
}

impl TalkRuntime {
    /// Create an idle runtime
    #[must_use]
    pub fn new(deps: TalkDeps, options: TalkOptions) -> Self {
        let state = TalkState::new(&options.wake);
        Self {
            inner: Arc::new(Inner {
                deps,
                options,
                state: Mutex::new(state),
            }),
        }
    }

    /// Create a runtime with the configured adapters
    ///
    /// # Errors
    ///
    /// Returns error if any adapter is misconfigured
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            TalkDeps::from_config(config)?,
            TalkOptions::from_config(config),
        ))
    }

    fn lock(&self) -> MutexGuard<'_, TalkState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn deps(&self) -> &TalkDeps {
        &self.inner.deps
    }

    pub(crate) fn options(&self) -> &TalkOptions {
        &self.inner.options
    }

    /// Current status snapshot
    #[must_use]
    pub fn status(&self) -> TalkStatus {
        self.lock().status()
    }

    /// Turn the conversation on
    ///
    /// Manual activation of a wake-triggered conversation converts it to a
    /// manual one and cancels its auto-disable timer.
    pub fn enable(&self, activation: Activation) -> TalkStatus {
        let mut state = self.lock();
        self.enable_locked(&mut state, activation);
        state.status()
    }

    /// Turn the conversation off, handing capture back to the wake listener
    pub fn disable(&self) -> TalkStatus {
        let mut state = self.lock();
        self.disable_locked(&mut state);
        state.status()
    }

    /// Release the microphone without ending the conversation
    ///
    /// # Errors
    ///
    /// Returns error if the conversation is not enabled
    pub fn pause(&self) -> Result<TalkStatus> {
        let mut state = self.lock();
        if !state.enabled {
            return Err(Error::Control("talk mode is not enabled".to_string()));
        }
        if !state.paused {
            state.paused = true;
            state.turn += 1;
            state.phase = Phase::Listening;
            state.cancel_playback();
            state.auto_disable.clear();
            self.hand_capture_to(&mut state, CaptureOwner::None);
            tracing::info!(lifecycle = state.lifecycle, "talk mode paused");
        }
        Ok(state.status())
    }

    /// Re-acquire the microphone after [`pause`](Self::pause)
    ///
    /// # Errors
    ///
    /// Returns error if the conversation is not enabled
    pub fn resume(&self) -> Result<TalkStatus> {
        let mut state = self.lock();
        if !state.enabled {
            return Err(Error::Control("talk mode is not enabled".to_string()));
        }
        if state.paused {
            state.paused = false;
            let owner = CaptureOwner::Conversation(state.lifecycle);
            self.hand_capture_to(&mut state, owner);
            self.arm_auto_disable_locked(&mut state);
            tracing::info!(lifecycle = state.lifecycle, "talk mode resumed");
        }
        Ok(state.status())
    }

    /// Enable the background wake listener
    ///
    /// The listener only runs while the conversation is off.
    pub fn enable_wake(&self) -> TalkStatus {
        let mut state = self.lock();
        if !state.wake.enabled {
            state.wake.enabled = true;
            state.wake.warned_empty = false;
            tracing::info!("wake listening enabled");
        }
        if !state.wake.listener_active {
            self.start_listener_locked(&mut state);
        }
        state.status()
    }

    /// Disable the background wake listener
    pub fn disable_wake(&self) -> TalkStatus {
        let mut state = self.lock();
        if state.wake.enabled {
            state.wake.enabled = false;
            state.wake.warned_empty = false;
            tracing::info!("wake listening disabled");
        }
        self.stop_listener_locked(&mut state);
        state.status()
    }

    /// Stop everything and wait for the capture task to release the device
    pub async fn shutdown(&self) {
        let task = {
            let mut state = self.lock();
            state.wake.enabled = false;
            self.stop_listener_locked(&mut state);
            self.disable_locked(&mut state);
            self.hand_capture_to(&mut state, CaptureOwner::None);
            state.capture.task.take()
        };

        if let Some(task) = task
            && tokio::time::timeout(self.options().timings.handoff_timeout, task)
                .await
                .is_err()
        {
            tracing::warn!("capture task did not stop in time");
        }
        tracing::info!("talk runtime shut down");
    }

    fn enable_locked(&self, state: &mut TalkState, activation: Activation) -> u64 {
        if state.enabled {
            if activation == Activation::Manual && state.activation == Some(Activation::Wake) {
                state.activation = Some(Activation::Manual);
                state.auto_disable.set_activated_by_wake(false);
                tracing::info!(lifecycle = state.lifecycle, "wake-triggered talk mode taken over manually");
            }
            return state.lifecycle;
        }

        state.lifecycle += 1;
        state.enabled = true;
        state.paused = false;
        state.phase = Phase::Listening;
        state.activation = Some(activation);
        state.last_spoken = None;
        state
            .auto_disable
            .set_activated_by_wake(activation == Activation::Wake);

        self.stop_listener_locked(state);
        let lifecycle = state.lifecycle;
        self.hand_capture_to(state, CaptureOwner::Conversation(lifecycle));

        tracing::info!(lifecycle, ?activation, "talk mode enabled");
        lifecycle
    }

    fn disable_locked(&self, state: &mut TalkState) {
        if !state.enabled {
            return;
        }

        state.lifecycle += 1;
        state.enabled = false;
        state.paused = false;
        state.phase = Phase::Idle;
        state.activation = None;
        state.last_spoken = None;
        state.auto_disable.set_activated_by_wake(false);
        state.cancel_playback();
        self.hand_capture_to(state, CaptureOwner::None);

        tracing::info!(lifecycle = state.lifecycle, "talk mode disabled");

        self.start_listener_locked(state);
    }

    fn start_listener_locked(&self, state: &mut TalkState) {
        if !state.wake.enabled || state.enabled || state.wake.listener_active {
            return;
        }
        if state.wake.phrase.is_empty() {
            if !state.wake.warned_empty {
                tracing::warn!("wake listening enabled but no wake phrase configured");
                state.wake.warned_empty = true;
            }
            return;
        }

        state.wake.generation += 1;
        state.wake.listener_active = true;
        let generation = state.wake.generation;
        self.hand_capture_to(state, CaptureOwner::Listener(generation));

        tracing::info!(generation, phrase = %state.wake.phrase.as_str(), "wake listener started");
    }

    fn stop_listener_locked(&self, state: &mut TalkState) {
        // Bumping the generation invalidates transcriptions still in flight
        state.wake.generation += 1;
        if !state.wake.listener_active {
            return;
        }
        state.wake.listener_active = false;
        if matches!(state.capture.owner, CaptureOwner::Listener(_)) {
            self.hand_capture_to(state, CaptureOwner::None);
        }
        tracing::debug!(generation = state.wake.generation, "wake listener stopped");
    }

    /// Move capture ownership, cancelling the current owner's session
    ///
    /// The new owner's task receives the previous task handle and waits for
    /// it before opening the device. With `CaptureOwner::None` the handle is
    /// kept for whoever takes over next.
    fn hand_capture_to(&self, state: &mut TalkState, owner: CaptureOwner) {
        if let Some(cancel) = state.capture.cancel.take() {
            cancel.cancel();
        }
        state.capture.owner = owner;

        let cancel = CancellationToken::new();
        let task = match owner {
            CaptureOwner::None => return,
            CaptureOwner::Listener(generation) => {
                let previous = state.capture.task.take();
                tokio::spawn(listener::run(self.clone(), generation, cancel.clone(), previous))
            }
            CaptureOwner::Conversation(lifecycle) => {
                let previous = state.capture.task.take();
                tokio::spawn(conversation::run_capture(
                    self.clone(),
                    lifecycle,
                    cancel.clone(),
                    previous,
                ))
            }
        };
        state.capture.task = Some(task);
        state.capture.cancel = Some(cancel);
    }

    pub(crate) fn owns_capture(&self, owner: CaptureOwner) -> bool {
        self.lock().capture.owner == owner
    }

    pub(crate) fn is_turn_current(&self, lifecycle: u64, turn: u64) -> bool {
        self.lock().turn_current(lifecycle, turn)
    }

    pub(crate) fn is_listener_current(&self, generation: u64) -> bool {
        self.lock().listener_current(generation)
    }

    pub(crate) fn wake_phrase(&self) -> WakePhrase {
        self.lock().wake.phrase.clone()
    }

    /// React to a speech frame; returns true when the turn was interrupted
    pub(crate) fn barge_in(&self, lifecycle: u64) -> bool {
        let mut state = self.lock();
        if !state.lifecycle_current(lifecycle) || state.paused {
            return false;
        }

        match state.phase {
            Phase::Speaking if !state.speech_interruptible() => return false,
            Phase::Speaking | Phase::Thinking => {}
            Phase::Idle | Phase::Listening => return false,
        }

        let from = state.phase;
        state.turn += 1;
        state.phase = Phase::Listening;
        state.cancel_playback();
        tracing::info!(?from, turn = state.turn, "barge-in");
        true
    }

    /// Start a new user turn for finalized speech
    pub(crate) fn begin_turn(&self, lifecycle: u64) -> Option<u64> {
        let mut state = self.lock();
        Self::begin_turn_locked(&mut state, lifecycle)
    }

    fn begin_turn_locked(state: &mut TalkState, lifecycle: u64) -> Option<u64> {
        if !state.lifecycle_current(lifecycle) || state.paused {
            return None;
        }

        state.auto_disable.clear();
        if state.phase == Phase::Speaking {
            state.cancel_playback();
        }
        state.phase = Phase::Listening;
        state.turn += 1;
        Some(state.turn)
    }

    pub(crate) fn enter_thinking(&self, lifecycle: u64, turn: u64) -> Option<DispatchMeta> {
        let mut state = self.lock();
        if !state.turn_current(lifecycle, turn) {
            return None;
        }
        state.phase = Phase::Thinking;
        Some(DispatchMeta {
            message_id: Uuid::new_v4(),
            activation: state.activation.unwrap_or(Activation::Manual),
            turn,
            dispatched_at: Utc::now(),
        })
    }

    pub(crate) fn enter_speaking(
        &self,
        lifecycle: u64,
        turn: u64,
        text: String,
    ) -> Option<CancellationToken> {
        let mut state = self.lock();
        if !state.turn_current(lifecycle, turn) {
            return None;
        }
        let cancel = CancellationToken::new();
        state.phase = Phase::Speaking;
        state.last_spoken = Some(text);
        state.playback_cancel = Some(cancel.clone());
        Some(cancel)
    }

    pub(crate) fn finish_playback(&self, lifecycle: u64, turn: u64, outcome: PlaybackOutcome) {
        let mut state = self.lock();
        if !state.turn_current(lifecycle, turn) {
            return;
        }
        state.phase = Phase::Listening;
        state.playback_cancel = None;
        if outcome == PlaybackOutcome::Completed {
            self.arm_auto_disable_locked(&mut state);
        }
    }

    /// Return a finished or failed turn to listening
    ///
    /// A wake-activated turn that ended without a completed playback (empty
    /// transcript, bare stop, failure) starts the auto-disable timer here.
    pub(crate) fn end_turn(&self, lifecycle: u64, turn: u64) {
        let mut state = self.lock();
        if !state.turn_current(lifecycle, turn) {
            return;
        }
        state.cancel_playback();
        state.phase = Phase::Listening;
        if !state.auto_disable.is_armed() {
            self.arm_auto_disable_locked(&mut state);
        }
    }

    /// Handle a bare "stop": silence playback, dispatch nothing
    pub(crate) fn acknowledge_stop(&self, lifecycle: u64, turn: u64) {
        let mut state = self.lock();
        if !state.turn_current(lifecycle, turn) {
            return;
        }
        state.cancel_playback();
        state.phase = Phase::Listening;
        tracing::info!(turn, "stop requested");
    }

    /// Activate the conversation from a wake phrase match
    pub(crate) fn activate_from_wake(&self, generation: u64, remainder: &str) {
        let first_turn = {
            let mut state = self.lock();
            if !state.listener_current(generation) {
                tracing::debug!(generation, "ignoring wake match from stale listener");
                return;
            }
            let lifecycle = self.enable_locked(&mut state, Activation::Wake);
            let remainder = remainder.trim();
            if remainder.is_empty() {
                // Nothing to answer yet; time out unless a follow-up comes
                self.arm_auto_disable_locked(&mut state);
                None
            } else {
                Self::begin_turn_locked(&mut state, lifecycle)
                    .map(|turn| (lifecycle, turn, remainder.to_string()))
            }
        };

        if let Some((lifecycle, turn, text)) = first_turn {
            tokio::spawn(conversation::run_text_turn(self.clone(), lifecycle, turn, text));
        }
    }

    fn arm_auto_disable_locked(&self, state: &mut TalkState) {
        let runtime = self.clone();
        let delay = self.options().timings.auto_disable;
        let armed = state.auto_disable.arm(move |id| {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                runtime.on_auto_disable_expired(id);
            })
        });
        if let Some(id) = armed {
            tracing::debug!(id, secs = delay.as_secs(), "auto-disable timer armed");
        }
    }

    fn on_auto_disable_expired(&self, id: u64) {
        let mut state = self.lock();
        if !state.auto_disable.take_expired(id) {
            return;
        }
        tracing::info!("no follow-up speech, turning wake-triggered talk mode off");
        self.disable_locked(&mut state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        let state = TalkState::new(&WakeConfig::default());
        let json = serde_json::to_value(state.status()).unwrap();
        assert_eq!(json["phase"], "idle");
        assert_eq!(json["capture"]["owner"], "none");
        assert_eq!(json["wake"]["phrase"], "hey beacon");
        assert_eq!(json["lifecycle"], 0);
    }

    #[test]
    fn test_turn_current_requires_matching_generations() {
        let mut state = TalkState::new(&WakeConfig::default());
        state.enabled = true;
        state.lifecycle = 2;
        state.turn = 5;

        assert!(state.turn_current(2, 5));
        assert!(!state.turn_current(1, 5));
        assert!(!state.turn_current(2, 4));

        state.paused = true;
        assert!(!state.turn_current(2, 5));
    }

    #[test]
    fn test_short_replies_are_not_interruptible() {
        let mut state = TalkState::new(&WakeConfig::default());
        assert!(!state.speech_interruptible());

        state.last_spoken = Some("Ok".to_string());
        assert!(!state.speech_interruptible());

        state.last_spoken = Some(" o k ".to_string());
        assert!(!state.speech_interruptible());

        state.last_spoken = Some("Sure".to_string());
        assert!(state.speech_interruptible());
    }

    #[test]
    fn test_listener_current_requires_ownership() {
        let mut state = TalkState::new(&WakeConfig::default());
        state.wake.enabled = true;
        state.wake.generation = 3;
        assert!(!state.listener_current(3));

        state.capture.owner = CaptureOwner::Listener(3);
        assert!(state.listener_current(3));
        assert!(!state.listener_current(2));

        state.enabled = true;
        assert!(!state.listener_current(3));
    }
}
