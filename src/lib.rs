//! Beacon Talk - Hands-free voice conversation runtime for AI assistants
//!
//! This library provides the pieces of a continuous voice conversation:
//! - Audio framing, voice activity detection and utterance segmentation
//! - Wake phrase matching and a background wake listener
//! - The conversation state machine with barge-in and auto-disable
//! - STT/TTS adapters and spoken-reply directives
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Control (HTTP API / CLI)                │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Talk Runtime                        │
//! │   Wake Listener  │  Conversation  │  Auto-disable   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                     Voice                            │
//! │   Capture │ VAD │ Segments │ STT │ TTS │ Playback   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod talk;
pub mod voice;

pub use api::ApiServer;
pub use config::Config;
pub use error::{Error, Result};
pub use talk::{
    Activation, AgentGateway, CaptureOwner, Phase, TalkDeps, TalkOptions, TalkRuntime, TalkStatus,
    TalkTimings, WakeStatus,
};
