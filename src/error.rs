//! Error types for Beacon talk

use thiserror::Error;

/// Result type alias for Beacon talk operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the talk runtime and its adapters
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio encoding/decoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// Capture device or process error
    #[error("capture error: {0}")]
    Capture(String),

    /// Playback device or process error
    #[error("playback error: {0}")]
    Playback(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Agent dispatch or transcript error
    #[error("agent error: {0}")]
    Agent(String),

    /// A collaborator call did not finish in time
    #[error("timed out: {0}")]
    Timeout(&'static str),

    /// A control action was rejected
    #[error("{0}")]
    Control(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
