//! TOML configuration file loading
//!
//! Supports `~/.config/omni/beacon/talk.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct TalkConfigFile {
    /// Speech-to-text configuration
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Text-to-speech configuration
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Microphone configuration
    #[serde(default)]
    pub capture: AudioDeviceFileConfig,

    /// Speaker configuration
    #[serde(default)]
    pub playback: AudioDeviceFileConfig,

    /// Wake phrase configuration
    #[serde(default)]
    pub wake: WakeFileConfig,

    /// Chat agent configuration
    #[serde(default)]
    pub agent: AgentFileConfig,

    /// Control API configuration
    #[serde(default)]
    pub server: ServerFileConfig,
}

/// Speech-to-text configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// Provider ("local", "openai", "deepgram")
    pub provider: Option<String>,

    /// Base URL of the provider
    pub endpoint: Option<String>,

    pub api_key: Option<String>,

    /// Model identifier (e.g. "whisper-1", "nova-2")
    pub model: Option<String>,

    /// Language hint (e.g. "en")
    pub language: Option<String>,

    pub timeout_secs: Option<u64>,
}

/// Text-to-speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// Provider ("openai", "elevenlabs")
    pub provider: Option<String>,

    /// Base URL of the provider
    pub endpoint: Option<String>,

    pub api_key: Option<String>,

    /// Model identifier (e.g. "tts-1")
    pub model: Option<String>,

    /// Voice identifier (e.g. "alloy")
    pub voice: Option<String>,

    /// Speed multiplier
    pub speed: Option<f32>,

    pub timeout_secs: Option<u64>,
}

/// Capture or playback device configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioDeviceFileConfig {
    /// Backend ("cpal", "command")
    pub backend: Option<String>,

    /// Device name for the cpal backend
    pub device: Option<String>,

    /// Command line for the command backend
    pub command: Option<String>,
}

/// Wake phrase configuration
#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    pub enabled: Option<bool>,

    /// Space-separated wake words (e.g. "hey beacon")
    pub words: Option<String>,

    /// Minimum speech RMS for the background listener
    pub threshold: Option<f32>,

    /// Longest wake phrase capture in seconds
    pub max_phrase_secs: Option<f32>,
}

/// Chat agent configuration
#[derive(Debug, Default, Deserialize)]
pub struct AgentFileConfig {
    /// OpenAI-compatible base URL
    pub endpoint: Option<String>,

    pub api_key: Option<String>,

    /// Chat model identifier
    pub model: Option<String>,

    /// System prompt prepended to every conversation
    pub system_prompt: Option<String>,

    /// Transcript session key
    pub session_key: Option<String>,
}

/// Control API configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Control API port
    pub port: Option<u16>,
}

/// Load the TOML config file from the standard path
///
/// Returns `TalkConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> TalkConfigFile {
    let Some(path) = config_file_path() else {
        return TalkConfigFile::default();
    };

    if !path.exists() {
        return TalkConfigFile::default();
    }

    match read_config_file(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            TalkConfigFile::default()
        }
    }
}

/// Read and parse a config file at an explicit path
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML
pub fn read_config_file(path: &Path) -> Result<TalkConfigFile> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/omni/beacon/talk.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("beacon")
            .join("talk.toml")
    })
}
