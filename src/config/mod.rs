//! Configuration management for Beacon talk

pub mod file;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::voice::{DEFAULT_MAX_PHRASE_DURATION, DEFAULT_MIN_SPEECH_RMS, WakePhrase};
use crate::{Error, Result};

use self::file::TalkConfigFile;

/// Default control API port
pub const DEFAULT_PORT: u16 = 18791;

/// Default transcript session key
pub const DEFAULT_SESSION_KEY: &str = "talk";

/// Beacon talk configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Speech-to-text
    pub stt: SttConfig,

    /// Text-to-speech
    pub tts: TtsConfig,

    /// Microphone
    pub capture: CaptureConfig,

    /// Speaker
    pub playback: PlaybackConfig,

    /// Wake phrase listener
    pub wake: WakeConfig,

    /// Chat agent
    pub agent: AgentConfig,

    /// Control API server
    pub server: ServerConfig,
}

/// Speech-to-text provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttProvider {
    /// Self-hosted Whisper sidecar (`POST /transcribe`)
    Local,
    /// OpenAI-compatible `/v1/audio/transcriptions`
    OpenAi,
    /// Deepgram `/v1/listen`
    Deepgram,
}

impl SttProvider {
    const fn default_endpoint(self) -> &'static str {
        match self {
            Self::Local => "http://localhost:9000",
            Self::OpenAi => "https://api.openai.com",
            Self::Deepgram => "https://api.deepgram.com",
        }
    }

    const fn default_model(self) -> &'static str {
        match self {
            Self::Local => "base",
            Self::OpenAi => "whisper-1",
            Self::Deepgram => "nova-2",
        }
    }

    const fn key_var(self) -> Option<&'static str> {
        match self {
            Self::Local => None,
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Deepgram => Some("DEEPGRAM_API_KEY"),
        }
    }
}

impl FromStr for SttProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "local" | "whisper" => Ok(Self::Local),
            "openai" => Ok(Self::OpenAi),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }
}

/// Speech-to-text configuration
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub provider: SttProvider,

    /// Base URL of the provider
    pub endpoint: String,

    pub api_key: Option<String>,

    /// Model identifier
    pub model: String,

    /// Language hint passed with every request
    pub language: Option<String>,

    /// Per-request timeout
    pub timeout: Duration,
}

/// Text-to-speech provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsProvider {
    /// OpenAI-compatible `/v1/audio/speech`
    OpenAi,
    /// ElevenLabs `/v1/text-to-speech/{voice}`
    ElevenLabs,
}

impl TtsProvider {
    const fn default_endpoint(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com",
            Self::ElevenLabs => "https://api.elevenlabs.io",
        }
    }

    const fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "tts-1",
            Self::ElevenLabs => "eleven_multilingual_v2",
        }
    }

    const fn default_voice(self) -> &'static str {
        match self {
            Self::OpenAi => "alloy",
            // "Rachel"
            Self::ElevenLabs => "21m00Tcm4TlvDq8ikWAM",
        }
    }

    const fn key_var(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::ElevenLabs => "ELEVENLABS_API_KEY",
        }
    }
}

impl FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "elevenlabs" | "eleven_labs" => Ok(Self::ElevenLabs),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

/// Text-to-speech configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub provider: TtsProvider,

    /// Base URL of the provider
    pub endpoint: String,

    pub api_key: Option<String>,

    /// Default model
    pub model: String,

    /// Default voice
    pub voice: String,

    /// Default speed multiplier (0.25 to 4.0)
    pub speed: Option<f32>,

    /// Per-request timeout
    pub timeout: Duration,
}

/// Where microphone frames come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureBackend {
    /// Native input device
    #[default]
    Cpal,
    /// External recorder writing raw PCM to stdout
    Command,
}

impl FromStr for CaptureBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cpal" | "device" => Ok(Self::Cpal),
            "command" | "process" => Ok(Self::Command),
            other => Err(Error::Config(format!("unknown capture backend: {other}"))),
        }
    }
}

/// Microphone configuration
#[derive(Debug, Clone, Default)]
pub struct CaptureConfig {
    pub backend: CaptureBackend,

    /// Input device name (default device when unset)
    pub device: Option<String>,

    /// Recorder command line for the command backend
    pub command: Option<String>,
}

/// Where synthesized speech is played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackBackend {
    /// Native output device
    #[default]
    Cpal,
    /// External player given a WAV file path
    Command,
}

impl FromStr for PlaybackBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cpal" | "device" => Ok(Self::Cpal),
            "command" | "process" => Ok(Self::Command),
            other => Err(Error::Config(format!("unknown playback backend: {other}"))),
        }
    }
}

/// Speaker configuration
#[derive(Debug, Clone, Default)]
pub struct PlaybackConfig {
    pub backend: PlaybackBackend,

    /// Output device name (default device when unset)
    pub device: Option<String>,

    /// Player command line for the command backend
    pub command: Option<String>,
}

/// Wake phrase listener configuration
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Start the background listener
    pub enabled: bool,

    /// Phrase built from the configured word list
    pub phrase: WakePhrase,

    /// Minimum speech RMS for the listener's VAD
    pub threshold: f32,

    /// Longest wake phrase capture
    pub max_phrase: Duration,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            phrase: WakePhrase::parse("hey beacon"),
            threshold: DEFAULT_MIN_SPEECH_RMS,
            max_phrase: DEFAULT_MAX_PHRASE_DURATION,
        }
    }
}

/// Chat agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// OpenAI-compatible base URL
    pub endpoint: String,

    pub api_key: Option<String>,

    /// Chat model
    pub model: String,

    /// System prompt override
    pub system_prompt: Option<String>,

    /// Transcript session key
    pub session_key: String,
}

/// Control API server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
}

fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

impl Config {
    /// Load configuration from the environment and the TOML config file
    ///
    /// With `path`, that file must exist and parse; otherwise the standard
    /// location is tried and ignored when absent.
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file is unreadable or a value is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = match path {
            Some(path) => file::read_config_file(path)?,
            None => file::load_config_file(),
        };
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// Precedence is env > toml > default.
    ///
    /// # Errors
    ///
    /// Returns error if a provider/backend name or numeric range is invalid
    #[allow(clippy::too_many_lines)]
    pub fn from_sources<F>(fc: TalkConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // STT config (env > toml > default)
        let stt_provider = env("BEACON_STT_PROVIDER")
            .or(fc.stt.provider)
            .map(|p| p.parse::<SttProvider>())
            .transpose()?
            .unwrap_or(SttProvider::Local);
        let stt = SttConfig {
            provider: stt_provider,
            endpoint: env("BEACON_STT_ENDPOINT")
                .or(fc.stt.endpoint)
                .unwrap_or_else(|| stt_provider.default_endpoint().to_string()),
            api_key: env("BEACON_STT_API_KEY")
                .or(fc.stt.api_key)
                .or_else(|| stt_provider.key_var().and_then(&env)),
            model: env("BEACON_STT_MODEL")
                .or(fc.stt.model)
                .unwrap_or_else(|| stt_provider.default_model().to_string()),
            language: env("BEACON_STT_LANGUAGE")
                .or(fc.stt.language)
                .filter(|l| !l.is_empty()),
            timeout: Duration::from_secs(
                env("BEACON_STT_TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .or(fc.stt.timeout_secs)
                    .unwrap_or(30),
            ),
        };

        // TTS config (env > toml > default)
        let tts_provider = env("BEACON_TTS_PROVIDER")
            .or(fc.tts.provider)
            .map(|p| p.parse::<TtsProvider>())
            .transpose()?
            .unwrap_or(TtsProvider::OpenAi);
        let tts_speed = env("BEACON_TTS_SPEED")
            .and_then(|s| s.parse().ok())
            .or(fc.tts.speed);
        if let Some(speed) = tts_speed
            && !(0.25..=4.0).contains(&speed)
        {
            return Err(Error::Config(format!(
                "tts.speed must be between 0.25 and 4.0, got {speed}"
            )));
        }
        let tts = TtsConfig {
            provider: tts_provider,
            endpoint: env("BEACON_TTS_ENDPOINT")
                .or(fc.tts.endpoint)
                .unwrap_or_else(|| tts_provider.default_endpoint().to_string()),
            api_key: env("BEACON_TTS_API_KEY")
                .or(fc.tts.api_key)
                .or_else(|| env(tts_provider.key_var())),
            model: env("BEACON_TTS_MODEL")
                .or(fc.tts.model)
                .unwrap_or_else(|| tts_provider.default_model().to_string()),
            voice: env("BEACON_TTS_VOICE")
                .or(fc.tts.voice)
                .unwrap_or_else(|| tts_provider.default_voice().to_string()),
            speed: tts_speed,
            timeout: Duration::from_secs(
                env("BEACON_TTS_TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .or(fc.tts.timeout_secs)
                    .unwrap_or(30),
            ),
        };

        // Capture config; a configured command implies the command backend
        let capture_command = env("BEACON_CAPTURE_COMMAND").or(fc.capture.command);
        let capture = CaptureConfig {
            backend: env("BEACON_CAPTURE_BACKEND")
                .or(fc.capture.backend)
                .map(|b| b.parse::<CaptureBackend>())
                .transpose()?
                .unwrap_or(if capture_command.is_some() {
                    CaptureBackend::Command
                } else {
                    CaptureBackend::Cpal
                }),
            device: env("BEACON_CAPTURE_DEVICE").or(fc.capture.device),
            command: capture_command,
        };

        let playback_command = env("BEACON_PLAYBACK_COMMAND").or(fc.playback.command);
        let playback = PlaybackConfig {
            backend: env("BEACON_PLAYBACK_BACKEND")
                .or(fc.playback.backend)
                .map(|b| b.parse::<PlaybackBackend>())
                .transpose()?
                .unwrap_or(if playback_command.is_some() {
                    PlaybackBackend::Command
                } else {
                    PlaybackBackend::Cpal
                }),
            device: env("BEACON_PLAYBACK_DEVICE").or(fc.playback.device),
            command: playback_command,
        };

        // Wake config (env > toml > default)
        let wake_default = WakeConfig::default();
        let threshold = env("BEACON_WAKE_THRESHOLD")
            .and_then(|s| s.parse().ok())
            .or(fc.wake.threshold)
            .unwrap_or(wake_default.threshold);
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(Error::Config(format!(
                "wake.threshold must be between 0 and 1, got {threshold}"
            )));
        }
        let max_phrase_secs: Option<f32> = env("BEACON_WAKE_MAX_PHRASE_SECS")
            .and_then(|s| s.parse().ok())
            .or(fc.wake.max_phrase_secs);
        let max_phrase = match max_phrase_secs {
            Some(secs) => Duration::try_from_secs_f32(secs)
                .ok()
                .filter(|d| !d.is_zero())
                .ok_or_else(|| {
                    Error::Config(format!("wake.max_phrase_secs must be positive, got {secs}"))
                })?,
            None => wake_default.max_phrase,
        };
        let wake = WakeConfig {
            enabled: env("BEACON_WAKE_ENABLED")
                .map(|v| parse_bool(&v))
                .or(fc.wake.enabled)
                .unwrap_or(wake_default.enabled),
            phrase: env("BEACON_WAKE_WORDS")
                .or(fc.wake.words)
                .map_or(wake_default.phrase, |w| WakePhrase::parse(&w)),
            threshold,
            max_phrase,
        };

        // Agent config (env > toml > default)
        let agent = AgentConfig {
            endpoint: env("BEACON_AGENT_ENDPOINT")
                .or(fc.agent.endpoint)
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            api_key: env("BEACON_AGENT_API_KEY")
                .or(fc.agent.api_key)
                .or_else(|| env("OPENAI_API_KEY")),
            model: env("BEACON_AGENT_MODEL")
                .or(fc.agent.model)
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            system_prompt: env("BEACON_AGENT_SYSTEM_PROMPT").or(fc.agent.system_prompt),
            session_key: env("BEACON_AGENT_SESSION_KEY")
                .or(fc.agent.session_key)
                .unwrap_or_else(|| DEFAULT_SESSION_KEY.to_string()),
        };

        let server = ServerConfig {
            port: env("BEACON_TALK_PORT")
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(DEFAULT_PORT),
        };

        Ok(Self {
            stt,
            tts,
            capture,
            playback,
            wake,
            agent,
            server,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn parse_file(toml: &str) -> TalkConfigFile {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(TalkConfigFile::default(), env_of(&[])).unwrap();

        assert_eq!(config.stt.provider, SttProvider::Local);
        assert_eq!(config.stt.endpoint, "http://localhost:9000");
        assert_eq!(config.tts.provider, TtsProvider::OpenAi);
        assert_eq!(config.tts.voice, "alloy");
        assert_eq!(config.capture.backend, CaptureBackend::Cpal);
        assert!(!config.wake.enabled);
        assert_eq!(config.wake.phrase.as_str(), "hey beacon");
        assert_eq!(config.wake.max_phrase, Duration::from_secs(5));
        assert_eq!(config.agent.session_key, "talk");
        assert_eq!(config.server.port, DEFAULT_PORT);
    }

    #[test]
    fn test_env_overrides_file() {
        let fc = parse_file(
            r#"
[wake]
enabled = false
words = "ok computer"

[server]
port = 9100
"#,
        );
        let env = env_of(&[
            ("BEACON_WAKE_ENABLED", "1"),
            ("BEACON_WAKE_WORDS", "hey openclaw"),
        ]);

        let config = Config::from_sources(fc, env).unwrap();
        assert!(config.wake.enabled);
        assert_eq!(config.wake.phrase.as_str(), "hey openclaw");
        assert_eq!(config.server.port, 9100);
    }

    #[test]
    fn test_provider_key_fallbacks() {
        let fc = parse_file(
            r#"
[stt]
provider = "deepgram"

[tts]
provider = "elevenlabs"
"#,
        );
        let env = env_of(&[
            ("DEEPGRAM_API_KEY", "dg"),
            ("ELEVENLABS_API_KEY", "el"),
            ("OPENAI_API_KEY", "oa"),
        ]);

        let config = Config::from_sources(fc, env).unwrap();
        assert_eq!(config.stt.api_key.as_deref(), Some("dg"));
        assert_eq!(config.stt.model, "nova-2");
        assert_eq!(config.tts.api_key.as_deref(), Some("el"));
        assert_eq!(config.tts.endpoint, "https://api.elevenlabs.io");
        assert_eq!(config.agent.api_key.as_deref(), Some("oa"));
    }

    #[test]
    fn test_command_implies_command_backend() {
        let env = env_of(&[("BEACON_CAPTURE_COMMAND", "arecord -q -f S16_LE -r 16000 -c 1 -t raw")]);
        let config = Config::from_sources(TalkConfigFile::default(), env).unwrap();
        assert_eq!(config.capture.backend, CaptureBackend::Command);
        assert_eq!(config.playback.backend, PlaybackBackend::Cpal);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let env = env_of(&[("BEACON_STT_PROVIDER", "carrier-pigeon")]);
        let err = Config::from_sources(TalkConfigFile::default(), env).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let fc = parse_file("[tts]\nspeed = 9.0\n");
        assert!(Config::from_sources(fc, env_of(&[])).is_err());

        let fc = parse_file("[wake]\nthreshold = 0.0\n");
        assert!(Config::from_sources(fc, env_of(&[])).is_err());

        let fc = parse_file("[wake]\nmax_phrase_secs = -1.0\n");
        assert!(Config::from_sources(fc, env_of(&[])).is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("talk.toml");
        std::fs::write(&path, "[agent]\nmodel = \"gpt-4.1\"\nsession_key = \"kitchen\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.agent.model, "gpt-4.1");
        assert_eq!(config.agent.session_key, "kitchen");

        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
