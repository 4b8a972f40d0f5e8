//! Text-to-speech (TTS) processing

use async_trait::async_trait;
use serde::Serialize;

use super::directive::SpeechDirective;
use crate::config::{TtsConfig, TtsProvider};
use crate::{Error, Result};

/// A fully resolved synthesis request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeechRequest {
    /// Text to speak
    pub text: String,
    /// Voice identifier
    pub voice: String,
    /// Provider model
    pub model: String,
    /// Speaking rate multiplier
    pub speed: Option<f32>,
    /// Voice stability (ElevenLabs)
    pub stability: Option<f32>,
    /// Similarity boost (ElevenLabs)
    pub similarity: Option<f32>,
    /// Style exaggeration (ElevenLabs)
    pub style: Option<f32>,
    /// Speaker boost (ElevenLabs)
    pub speaker_boost: Option<bool>,
    /// Sampling seed (ElevenLabs)
    pub seed: Option<u32>,
    /// Language hint
    pub language: Option<String>,
}

impl SpeechRequest {
    /// Build a request from configured defaults
    #[must_use]
    pub fn from_config(config: &TtsConfig, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: config.voice.clone(),
            model: config.model.clone(),
            speed: config.speed,
            ..Self::default()
        }
    }

    /// Apply per-reply overrides
    #[must_use]
    pub fn with_directive(mut self, directive: &SpeechDirective) -> Self {
        if let Some(voice) = &directive.voice {
            self.voice.clone_from(voice);
        }
        if let Some(model) = &directive.model {
            self.model.clone_from(model);
        }
        self.speed = directive.speed.or(self.speed);
        self.stability = directive.stability.or(self.stability);
        self.similarity = directive.similarity.or(self.similarity);
        self.style = directive.style.or(self.style);
        self.speaker_boost = directive.speaker_boost.or(self.speaker_boost);
        self.seed = directive.seed.or(self.seed);
        if directive.language.is_some() {
            self.language.clone_from(&directive.language);
        }
        self
    }
}

/// Synthesizes speech from text
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize a request to encoded audio (WAV or MP3)
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>>;
}

/// Synthesizes speech over HTTP
pub struct TextToSpeech {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    provider: TtsProvider,
}

impl TextToSpeech {
    /// Create a client for the configured provider
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing or the HTTP client cannot be built
    pub fn new(config: &TtsConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config(format!("{:?} TTS requires an API key", config.provider)))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
            provider: config.provider,
        })
    }

    /// Synthesize using OpenAI TTS
    async fn synthesize_openai(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            response_format: &'static str,
            #[serde(skip_serializing_if = "Option::is_none")]
            speed: Option<f32>,
        }

        let body = TtsRequest {
            model: &request.model,
            input: &request.text,
            voice: &request.voice,
            response_format: "wav",
            speed: request.speed,
        };

        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }

    /// Synthesize using ElevenLabs TTS
    async fn synthesize_elevenlabs(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct VoiceSettings {
            #[serde(skip_serializing_if = "Option::is_none")]
            stability: Option<f32>,
            #[serde(skip_serializing_if = "Option::is_none")]
            similarity_boost: Option<f32>,
            #[serde(skip_serializing_if = "Option::is_none")]
            style: Option<f32>,
            #[serde(skip_serializing_if = "Option::is_none")]
            use_speaker_boost: Option<bool>,
            #[serde(skip_serializing_if = "Option::is_none")]
            speed: Option<f32>,
        }

        #[derive(Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
            voice_settings: VoiceSettings,
            #[serde(skip_serializing_if = "Option::is_none")]
            seed: Option<u32>,
            #[serde(skip_serializing_if = "Option::is_none")]
            language_code: Option<&'a str>,
        }

        let body = ElevenLabsRequest {
            text: &request.text,
            model_id: &request.model,
            voice_settings: VoiceSettings {
                stability: request.stability,
                similarity_boost: request.similarity,
                style: request.style,
                use_speaker_boost: request.speaker_boost,
                speed: request.speed,
            },
            seed: request.seed,
            language_code: request.language.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/v1/text-to-speech/{}", self.endpoint, request.voice))
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        tracing::debug!(
            chars = request.text.len(),
            voice = %request.voice,
            model = %request.model,
            "synthesizing speech"
        );

        match self.provider {
            TtsProvider::OpenAi => self.synthesize_openai(request).await,
            TtsProvider::ElevenLabs => self.synthesize_elevenlabs(request).await,
        }
        .map_err(|e| match e {
            Error::Http(e) if e.is_timeout() => Error::Timeout("synthesis"),
            other => other,
        })
    }
}
