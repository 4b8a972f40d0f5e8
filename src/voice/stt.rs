//! Speech-to-text (STT) processing

use async_trait::async_trait;

use crate::config::{SttConfig, SttProvider};
use crate::{Error, Result};

/// Transcribes captured speech
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe WAV audio to text
    ///
    /// An empty string means no speech was recognized.
    ///
    /// # Errors
    ///
    /// Returns error if transcription fails
    async fn transcribe(&self, wav: Vec<u8>, language: Option<&str>) -> Result<String>;
}

/// Response from Whisper-style transcription APIs
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// Transcribes speech over HTTP
pub struct SpeechToText {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    provider: SttProvider,
}

impl SpeechToText {
    /// Create a client for the configured provider
    ///
    /// # Errors
    ///
    /// Returns error if a hosted provider has no API key or the HTTP client
    /// cannot be built
    pub fn new(config: &SttConfig) -> Result<Self> {
        if config.provider != SttProvider::Local && config.api_key.is_none() {
            return Err(Error::Config(format!(
                "{:?} STT requires an API key",
                config.provider
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            provider: config.provider,
        })
    }

    /// Transcribe using a local Whisper sidecar (`POST /transcribe`)
    async fn transcribe_local(&self, audio: Vec<u8>, language: Option<&str>) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting local Whisper transcription");

        let mut form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(audio)
                .file_name("audio.wav")
                .mime_str("audio/wav")
                .map_err(|e| Error::Stt(e.to_string()))?,
        );
        if let Some(language) = language {
            form = form.text("language", language.to_string());
        }

        let response = self
            .client
            .post(format!("{}/transcribe", self.endpoint))
            .multipart(form)
            .send()
            .await?;

        let result: WhisperResponse = Self::check(response, "Whisper").await?.json().await?;
        Ok(result.text.trim().to_string())
    }

    /// Transcribe using an OpenAI-compatible endpoint
    async fn transcribe_openai(&self, audio: Vec<u8>, language: Option<&str>) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting OpenAI transcription");

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());
        if let Some(language) = language {
            form = form.text("language", language.to_string());
        }

        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.endpoint))
            .bearer_auth(self.api_key.as_deref().unwrap_or_default())
            .multipart(form)
            .send()
            .await?;

        let result: WhisperResponse = Self::check(response, "OpenAI").await?.json().await?;
        Ok(result.text.trim().to_string())
    }

    /// Transcribe using Deepgram
    async fn transcribe_deepgram(&self, audio: Vec<u8>, language: Option<&str>) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Deepgram transcription");

        let mut query = vec![("model", self.model.as_str()), ("punctuate", "true")];
        if let Some(language) = language {
            query.push(("language", language));
        }

        let response = self
            .client
            .post(format!("{}/v1/listen", self.endpoint))
            .query(&query)
            .header(
                "Authorization",
                format!("Token {}", self.api_key.as_deref().unwrap_or_default()),
            )
            .header("Content-Type", "audio/wav")
            .body(audio)
            .send()
            .await?;

        let result: DeepgramResponse = Self::check(response, "Deepgram").await?.json().await?;

        let transcript = result
            .results
            .channels
            .first()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.trim().to_string())
            .unwrap_or_default();

        Ok(transcript)
    }

    async fn check(response: reqwest::Response, provider: &str) -> Result<reqwest::Response> {
        let status = response.status();
        tracing::debug!(status = %status, provider, "received response");

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %body, provider, "STT API error");
        Err(Error::Stt(format!("{provider} API error {status}: {body}")))
    }
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, wav: Vec<u8>, language: Option<&str>) -> Result<String> {
        let transcript = match self.provider {
            SttProvider::Local => self.transcribe_local(wav, language).await,
            SttProvider::OpenAi => self.transcribe_openai(wav, language).await,
            SttProvider::Deepgram => self.transcribe_deepgram(wav, language).await,
        }
        .map_err(|e| match e {
            Error::Http(e) if e.is_timeout() => Error::Timeout("transcription"),
            other => other,
        })?;

        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config(provider: SttProvider, endpoint: &str) -> SttConfig {
        SttConfig {
            provider,
            endpoint: endpoint.to_string(),
            api_key: Some("test-key".to_string()),
            model: "whisper-1".to_string(),
            language: None,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_local_whisper_transcribe() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transcribe"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": " hello world "})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let stt = SpeechToText::new(&config(SttProvider::Local, &server.uri())).unwrap();
        let text = stt.transcribe(b"RIFF".to_vec(), Some("en")).await.unwrap();
        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn test_local_whisper_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transcribe"))
            .respond_with(ResponseTemplate::new(503).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let stt = SpeechToText::new(&config(SttProvider::Local, &server.uri())).unwrap();
        let err = stt.transcribe(Vec::new(), None).await.unwrap_err();
        assert!(matches!(err, Error::Stt(msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn test_openai_transcribe_sends_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "hi"})))
            .expect(1)
            .mount(&server)
            .await;

        let stt = SpeechToText::new(&config(SttProvider::OpenAi, &server.uri())).unwrap();
        assert_eq!(stt.transcribe(Vec::new(), None).await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn test_deepgram_transcribe() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/listen"))
            .and(query_param("language", "fr"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": {"channels": [{"alternatives": [{"transcript": "bonjour"}]}]}
            })))
            .mount(&server)
            .await;

        let stt = SpeechToText::new(&config(SttProvider::Deepgram, &server.uri())).unwrap();
        assert_eq!(stt.transcribe(Vec::new(), Some("fr")).await.unwrap(), "bonjour");
    }

    #[test]
    fn test_hosted_provider_requires_key() {
        let mut cfg = config(SttProvider::OpenAi, "http://localhost");
        cfg.api_key = None;
        assert!(SpeechToText::new(&cfg).is_err());

        cfg.provider = SttProvider::Local;
        assert!(SpeechToText::new(&cfg).is_ok());
    }
}
