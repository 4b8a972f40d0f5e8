//! Chat agent gateway
//!
//! The runtime talks to the agent through two calls: fire-and-forget
//! dispatch of a user message, and a transcript history read. Replies are
//! discovered by polling history for the assistant entry answering that
//! dispatch's message id.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Activation;
use crate::config::AgentConfig;
use crate::{Error, Result};

/// Prefix marking a transcript line as a pointer to synthesized audio
pub const MEDIA_PREFIX: &str = "MEDIA:";

/// Prompt used when none is configured
const DEFAULT_SYSTEM_PROMPT: &str = "You are a voice assistant. Your replies are read aloud, \
so answer in short, natural spoken sentences without markdown, lists or code.";

/// Prior entries sent with each completion request
const CONTEXT_ENTRIES: usize = 20;

/// Entries kept per session transcript
const MAX_TRANSCRIPT_ENTRIES: usize = 200;

/// Author of a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One message in a session transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Message this entry answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Uuid>,
}

impl TranscriptEntry {
    /// Create an entry stamped now
    #[must_use]
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text: text.into(),
            timestamp: Utc::now(),
            reply_to: None,
        }
    }

    /// Mark this entry as the answer to message `id`
    #[must_use]
    pub fn in_reply_to(mut self, id: Uuid) -> Self {
        self.reply_to = Some(id);
        self
    }

    /// Path of synthesized audio referenced by a `MEDIA:` line
    #[must_use]
    pub fn media_path(&self) -> Option<PathBuf> {
        self.text.lines().find_map(|line| {
            line.trim()
                .strip_prefix(MEDIA_PREFIX)
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
        })
    }
}

/// Context sent along with a dispatched message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchMeta {
    /// Id of the dispatched message; the reply carries it in `reply_to`
    pub message_id: Uuid,
    /// How the conversation was activated
    pub activation: Activation,
    /// Turn generation the message belongs to
    pub turn: u64,
    /// When the runtime handed the message over
    pub dispatched_at: DateTime<Utc>,
}

/// What the runtime should do with an assistant reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentReply {
    /// Synthesize and speak this text
    Text(String),
    /// Play this pre-synthesized audio file
    Media(PathBuf),
}

impl From<&TranscriptEntry> for AgentReply {
    fn from(entry: &TranscriptEntry) -> Self {
        entry
            .media_path()
            .map_or_else(|| Self::Text(entry.text.clone()), Self::Media)
    }
}

/// Chat agent the conversation talks to
#[async_trait]
pub trait AgentGateway: Send + Sync {
    /// Hand a user message to the agent
    ///
    /// Returns once the message is accepted. The reply shows up in history
    /// as an assistant entry whose `reply_to` is `meta.message_id`.
    ///
    /// # Errors
    ///
    /// Returns error if the message is rejected
    async fn dispatch(&self, session_key: &str, text: &str, meta: &DispatchMeta) -> Result<()>;

    /// Most recent transcript entries, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if the transcript cannot be read
    async fn history(&self, session_key: &str, limit: usize) -> Result<Vec<TranscriptEntry>>;
}

/// Poll history until the assistant entry answering `message_id` appears
///
/// Replies to other messages, including late answers to superseded turns,
/// are ignored.
///
/// Returns `Ok(None)` as soon as `is_current` reports the turn was
/// superseded.
///
/// # Errors
///
/// Returns `Error::Timeout` if no reply shows up before `timeout`
pub async fn wait_for_reply<F>(
    agent: &dyn AgentGateway,
    session_key: &str,
    message_id: Uuid,
    poll_interval: Duration,
    timeout: Duration,
    is_current: F,
) -> Result<Option<AgentReply>>
where
    F: Fn() -> bool + Send + Sync,
{
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if !is_current() {
            return Ok(None);
        }

        match agent.history(session_key, CONTEXT_ENTRIES).await {
            Ok(entries) => {
                let reply = entries
                    .iter()
                    .find(|e| e.role == Role::Assistant && e.reply_to == Some(message_id));
                if let Some(entry) = reply {
                    return Ok(Some(AgentReply::from(entry)));
                }
            }
            Err(e) => tracing::debug!(error = %e, "transcript read failed, retrying"),
        }

        if tokio::time::Instant::now() + poll_interval > deadline {
            return Err(Error::Timeout("agent reply"));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

type Sessions = HashMap<String, Vec<TranscriptEntry>>;

struct ChatInner {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    system_prompt: String,
    sessions: Mutex<Sessions>,
}

/// In-process agent backed by an OpenAI-compatible chat completion API
///
/// Keeps per-session transcripts in memory; each dispatch appends the user
/// entry and spawns a completion whose answer is appended as an assistant
/// entry.
#[derive(Clone)]
pub struct ChatAgent {
    inner: Arc<ChatInner>,
}

impl ChatAgent {
    /// Create an agent from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            inner: Arc::new(ChatInner {
                client,
                endpoint: config.endpoint.trim_end_matches('/').to_string(),
                api_key: config.api_key.clone(),
                model: config.model.clone(),
                system_prompt: config
                    .system_prompt
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
                sessions: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Append an entry to a session transcript, dropping the oldest past the cap
    pub fn record(&self, session_key: &str, entry: TranscriptEntry) {
        let mut sessions = self
            .inner
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let entries = sessions.entry(session_key.to_string()).or_default();
        entries.push(entry);
        if entries.len() > MAX_TRANSCRIPT_ENTRIES {
            let excess = entries.len() - MAX_TRANSCRIPT_ENTRIES;
            entries.drain(..excess);
        }
    }

    fn recent(&self, session_key: &str, limit: usize) -> Vec<TranscriptEntry> {
        let sessions = self
            .inner
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        sessions.get(session_key).map_or_else(Vec::new, |entries| {
            entries[entries.len().saturating_sub(limit)..].to_vec()
        })
    }

    async fn complete(&self, context: &[TranscriptEntry]) -> Result<String> {
        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<ChatMessage<'a>>,
        }

        #[derive(Serialize)]
        struct ChatMessage<'a> {
            role: &'static str,
            content: &'a str,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }

        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: Option<String>,
        }

        let messages = std::iter::once(ChatMessage {
            role: Role::System.as_str(),
            content: &self.inner.system_prompt,
        })
        .chain(
            context
                .iter()
                .filter(|e| e.media_path().is_none())
                .map(|e| ChatMessage {
                    role: e.role.as_str(),
                    content: &e.text,
                }),
        )
        .collect();

        let request = ChatRequest {
            model: &self.inner.model,
            messages,
        };

        let mut builder = self
            .inner
            .client
            .post(format!("{}/v1/chat/completions", self.inner.endpoint))
            .json(&request);
        if let Some(key) = &self.inner.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Agent(format!("chat completion error {status}: {body}")));
        }

        let chat_response: ChatResponse = response.json().await?;
        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::Agent("chat completion returned no content".to_string()))
    }
}

#[async_trait]
impl AgentGateway for ChatAgent {
    async fn dispatch(&self, session_key: &str, text: &str, meta: &DispatchMeta) -> Result<()> {
        let message_id = meta.message_id;
        self.record(
            session_key,
            TranscriptEntry {
                id: message_id,
                ..TranscriptEntry::new(Role::User, text)
            },
        );
        let context = self.recent(session_key, CONTEXT_ENTRIES);

        tracing::debug!(
            session_key,
            turn = meta.turn,
            activation = ?meta.activation,
            "dispatching to chat agent"
        );

        let agent = self.clone();
        let session_key = session_key.to_string();
        tokio::spawn(async move {
            match agent.complete(&context).await {
                Ok(reply) => {
                    tracing::debug!(chars = reply.len(), "chat agent replied");
                    agent.record(
                        &session_key,
                        TranscriptEntry::new(Role::Assistant, reply).in_reply_to(message_id),
                    );
                }
                Err(e) => tracing::warn!(error = %e, "chat completion failed"),
            }
        });

        Ok(())
    }

    async fn history(&self, session_key: &str, limit: usize) -> Result<Vec<TranscriptEntry>> {
        Ok(self.recent(session_key, limit))
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config(endpoint: &str) -> AgentConfig {
        AgentConfig {
            endpoint: endpoint.to_string(),
            api_key: Some("agent-key".to_string()),
            model: "gpt-4o-mini".to_string(),
            system_prompt: None,
            session_key: "talk".to_string(),
        }
    }

    fn meta() -> DispatchMeta {
        DispatchMeta {
            message_id: Uuid::new_v4(),
            activation: Activation::Manual,
            turn: 1,
            dispatched_at: Utc::now(),
        }
    }

    #[test]
    fn test_media_path() {
        let entry = TranscriptEntry::new(Role::Assistant, "Here you go\nMEDIA: /tmp/reply.mp3");
        assert_eq!(entry.media_path(), Some(PathBuf::from("/tmp/reply.mp3")));
        assert_eq!(
            AgentReply::from(&entry),
            AgentReply::Media(PathBuf::from("/tmp/reply.mp3"))
        );

        let entry = TranscriptEntry::new(Role::Assistant, "no media here");
        assert_eq!(AgentReply::from(&entry), AgentReply::Text("no media here".to_string()));
    }

    #[tokio::test]
    async fn test_dispatch_appends_assistant_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer agent-key"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4o-mini"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": " It's noon. "}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let agent = ChatAgent::new(&config(&server.uri())).unwrap();
        let meta = meta();
        agent.dispatch("talk", "what time is it", &meta).await.unwrap();

        let reply = wait_for_reply(
            &agent,
            "talk",
            meta.message_id,
            Duration::from_millis(20),
            Duration::from_secs(5),
            || true,
        )
        .await
        .unwrap();
        assert_eq!(reply, Some(AgentReply::Text("It's noon.".to_string())));

        let history = agent.history("talk", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].id, meta.message_id);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].reply_to, Some(meta.message_id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_reply_times_out() {
        let agent = ChatAgent::new(&config("http://localhost:1")).unwrap();
        agent.record("talk", TranscriptEntry::new(Role::User, "hello"));

        let err = wait_for_reply(
            &agent,
            "talk",
            Uuid::new_v4(),
            Duration::from_millis(300),
            Duration::from_secs(45),
            || true,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn test_wait_for_reply_ignores_answers_to_other_messages() {
        let agent = ChatAgent::new(&config("http://localhost:1")).unwrap();
        let earlier = Uuid::new_v4();
        let current = Uuid::new_v4();
        agent.record("talk", TranscriptEntry::new(Role::User, "first question"));
        agent.record("talk", TranscriptEntry::new(Role::User, "second question"));
        // A late answer to the earlier message lands after the current one
        agent.record(
            "talk",
            TranscriptEntry::new(Role::Assistant, "answer to first").in_reply_to(earlier),
        );
        agent.record("talk", TranscriptEntry::new(Role::Assistant, "uncorrelated"));

        let result = wait_for_reply(
            &agent,
            "talk",
            current,
            Duration::from_millis(5),
            Duration::from_millis(30),
            || true,
        )
        .await;
        assert!(matches!(result, Err(Error::Timeout(_))));

        agent.record(
            "talk",
            TranscriptEntry::new(Role::Assistant, "answer to second").in_reply_to(current),
        );
        let reply = wait_for_reply(
            &agent,
            "talk",
            current,
            Duration::from_millis(5),
            Duration::from_millis(30),
            || true,
        )
        .await
        .unwrap();
        assert_eq!(reply, Some(AgentReply::Text("answer to second".to_string())));
    }

    #[tokio::test]
    async fn test_transcript_is_capped() {
        let agent = ChatAgent::new(&config("http://localhost:1")).unwrap();
        for i in 0..MAX_TRANSCRIPT_ENTRIES + 25 {
            agent.record("talk", TranscriptEntry::new(Role::User, format!("message {i}")));
        }

        let history = agent.history("talk", usize::MAX).await.unwrap();
        assert_eq!(history.len(), MAX_TRANSCRIPT_ENTRIES);
        assert_eq!(history[0].text, "message 25");
        assert_eq!(
            history.last().unwrap().text,
            format!("message {}", MAX_TRANSCRIPT_ENTRIES + 24)
        );
    }

    #[tokio::test]
    async fn test_wait_for_reply_stops_when_superseded() {
        let agent = ChatAgent::new(&config("http://localhost:1")).unwrap();
        let result = wait_for_reply(
            &agent,
            "talk",
            Uuid::new_v4(),
            Duration::from_millis(5),
            Duration::from_secs(5),
            || false,
        )
        .await
        .unwrap();
        assert!(result.is_none());
    }
}
