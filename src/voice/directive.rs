//! Voice directives embedded in agent replies
//!
//! An agent can prefix its reply with a one-line JSON object to steer
//! synthesis for that reply, e.g.
//!
//! ```text
//! {"voice":"nova","speed":1.2}
//! Sure, here's the forecast.
//! ```
//!
//! Anything that does not parse as an object is spoken verbatim.

use serde::Deserialize;

/// Synthesis overrides for a single reply
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpeechDirective {
    /// Voice identifier
    #[serde(alias = "voice_id", alias = "voiceId")]
    pub voice: Option<String>,

    /// Synthesis model
    #[serde(alias = "model_id", alias = "modelId")]
    pub model: Option<String>,

    /// Speaking rate multiplier
    #[serde(alias = "rate")]
    pub speed: Option<f32>,

    /// Voice stability (0.0 to 1.0)
    pub stability: Option<f32>,

    /// Similarity boost (0.0 to 1.0)
    #[serde(alias = "similarity_boost", alias = "similarityBoost")]
    pub similarity: Option<f32>,

    /// Style exaggeration (0.0 to 1.0)
    pub style: Option<f32>,

    /// Speaker boost toggle
    #[serde(alias = "speakerBoost", alias = "use_speaker_boost")]
    pub speaker_boost: Option<bool>,

    /// Deterministic sampling seed
    pub seed: Option<u32>,

    /// Language hint
    #[serde(alias = "lang")]
    pub language: Option<String>,
}

impl SpeechDirective {
    /// Drop values outside their valid ranges
    fn sanitize(mut self) -> Self {
        if let Some(speed) = self.speed
            && !(0.25..=4.0).contains(&speed)
        {
            tracing::warn!(speed, "ignoring out-of-range speed directive");
            self.speed = None;
        }
        for (name, value) in [
            ("stability", &mut self.stability),
            ("similarity", &mut self.similarity),
            ("style", &mut self.style),
        ] {
            if let Some(v) = *value
                && !(0.0..=1.0).contains(&v)
            {
                tracing::warn!(field = name, value = v, "ignoring out-of-range directive");
                *value = None;
            }
        }
        self
    }
}

/// Reply text split into directive and speakable text
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    /// Overrides from the leading directive, if any
    pub directive: Option<SpeechDirective>,
    /// Text to speak
    pub text: String,
}

/// Split an optional leading directive off agent output
#[must_use]
pub fn parse_reply(reply: &str) -> ParsedReply {
    let (first, rest) = reply.split_once('\n').unwrap_or((reply, ""));
    let candidate = first.trim();

    if !(candidate.starts_with('{') && candidate.ends_with('}')) {
        return verbatim(reply);
    }

    match serde_json::from_str::<SpeechDirective>(candidate) {
        Ok(directive) => {
            tracing::debug!(?directive, "voice directive parsed");
            ParsedReply {
                directive: Some(directive.sanitize()),
                text: rest.trim().to_string(),
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "reply starts with a brace but is not a directive");
            verbatim(reply)
        }
    }
}

fn verbatim(reply: &str) -> ParsedReply {
    ParsedReply {
        directive: None,
        text: reply.trim().to_string(),
    }
}
