//! Wake phrase matching
//!
//! Transcripts come back from STT with arbitrary casing and punctuation, so
//! both sides are normalized before a prefix comparison. The remainder is cut
//! from the raw transcript so the forwarded message keeps its original text.

/// Punctuation treated as whitespace during normalization
const STRIP_CHARS: &[char] = &['.', ',', '!', '?', ';', ':'];

/// Incremental normalizer: lowercase, punctuation to space, collapsed spaces
#[derive(Default)]
struct Normalizer {
    out: String,
    pending_space: bool,
}

impl Normalizer {
    fn push(&mut self, c: char) {
        if c.is_whitespace() || STRIP_CHARS.contains(&c) {
            self.pending_space = !self.out.is_empty();
            return;
        }
        if self.pending_space {
            self.out.push(' ');
            self.pending_space = false;
        }
        self.out.extend(c.to_lowercase());
    }
}

/// Normalize text for wake phrase comparison
///
/// Lower-cases, replaces `.,!?;:` with spaces, collapses whitespace and trims.
#[must_use]
pub fn normalize(text: &str) -> String {
    let mut normalizer = Normalizer::default();
    text.chars().for_each(|c| normalizer.push(c));
    normalizer.out
}

/// Whether the transcript starts with the wake phrase
///
/// Case and punctuation insensitive, but not token-boundary aware.
#[must_use]
pub fn matches(transcript: &str, phrase: &str) -> bool {
    let phrase = normalize(phrase);
    !phrase.is_empty() && normalize(transcript).starts_with(&phrase)
}

/// Extract what was said after the wake phrase
///
/// Returns `None` when the transcript does not start with the phrase, and an
/// empty string when nothing follows it.
#[must_use]
pub fn extract_remainder(transcript: &str, phrase: &str) -> Option<String> {
    let phrase = normalize(phrase);
    if phrase.is_empty() {
        return None;
    }

    let mut normalizer = Normalizer::default();
    for (idx, c) in transcript.char_indices() {
        normalizer.push(c);
        if normalizer.out.len() < phrase.len() {
            continue;
        }
        if normalizer.out != phrase {
            return None;
        }

        let rest = &transcript[idx + c.len_utf8()..];
        let rest = rest.trim_start_matches(|ch: char| ch.is_whitespace() || STRIP_CHARS.contains(&ch));
        return Some(rest.trim_end().to_string());
    }

    None
}

/// Wake phrase built from the configured word list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakePhrase {
    words: Vec<String>,
    normalized: String,
}

impl WakePhrase {
    /// Build a phrase from words, in order
    #[must_use]
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words: Vec<String> = words
            .into_iter()
            .flat_map(|w| {
                w.as_ref()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect();
        let normalized = normalize(&words.join(" "));

        tracing::debug!(phrase = %normalized, "wake phrase configured");

        Self { words, normalized }
    }

    /// Parse a space-separated word list
    #[must_use]
    pub fn parse(list: &str) -> Self {
        Self::new(list.split_whitespace())
    }

    /// Configured words
    #[must_use]
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Normalized phrase
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// Whether no usable phrase is configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    /// Test a transcript, returning the remainder on a match
    #[must_use]
    pub fn detect(&self, transcript: &str) -> Option<String> {
        let remainder = extract_remainder(transcript, &self.normalized)?;
        tracing::info!(phrase = %self.normalized, transcript, "wake phrase detected");
        Some(remainder)
    }
}
