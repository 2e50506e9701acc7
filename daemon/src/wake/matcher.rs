//! Substring matcher for the configured wake phrase

use std::fmt;

/// Returns true if the lower-cased `transcript` contains `wake_phrase`.
///
/// `wake_phrase` is expected to already be lower-case. An empty transcript
/// never matches.
pub fn matches(transcript: &str, wake_phrase: &str) -> bool {
    if transcript.is_empty() {
        return false;
    }
    transcript.to_lowercase().contains(wake_phrase)
}

/// A normalized, non-empty wake phrase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakePhrase(String);

/// Errors when building a wake phrase
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WakePhraseError {
    #[error("wake phrase must not be empty")]
    Empty,
}

impl WakePhrase {
    /// Normalize `phrase`: lower-case, with runs of whitespace collapsed to
    /// one space and the ends trimmed.
    pub fn new(phrase: &str) -> Result<Self, WakePhraseError> {
        let normalized = phrase
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        if normalized.is_empty() {
            return Err(WakePhraseError::Empty);
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check a transcript for this phrase
    pub fn matches(&self, transcript: &str) -> bool {
        matches(transcript, &self.0)
    }
}

impl Default for WakePhrase {
    fn default() -> Self {
        Self("hey thworks".to_string())
    }
}

impl fmt::Display for WakePhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
