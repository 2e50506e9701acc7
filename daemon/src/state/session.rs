//! The live session aggregate and its display snapshot

use serde::{Deserialize, Serialize};

use crate::timer::Countdown;

/// The six modes of a listening session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Not listening, waiting for a restart command
    Idle,
    /// Listening for the wake phrase
    Listening,
    /// Wake phrase heard, awaiting the command
    Awake,
    /// Command captured, being processed
    Processing,
    /// Captured command on display
    Result,
    /// Engine failure on display, retry pending
    Error,
}

impl Default for Mode {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Idle => write!(f, "Idle"),
            Mode::Listening => write!(f, "Listening"),
            Mode::Awake => write!(f, "Awake"),
            Mode::Processing => write!(f, "Processing"),
            Mode::Result => write!(f, "Result"),
            Mode::Error => write!(f, "Error"),
        }
    }
}

/// Mutable session state, owned by the state machine
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub(super) mode: Mode,
    /// Latest partial transcript, lower-cased
    pub(super) partial: String,
    /// Captured command text
    pub(super) result: String,
    pub(super) countdown: Countdown,
    /// Message of the error currently on display
    pub(super) error: Option<String>,
}

impl Session {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[cfg(test)]
    pub fn partial(&self) -> &str {
        &self.partial
    }

    #[cfg(test)]
    pub fn result(&self) -> &str {
        &self.result
    }

    #[cfg(test)]
    pub fn countdown(&self) -> u32 {
        self.countdown.remaining()
    }

    /// Read-only view for presentation
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            mode: self.mode,
            partial_text: self.partial.clone(),
            result_text: self.result.clone(),
            countdown_seconds: self.countdown.remaining(),
            error: self.error.clone(),
        }
    }
}

/// Display snapshot recomputed after every transition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub mode: Mode,
    pub partial_text: String,
    pub result_text: String,
    /// Seconds left in the awake window, zero outside Awake
    pub countdown_seconds: u32,
    /// Surfaced error message, only present in Error mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
