//! Events module for the listening session
//!
//! Provides the typed events flowing into the session core (recognition
//! results from the speech engine, user commands) and the structured
//! events it publishes to observers.

use serde::{Deserialize, Serialize};

use crate::state::{Mode, Snapshot};

/// Events delivered by the speech engine adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecognitionEvent {
    /// Recognition session began
    Started,

    /// Low-latency, possibly revised hypotheses for the current utterance
    PartialResults {
        /// Candidate transcripts, best first
        candidates: Vec<String>,
    },

    /// Confirmed hypotheses for a completed utterance
    FinalResults {
        /// Candidate transcripts, best first
        candidates: Vec<String>,
    },

    /// The engine reported a recognition failure
    Error {
        /// Engine-provided description
        message: String,
    },
}

impl RecognitionEvent {
    /// Join the candidates into one transcript.
    ///
    /// Returns `None` for events without candidates or with an empty
    /// candidate list.
    pub fn transcript(&self) -> Option<String> {
        match self {
            RecognitionEvent::PartialResults { candidates }
            | RecognitionEvent::FinalResults { candidates } => {
                if candidates.is_empty() {
                    None
                } else {
                    Some(candidates.join(" "))
                }
            }
            RecognitionEvent::Started | RecognitionEvent::Error { .. } => None,
        }
    }
}

/// Commands a user can issue from the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserCommand {
    /// Clear any displayed text and resume listening
    Restart,
    /// Stop listening and go idle
    Stop,
}

/// Events published by the session runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The active mode changed
    ModeChanged { from: Mode, to: Mode },

    /// The display snapshot changed
    SnapshotChanged { snapshot: Snapshot },

    /// The wake phrase was heard
    WakeDetected {
        /// Lower-cased transcript that contained the phrase
        transcript: String,
    },

    /// A follow-up command was captured during the awake window
    CommandCaptured { text: String },

    /// The awake window ran out without a command
    WakeWindowExpired,

    /// An error that should be shown to the user
    ErrorSurfaced { message: String },
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::ModeChanged { from, to } => write!(f, "MODE_CHANGED ({} -> {})", from, to),
            SessionEvent::SnapshotChanged { snapshot } => {
                write!(f, "SNAPSHOT_CHANGED ({})", snapshot.mode)
            }
            SessionEvent::WakeDetected { .. } => write!(f, "WAKE_DETECTED"),
            SessionEvent::CommandCaptured { text } => write!(f, "COMMAND_CAPTURED ({:?})", text),
            SessionEvent::WakeWindowExpired => write!(f, "WAKE_WINDOW_EXPIRED"),
            SessionEvent::ErrorSurfaced { message } => write!(f, "ERROR_SURFACED ({})", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_joins_candidates() {
        let event = RecognitionEvent::PartialResults {
            candidates: vec!["hey".to_string(), "thworks".to_string()],
        };
        assert_eq!(event.transcript().as_deref(), Some("hey thworks"));
    }

    #[test]
    fn test_empty_candidates_have_no_transcript() {
        let event = RecognitionEvent::FinalResults { candidates: vec![] };
        assert_eq!(event.transcript(), None);
        assert_eq!(RecognitionEvent::Started.transcript(), None);
    }

    #[test]
    fn test_event_serialization() {
        let event = SessionEvent::ModeChanged {
            from: Mode::Listening,
            to: Mode::Awake,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("mode_changed"));
        assert!(json.contains("awake"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"partial_results","candidates":["hey thworks"]}"#;
        let event: RecognitionEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.transcript().as_deref(), Some("hey thworks"));

        let command: UserCommand = serde_json::from_str(r#""restart""#).unwrap();
        assert_eq!(command, UserCommand::Restart);
    }
}
