//! Session error taxonomy
//!
//! None of these are fatal. The state machine decides per variant whether
//! the failure is surfaced to the user or only logged.

use thiserror::Error;

use crate::engine::EngineError;

/// Failures observed while driving a listening session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("failed to start recognition: {0}")]
    EngineStartFailure(#[source] EngineError),

    #[error("failed to stop recognition: {0}")]
    EngineStopFailure(#[source] EngineError),

    #[error("recognition error: {0}")]
    RecognitionError(String),
}

impl SessionError {
    /// Whether the failure puts the session into Error mode.
    ///
    /// Stops are best-effort: a following start supersedes them.
    pub fn is_surfaced(&self) -> bool {
        !matches!(self, SessionError::EngineStopFailure(_))
    }
}
