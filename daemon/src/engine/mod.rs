//! Speech engine adapter
//!
//! The recognizer itself is external. Implementations wrap one behind
//! start/stop/destroy and push [`RecognitionEvent`]s into a channel handed
//! to them at construction.
//!
//! [`RecognitionEvent`]: crate::events::RecognitionEvent

mod console;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;

pub use console::ConsoleEngine;

/// Errors returned by engine operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("unsupported recognition locale: {0}")]
    UnsupportedLocale(String),

    #[error("speech engine unavailable: {0}")]
    Unavailable(String),

    #[error("no active recognition session")]
    NotActive,
}

/// A speech recognition backend
#[async_trait]
pub trait SpeechEngine: Send {
    /// Begin a recognition session for `locale`
    async fn start(&mut self, locale: &str) -> Result<(), EngineError>;

    /// End the current recognition session
    async fn stop(&mut self) -> Result<(), EngineError>;

    /// Release engine resources. Safe to call more than once.
    async fn destroy(&mut self);

    /// Backend name for logging
    fn name(&self) -> &str;
}
