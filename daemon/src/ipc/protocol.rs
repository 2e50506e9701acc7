//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.
//! Responses and notifications share a connection and are told apart by
//! their `type` tag.

use serde::{Deserialize, Serialize};

use crate::events::{SessionEvent, UserCommand};
use crate::state::Snapshot;

/// Largest frame either side will accept
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Requests from UI to daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Clear displayed text and resume listening
    Restart,

    /// Stop listening
    Stop,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to session event notifications
    Subscribe,
}

/// Responses from daemon to UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Command queued for the session
    Accepted { command: UserCommand },

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification from daemon to UI (for subscribed clients)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A session event occurred
    Notification { event: SessionEvent },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Configured wake phrase
    pub wake_phrase: String,

    /// Recognition locale
    pub locale: String,

    /// Current display snapshot
    pub snapshot: Snapshot,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl DaemonStatus {
    pub fn new(wake_phrase: &str, locale: &str) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            wake_phrase: wake_phrase.to_string(),
            locale: locale.to_string(),
            snapshot: Snapshot::default(),
            uptime_secs: 0,
        }
    }
}
