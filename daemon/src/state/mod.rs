//! Session state module
//!
//! Provides the listening session as an explicit state machine with six
//! modes:
//! - Idle: not listening, waiting for a restart
//! - Listening: engine running, watching transcripts for the wake phrase
//! - Awake: wake phrase heard, waiting for one follow-up command
//! - Processing: command captured, synthetic processing delay
//! - Result: captured command on display
//! - Error: engine failure shown, retry pending
//!
//! [`StateMachine`] is a pure transition function returning effects as
//! data; [`Runtime`] executes those effects against a speech engine and
//! real timers.

mod machine;
mod runtime;
mod session;

pub use machine::{Effect, Input, SessionSettings, StateMachine, WakeTimeout, TICK_INTERVAL};
pub use runtime::Runtime;
pub use session::{Mode, Session, Snapshot};
