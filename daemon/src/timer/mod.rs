//! Timer policy and deferred execution
//!
//! The countdown is pure policy owned by the session; the scheduler runs
//! one tokio task per pending timer and reports fires back by id.

mod countdown;
mod scheduler;

pub use countdown::{Countdown, Tick};
pub use scheduler::{Scheduler, TimerId};
