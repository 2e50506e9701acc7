//! Cancellable one-shot timers backed by tokio tasks

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Handle identifying one scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Runs deferred timers and reports each fire on a channel
///
/// Cancelling aborts the sleeping task. A fire that was already queued on
/// the channel before the cancel cannot be recalled, so consumers must
/// still treat unknown ids as stale.
pub struct Scheduler {
    fired_tx: mpsc::Sender<TimerId>,
    pending: HashMap<TimerId, JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(fired_tx: mpsc::Sender<TimerId>) -> Self {
        Self {
            fired_tx,
            pending: HashMap::new(),
        }
    }

    /// Fire `id` once after `after`. Rescheduling an id replaces it.
    pub fn schedule(&mut self, id: TimerId, after: Duration) {
        let fired_tx = self.fired_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if fired_tx.send(id).await.is_err() {
                warn!(%id, "timer fired after scheduler was dropped");
            }
        });

        if let Some(previous) = self.pending.insert(id, handle) {
            previous.abort();
        }
        debug!(%id, after_ms = after.as_millis() as u64, "timer scheduled");
    }

    /// Abort a pending timer. Unknown ids are ignored.
    pub fn cancel(&mut self, id: TimerId) {
        if let Some(handle) = self.pending.remove(&id) {
            handle.abort();
            debug!(%id, "timer cancelled");
        }
    }

    /// Drop bookkeeping for a timer that has already fired
    pub fn forget(&mut self, id: TimerId) {
        self.pending.remove(&id);
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut scheduler = Scheduler::new(tx);

        scheduler.schedule(TimerId(1), Duration::from_millis(400));
        assert_eq!(scheduler.pending(), 1);

        let fired = rx.recv().await;
        assert_eq!(fired, Some(TimerId(1)));

        scheduler.forget(TimerId(1));
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut scheduler = Scheduler::new(tx);

        scheduler.schedule(TimerId(1), Duration::from_millis(100));
        scheduler.schedule(TimerId(2), Duration::from_millis(200));
        scheduler.cancel(TimerId(1));

        assert_eq!(rx.recv().await, Some(TimerId(2)));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut scheduler = Scheduler::new(tx);

        scheduler.schedule(TimerId(1), Duration::from_millis(100));
        scheduler.schedule(TimerId(2), Duration::from_millis(100));
        scheduler.cancel_all();
        assert_eq!(scheduler.pending(), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }
}
