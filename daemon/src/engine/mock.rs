//! Scripted engine for tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{EngineError, SpeechEngine};

/// A call received by [`MockEngine`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Start(String),
    Stop,
    Destroy,
}

/// Engine that records calls and can be told to fail starts
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    calls: Arc<Mutex<Vec<EngineCall>>>,
    failing_starts: Arc<AtomicUsize>,
    active: bool,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` starts fail with `Unavailable`
    pub fn fail_next_starts(&self, n: usize) {
        self.failing_starts.store(n, Ordering::SeqCst);
    }

    /// Shared view of recorded calls
    pub fn calls(&self) -> Arc<Mutex<Vec<EngineCall>>> {
        Arc::clone(&self.calls)
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl SpeechEngine for MockEngine {
    async fn start(&mut self, locale: &str) -> Result<(), EngineError> {
        self.record(EngineCall::Start(locale.to_string()));

        let failing = self.failing_starts.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_starts.store(failing - 1, Ordering::SeqCst);
            return Err(EngineError::Unavailable("mock engine busy".to_string()));
        }

        self.active = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), EngineError> {
        self.record(EngineCall::Stop);
        if !self.active {
            return Err(EngineError::NotActive);
        }
        self.active = false;
        Ok(())
    }

    async fn destroy(&mut self) {
        self.record(EngineCall::Destroy);
        self.active = false;
    }

    fn name(&self) -> &str {
        "mock"
    }
}
