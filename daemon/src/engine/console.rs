//! Line-oriented stand-in recognizer
//!
//! Treats each line read from an async source (stdin in the daemon) as a
//! spoken utterance: one partial result per growing word prefix, then a
//! final result with the whole line. A line of the form `!error <message>`
//! reports a recognition error instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{EngineError, SpeechEngine};
use crate::events::RecognitionEvent;

const ERROR_PREFIX: &str = "!error";

/// Recognizer that "hears" lines of text
pub struct ConsoleEngine<R> {
    /// Input source, moved into the reader task on first start
    source: Option<R>,
    events: mpsc::Sender<RecognitionEvent>,
    active: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    destroyed: bool,
}

impl<R> ConsoleEngine<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(source: R, events: mpsc::Sender<RecognitionEvent>) -> Self {
        Self {
            source: Some(source),
            events,
            active: Arc::new(AtomicBool::new(false)),
            reader: None,
            destroyed: false,
        }
    }

    /// Check if a recognition session is running
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<R> SpeechEngine for ConsoleEngine<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn start(&mut self, locale: &str) -> Result<(), EngineError> {
        if self.destroyed {
            return Err(EngineError::Unavailable("engine has been destroyed".to_string()));
        }
        if !is_supported_locale(locale) {
            return Err(EngineError::UnsupportedLocale(locale.to_string()));
        }

        if let Some(source) = self.source.take() {
            let events = self.events.clone();
            let active = Arc::clone(&self.active);
            self.reader = Some(tokio::spawn(read_utterances(source, events, active)));
        }

        let restarted = self.is_active();
        self.active.store(true, Ordering::SeqCst);
        debug!(locale, restarted, "console recognition started");

        // The consumer may be the caller awaiting this start, so never block here
        if self.events.try_send(RecognitionEvent::Started).is_err() {
            warn!("event channel full, dropping start notification");
        }

        Ok(())
    }

    async fn stop(&mut self) -> Result<(), EngineError> {
        if !self.active.swap(false, Ordering::SeqCst) {
            return Err(EngineError::NotActive);
        }
        debug!("console recognition stopped");
        Ok(())
    }

    async fn destroy(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if !self.destroyed {
            self.destroyed = true;
            info!("console engine destroyed");
        }
    }

    fn name(&self) -> &str {
        "console"
    }
}

/// Read lines until EOF, emitting recognition events while active
async fn read_utterances<R>(source: R, events: mpsc::Sender<RecognitionEvent>, active: Arc<AtomicBool>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = source.lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("console input closed");
                return;
            }
            Err(e) => {
                warn!(?e, "failed to read console input");
                return;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !active.load(Ordering::SeqCst) {
            debug!(line, "not listening, dropping input");
            continue;
        }

        for event in utterance_events(line) {
            let Ok(permit) = events.reserve().await else {
                return;
            };
            // Stopped while this utterance was being emitted
            if !active.load(Ordering::SeqCst) {
                debug!(line, "recognition stopped, dropping rest of utterance");
                break;
            }
            permit.send(event);
        }
    }
}

/// Expand one line of input into the events a recognizer would emit for it
fn utterance_events(line: &str) -> Vec<RecognitionEvent> {
    if let Some(rest) = line.strip_prefix(ERROR_PREFIX) {
        let message = rest.trim();
        let message = if message.is_empty() { "Unknown" } else { message };
        return vec![RecognitionEvent::Error {
            message: message.to_string(),
        }];
    }

    let words: Vec<&str> = line.split_whitespace().collect();
    let mut events: Vec<RecognitionEvent> = (1..=words.len())
        .map(|n| RecognitionEvent::PartialResults {
            candidates: vec![words[..n].join(" ")],
        })
        .collect();
    events.push(RecognitionEvent::FinalResults {
        candidates: vec![words.join(" ")],
    });
    events
}

/// Accepts `ll`/`lll` language tags with an optional `RR` or `NNN` region,
/// separated by `-` or `_`
fn is_supported_locale(locale: &str) -> bool {
    let mut parts = locale.split(|c: char| c == '-' || c == '_');

    let language = parts.next().unwrap_or_default();
    let language_ok =
        (2..=3).contains(&language.len()) && language.chars().all(|c| c.is_ascii_alphabetic());

    let region_ok = match parts.next() {
        None => true,
        Some(region) => {
            (region.len() == 2 && region.chars().all(|c| c.is_ascii_alphabetic()))
                || (region.len() == 3 && region.chars().all(|c| c.is_ascii_digit()))
        }
    };

    language_ok && region_ok && parts.next().is_none()
}
