//! Core state machine implementation
//!
//! Handles transitions between Idle, Listening, Awake, Processing, Result
//! and Error based on recognition events, user commands and timer fires.
//! The machine performs no I/O: engine calls and timer scheduling come
//! back as [`Effect`]s for the runtime to carry out.

use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::error::SessionError;
use crate::events::{RecognitionEvent, SessionEvent, UserCommand};
use crate::timer::{Tick, TimerId};
use crate::wake::WakePhrase;

use super::session::{Mode, Session, Snapshot};

/// Interval between awake countdown ticks
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Where the session goes when the awake window runs out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeTimeout {
    /// Stop listening until the user restarts
    Idle,
    /// Resume listening for the wake phrase
    Listening,
}

impl FromStr for WakeTimeout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "idle" => Ok(WakeTimeout::Idle),
            "listening" => Ok(WakeTimeout::Listening),
            other => Err(format!("expected \"idle\" or \"listening\", got {:?}", other)),
        }
    }
}

/// Behavior knobs for a session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub wake_phrase: WakePhrase,
    /// Locale passed to every engine start
    pub locale: String,
    /// Awake window budget in whole seconds
    pub wake_window_secs: u32,
    /// Pause between stopping the engine on wake and restarting capture
    pub restart_delay: Duration,
    /// Synthetic processing time before the result is shown
    pub processing_delay: Duration,
    /// How long a result stays on display
    pub result_display: Duration,
    /// Wait before listening again after an error
    pub error_retry_delay: Duration,
    pub wake_timeout: WakeTimeout,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            wake_phrase: WakePhrase::default(),
            locale: "en-US".to_string(),
            wake_window_secs: 5,
            restart_delay: Duration::from_millis(400),
            processing_delay: Duration::from_millis(500),
            result_display: Duration::from_secs(3),
            error_retry_delay: Duration::from_secs(1),
            wake_timeout: WakeTimeout::Idle,
        }
    }
}

/// Everything that can drive the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(UserCommand),
    Recognition(RecognitionEvent),
    /// A failed engine call, reported back by the runtime
    Fault(SessionError),
    TimerFired(TimerId),
}

/// Side effects requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    StartEngine { locale: String },
    StopEngine,
    ScheduleTimer { id: TimerId, after: Duration },
    CancelTimer(TimerId),
    Emit(SessionEvent),
}

/// What a scheduled timer does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    /// Start a fresh engine session for the command
    RestartCapture,
    CountdownTick,
    ProcessingDone,
    ResultDisplayDone,
    ErrorRetry,
}

/// The state machine that sequences a listening session
pub struct StateMachine {
    session: Session,
    settings: SessionSettings,
    /// Timers owned by the current mode
    timers: Vec<(TimerId, TimerKind)>,
    next_timer_id: u64,
    /// Set once the engine has been restarted for the command; results
    /// heard in Awake before that still belong to the wake utterance
    capture_armed: bool,
}

impl StateMachine {
    /// Create a new state machine in Idle
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            session: Session::default(),
            settings,
            timers: Vec::new(),
            next_timer_id: 0,
            capture_armed: false,
        }
    }

    /// Get the current mode
    pub fn mode(&self) -> Mode {
        self.session.mode()
    }

    #[cfg(test)]
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn snapshot(&self) -> Snapshot {
        self.session.snapshot()
    }

    /// Apply one input and return the effects it requires
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        let mut effects = Vec::new();

        match input {
            Input::Command(UserCommand::Restart) => self.start_listening(&mut effects),
            Input::Command(UserCommand::Stop) => {
                self.transition_to(Mode::Idle, &mut effects);
                effects.push(Effect::StopEngine);
            }
            Input::Recognition(event) => self.handle_recognition(event, &mut effects),
            Input::Fault(error) => self.handle_fault(error, &mut effects),
            Input::TimerFired(id) => self.handle_timer(id, &mut effects),
        }

        effects
    }

    /// Handle an event from the speech engine
    fn handle_recognition(&mut self, event: RecognitionEvent, effects: &mut Vec<Effect>) {
        let mode = self.session.mode;

        if let RecognitionEvent::Error { message } = event {
            self.enter_error(SessionError::RecognitionError(message).to_string(), effects);
            return;
        }

        let is_final = matches!(event, RecognitionEvent::FinalResults { .. });
        let Some(transcript) = event.transcript() else {
            trace!(%mode, ?event, "no transcript in recognition event");
            return;
        };

        match (mode, is_final) {
            // Partials give low latency; finals catch a phrase the partials missed
            (Mode::Listening, _) if self.settings.wake_phrase.matches(&transcript) => {
                self.wake(transcript, effects);
            }
            (Mode::Awake, _) if !self.capture_armed => {
                debug!(is_final, "ignoring wake utterance tail before capture restart");
            }
            (Mode::Listening, false) | (Mode::Awake, false) => {
                self.session.partial = transcript.to_lowercase();
            }
            (Mode::Awake, true) => self.capture(transcript, effects),
            (mode, _) => {
                debug!(%mode, is_final, "ignoring transcript");
            }
        }
    }

    /// Handle a failed engine call
    fn handle_fault(&mut self, error: SessionError, effects: &mut Vec<Effect>) {
        if !error.is_surfaced() {
            debug!(%error, "ignoring best-effort engine failure");
            return;
        }
        self.enter_error(error.to_string(), effects);
    }

    /// Handle a timer fire, ignoring timers no longer owned by this mode
    fn handle_timer(&mut self, id: TimerId, effects: &mut Vec<Effect>) {
        let Some(index) = self.timers.iter().position(|(owned, _)| *owned == id) else {
            debug!(%id, mode = %self.session.mode, "ignoring stale timer");
            return;
        };
        let (_, kind) = self.timers.remove(index);

        match kind {
            TimerKind::RestartCapture => {
                debug!("restarting recognition for command capture");
                self.capture_armed = true;
                effects.push(Effect::StartEngine {
                    locale: self.settings.locale.clone(),
                });
            }
            TimerKind::CountdownTick => match self.session.countdown.tick() {
                Tick::Remaining(seconds) => {
                    debug!(seconds, "awake window countdown");
                    self.schedule(TimerKind::CountdownTick, TICK_INTERVAL, effects);
                }
                Tick::Expired => {
                    info!(target_mode = ?self.settings.wake_timeout, "awake window expired without a command");
                    effects.push(Effect::Emit(SessionEvent::WakeWindowExpired));
                    match self.settings.wake_timeout {
                        WakeTimeout::Idle => self.transition_to(Mode::Idle, effects),
                        WakeTimeout::Listening => self.start_listening(effects),
                    }
                }
            },
            TimerKind::ProcessingDone => {
                self.transition_to(Mode::Result, effects);
                self.schedule(TimerKind::ResultDisplayDone, self.settings.result_display, effects);
            }
            TimerKind::ResultDisplayDone | TimerKind::ErrorRetry => self.start_listening(effects),
        }
    }

    /// Enter Listening with cleared text and start the engine
    fn start_listening(&mut self, effects: &mut Vec<Effect>) {
        self.transition_to(Mode::Listening, effects);
        self.session.partial.clear();
        self.session.result.clear();
        effects.push(Effect::StartEngine {
            locale: self.settings.locale.clone(),
        });
    }

    /// Enter Awake after the wake phrase was heard
    fn wake(&mut self, transcript: String, effects: &mut Vec<Effect>) {
        let transcript = transcript.to_lowercase();
        info!(%transcript, "wake phrase detected");

        self.transition_to(Mode::Awake, effects);
        self.session.partial.clear();
        self.session.countdown.start(self.settings.wake_window_secs);

        // Restart the engine so the wake phrase does not bleed into the command
        effects.push(Effect::StopEngine);
        self.schedule(TimerKind::RestartCapture, self.settings.restart_delay, effects);
        self.schedule(TimerKind::CountdownTick, TICK_INTERVAL, effects);

        effects.push(Effect::Emit(SessionEvent::WakeDetected { transcript }));
    }

    /// Take a final transcript in Awake as the command
    fn capture(&mut self, transcript: String, effects: &mut Vec<Effect>) {
        let text = transcript.trim().to_string();
        info!(%text, "command captured");

        self.transition_to(Mode::Processing, effects);
        self.session.partial.clear();
        self.session.result = text.clone();
        self.schedule(TimerKind::ProcessingDone, self.settings.processing_delay, effects);

        effects.push(Effect::Emit(SessionEvent::CommandCaptured { text }));
    }

    /// Enter Error, surface the message and schedule a retry
    fn enter_error(&mut self, message: String, effects: &mut Vec<Effect>) {
        warn!(%message, "speech engine error, retry scheduled");

        self.transition_to(Mode::Error, effects);
        self.session.error = Some(message.clone());
        self.schedule(TimerKind::ErrorRetry, self.settings.error_retry_delay, effects);

        effects.push(Effect::Emit(SessionEvent::ErrorSurfaced { message }));
    }

    /// Perform a mode transition, cancelling every timer of the mode left
    fn transition_to(&mut self, new_mode: Mode, effects: &mut Vec<Effect>) {
        for (id, kind) in self.timers.drain(..) {
            trace!(%id, ?kind, "cancelling timer");
            effects.push(Effect::CancelTimer(id));
        }

        if new_mode != Mode::Awake {
            self.session.countdown.clear();
        }
        self.capture_armed = false;
        if new_mode != Mode::Error {
            self.session.error = None;
        }

        let old_mode = self.session.mode;
        if old_mode != new_mode {
            info!(from = %old_mode, to = %new_mode, "state transition");
        }
        self.session.mode = new_mode;
    }

    fn schedule(&mut self, kind: TimerKind, after: Duration, effects: &mut Vec<Effect>) {
        let id = TimerId(self.next_timer_id);
        self.next_timer_id += 1;

        self.timers.push((id, kind));
        effects.push(Effect::ScheduleTimer { id, after });
    }
}
