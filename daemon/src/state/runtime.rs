//! Session runtime
//!
//! Owns the state machine, the speech engine and the timer scheduler, and
//! serializes every input through a single loop so transitions never
//! interleave.

use std::collections::VecDeque;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::engine::SpeechEngine;
use crate::error::SessionError;
use crate::events::{RecognitionEvent, SessionEvent, UserCommand};
use crate::timer::{Scheduler, TimerId};

use super::machine::{Effect, Input, StateMachine};
use super::session::Snapshot;

/// Drives a [`StateMachine`] against a live engine and real timers
pub struct Runtime<E> {
    machine: StateMachine,
    engine: E,
    scheduler: Scheduler,
    timer_rx: mpsc::Receiver<TimerId>,
    /// Channel for publishing session events
    event_tx: broadcast::Sender<SessionEvent>,
    /// Last snapshot sent to observers
    published: Snapshot,
}

impl<E: SpeechEngine> Runtime<E> {
    pub fn new(machine: StateMachine, engine: E, event_tx: broadcast::Sender<SessionEvent>) -> Self {
        let (timer_tx, timer_rx) = mpsc::channel(16);
        let published = machine.snapshot();

        Self {
            machine,
            engine,
            scheduler: Scheduler::new(timer_tx),
            timer_rx,
            event_tx,
            published,
        }
    }

    /// Process inputs until shutdown, then release the engine
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<UserCommand>,
        mut recognition: mpsc::Receiver<RecognitionEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(
            engine = self.engine.name(),
            mode = %self.machine.mode(),
            "session runtime started"
        );

        loop {
            let input = tokio::select! {
                _ = shutdown.recv() => break,
                Some(command) = commands.recv() => Input::Command(command),
                Some(event) = recognition.recv() => Input::Recognition(event),
                Some(id) = self.timer_rx.recv() => Input::TimerFired(id),
                else => break,
            };

            self.dispatch(input).await;
        }

        self.teardown().await;
    }

    /// Feed one input through the machine and carry out its effects.
    ///
    /// Engine failures raised while applying effects are fed back as
    /// faults before this returns.
    pub async fn dispatch(&mut self, input: Input) {
        let mut queue = VecDeque::from([input]);

        while let Some(input) = queue.pop_front() {
            if let Input::TimerFired(id) = &input {
                self.scheduler.forget(*id);
            }

            for effect in self.machine.handle(input) {
                if let Some(fault) = self.apply(effect).await {
                    queue.push_back(Input::Fault(fault));
                }
            }

            self.publish();
        }
    }

    async fn apply(&mut self, effect: Effect) -> Option<SessionError> {
        match effect {
            Effect::StartEngine { locale } => match self.engine.start(&locale).await {
                Ok(()) => None,
                Err(e) => {
                    warn!(engine = self.engine.name(), %locale, %e, "engine start failed");
                    Some(SessionError::EngineStartFailure(e))
                }
            },
            Effect::StopEngine => match self.engine.stop().await {
                Ok(()) => None,
                Err(e) => Some(SessionError::EngineStopFailure(e)),
            },
            Effect::ScheduleTimer { id, after } => {
                self.scheduler.schedule(id, after);
                None
            }
            Effect::CancelTimer(id) => {
                self.scheduler.cancel(id);
                None
            }
            Effect::Emit(event) => {
                if let SessionEvent::ErrorSurfaced { message } = &event {
                    error!(%message, "speech error");
                }
                self.emit(event);
                None
            }
        }
    }

    /// Publish the snapshot if the last transition changed it
    fn publish(&mut self) {
        let snapshot = self.machine.snapshot();
        if snapshot == self.published {
            return;
        }

        if snapshot.mode != self.published.mode {
            self.emit(SessionEvent::ModeChanged {
                from: self.published.mode,
                to: snapshot.mode,
            });
        }

        self.published = snapshot.clone();
        self.emit(SessionEvent::SnapshotChanged { snapshot });
    }

    fn emit(&self, event: SessionEvent) {
        debug!(%event, "emitting session event");
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    async fn teardown(&mut self) {
        debug!(pending = self.scheduler.pending(), "cancelling timers");
        self.scheduler.cancel_all();
        self.engine.destroy().await;
        info!("session runtime stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tokio::io::BufReader;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::engine::mock::{EngineCall, MockEngine};
    use crate::engine::ConsoleEngine;
    use crate::state::{Mode, SessionSettings};

    struct Harness {
        commands: mpsc::Sender<UserCommand>,
        recognition: mpsc::Sender<RecognitionEvent>,
        events: broadcast::Receiver<SessionEvent>,
        shutdown: broadcast::Sender<()>,
        calls: Arc<Mutex<Vec<EngineCall>>>,
        task: JoinHandle<()>,
    }

    impl Harness {
        fn spawn(engine: MockEngine) -> Self {
            let calls = engine.calls();
            let (event_tx, events) = broadcast::channel(64);
            let (commands, command_rx) = mpsc::channel(8);
            let (recognition, recognition_rx) = mpsc::channel(8);
            let (shutdown, shutdown_rx) = broadcast::channel(1);

            let runtime = Runtime::new(
                StateMachine::new(SessionSettings::default()),
                engine,
                event_tx,
            );
            let task = tokio::spawn(runtime.run(command_rx, recognition_rx, shutdown_rx));

            Self {
                commands,
                recognition,
                events,
                shutdown,
                calls,
                task,
            }
        }

        async fn command(&self, command: UserCommand) {
            self.commands.send(command).await.unwrap();
        }

        async fn hear(&self, event: RecognitionEvent) {
            self.recognition.send(event).await.unwrap();
        }

        /// Next published event, skipping nothing
        async fn next_event(&mut self) -> SessionEvent {
            tokio::time::timeout(Duration::from_secs(60), self.events.recv())
                .await
                .expect("timed out waiting for session event")
                .expect("event channel closed")
        }

        /// Skip ahead to the next snapshot in `mode`
        async fn wait_for(&mut self, mode: Mode) -> Snapshot {
            loop {
                if let SessionEvent::SnapshotChanged { snapshot } = self.next_event().await {
                    if snapshot.mode == mode {
                        return snapshot;
                    }
                }
            }
        }

        async fn shutdown(self) -> Vec<EngineCall> {
            self.shutdown.send(()).unwrap();
            self.task.await.unwrap();
            let calls = self.calls.lock().unwrap().clone();
            calls
        }
    }

    fn partial(text: &str) -> RecognitionEvent {
        RecognitionEvent::PartialResults {
            candidates: vec![text.to_string()],
        }
    }

    fn final_result(text: &str) -> RecognitionEvent {
        RecognitionEvent::FinalResults {
            candidates: vec![text.to_string()],
        }
    }

    fn start() -> EngineCall {
        EngineCall::Start("en-US".to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_wake_command_cycle() {
        let mut h = Harness::spawn(MockEngine::new());

        h.command(UserCommand::Restart).await;
        let snapshot = h.wait_for(Mode::Listening).await;
        assert!(snapshot.partial_text.is_empty());
        assert!(snapshot.result_text.is_empty());

        h.hear(partial("hey thworks")).await;
        let snapshot = h.wait_for(Mode::Awake).await;
        assert_eq!(snapshot.countdown_seconds, 5);
        assert!(snapshot.partial_text.is_empty());

        // Let the capture restart go through before speaking the command
        tokio::time::sleep(Duration::from_millis(450)).await;
        h.hear(final_result("Turn on the lights")).await;

        let snapshot = h.wait_for(Mode::Processing).await;
        assert_eq!(snapshot.result_text, "Turn on the lights");
        assert_eq!(snapshot.countdown_seconds, 0);

        let snapshot = h.wait_for(Mode::Result).await;
        assert_eq!(snapshot.result_text, "Turn on the lights");

        let snapshot = h.wait_for(Mode::Listening).await;
        assert!(snapshot.result_text.is_empty());

        assert_eq!(
            h.shutdown().await,
            vec![start(), EngineCall::Stop, start(), start(), EngineCall::Destroy]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wake_phrase_alone_waits_for_command() {
        let (event_tx, mut events) = broadcast::channel(64);
        let (commands, command_rx) = mpsc::channel(8);
        let (recognition_tx, recognition_rx) = mpsc::channel(8);
        let (shutdown, shutdown_rx) = broadcast::channel(1);

        let engine = ConsoleEngine::new(BufReader::new(&b"hey thworks\n"[..]), recognition_tx);
        let runtime = Runtime::new(
            StateMachine::new(SessionSettings::default()),
            engine,
            event_tx,
        );
        let task = tokio::spawn(runtime.run(command_rx, recognition_rx, shutdown_rx));

        commands.send(UserCommand::Restart).await.unwrap();

        let mut modes = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(60), events.recv())
                .await
                .expect("timed out waiting for session event")
                .expect("event channel closed");

            if let SessionEvent::SnapshotChanged { snapshot } = event {
                assert!(
                    snapshot.result_text.is_empty(),
                    "captured {:?} in {}",
                    snapshot.result_text,
                    snapshot.mode
                );
                modes.push(snapshot.mode);
                if snapshot.mode == Mode::Idle {
                    break;
                }
            }
        }

        modes.dedup();
        assert_eq!(modes, vec![Mode::Listening, Mode::Awake, Mode::Idle]);

        shutdown.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_expiry() {
        let mut h = Harness::spawn(MockEngine::new());

        h.command(UserCommand::Restart).await;
        h.wait_for(Mode::Listening).await;
        h.hear(final_result("hey thworks")).await;

        let mut countdowns = Vec::new();
        let mut expired = false;
        loop {
            match h.next_event().await {
                SessionEvent::SnapshotChanged { snapshot } if snapshot.mode == Mode::Awake => {
                    countdowns.push(snapshot.countdown_seconds);
                }
                SessionEvent::SnapshotChanged { snapshot } if snapshot.mode == Mode::Idle => {
                    assert_eq!(snapshot.countdown_seconds, 0);
                    break;
                }
                SessionEvent::WakeWindowExpired => expired = true,
                _ => {}
            }
        }

        assert!(expired);
        assert_eq!(countdowns, vec![5, 4, 3, 2, 1]);
        assert_eq!(
            h.shutdown().await,
            vec![start(), EngineCall::Stop, start(), EngineCall::Destroy]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_retries_listening() {
        let mut h = Harness::spawn(MockEngine::new());

        h.command(UserCommand::Restart).await;
        h.wait_for(Mode::Listening).await;

        h.hear(RecognitionEvent::Error {
            message: "network down".to_string(),
        })
        .await;
        let snapshot = h.wait_for(Mode::Error).await;
        assert_eq!(
            snapshot.error.as_deref(),
            Some("recognition error: network down")
        );

        let snapshot = h.wait_for(Mode::Listening).await;
        assert_eq!(snapshot.error, None);
        assert_eq!(h.shutdown().await, vec![start(), start(), EngineCall::Destroy]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_recovers() {
        let engine = MockEngine::new();
        engine.fail_next_starts(1);
        let mut h = Harness::spawn(engine);

        h.command(UserCommand::Restart).await;
        let snapshot = h.wait_for(Mode::Error).await;
        assert!(snapshot
            .error
            .as_deref()
            .unwrap_or_default()
            .starts_with("failed to start recognition"));

        h.wait_for(Mode::Listening).await;
        assert_eq!(h.shutdown().await, vec![start(), start(), EngineCall::Destroy]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_goes_idle_and_destroys_on_shutdown() {
        let mut h = Harness::spawn(MockEngine::new());

        h.command(UserCommand::Restart).await;
        h.wait_for(Mode::Listening).await;
        h.command(UserCommand::Stop).await;

        match h.next_event().await {
            SessionEvent::ModeChanged { from, to } => {
                assert_eq!(from, Mode::Listening);
                assert_eq!(to, Mode::Idle);
            }
            other => panic!("unexpected event {other}"),
        }

        assert_eq!(
            h.shutdown().await,
            vec![start(), EngineCall::Stop, EngineCall::Destroy]
        );
    }
}
