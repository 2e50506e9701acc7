//! wake-voice-daemon: listens for a wake phrase, then captures one command
//!
//! This daemon provides:
//! - Continuous listening through a speech engine adapter
//! - Explicit state machine for Idle, Listening, Awake, Processing, Result
//!   and Error modes, with a bounded awake window
//! - IPC server exposing the display snapshot and restart/stop commands
//!
//! The bundled engine reads utterances from stdin, one per line; prefix a
//! line with `!error` to simulate an engine failure.

mod config;
mod display;
mod engine;
mod error;
mod events;
mod ipc;
mod lifecycle;
mod state;
mod timer;
mod wake;

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::engine::ConsoleEngine;
use crate::events::{SessionEvent, UserCommand};
use crate::ipc::{DaemonStatus, Server};
use crate::lifecycle::ShutdownSignal;
use crate::state::{Runtime, StateMachine};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let result = runtime.block_on(run());

    // A pending stdin read holds a blocking thread that only returns on the
    // next line of input; don't wait for it
    runtime.shutdown_timeout(Duration::from_millis(100));

    result
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "wake-voice-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        ?config.socket_path,
        wake_phrase = %config.session.wake_phrase,
        locale = %config.session.locale,
        "configuration loaded"
    );

    // Create shutdown signal handler
    let mut shutdown = ShutdownSignal::new()?;

    // Create channels for inter-component communication
    // IPC server -> session runtime
    let (command_tx, command_rx) = mpsc::channel::<UserCommand>(32);
    // Speech engine -> session runtime
    let (recognition_tx, recognition_rx) = mpsc::channel(64);
    // Session runtime -> IPC server and display
    let (event_tx, _event_rx) = broadcast::channel::<SessionEvent>(64);
    // Main -> session runtime, to stop and tear down
    let (stop_tx, stop_rx) = broadcast::channel::<()>(1);

    // Create the speech engine and the session runtime around it
    let engine = ConsoleEngine::new(BufReader::new(tokio::io::stdin()), recognition_tx);
    let state_machine = StateMachine::new(config.session.clone());
    let runtime = Runtime::new(state_machine, engine, event_tx.clone());

    // Create IPC server with event subscription
    let status = DaemonStatus::new(config.session.wake_phrase.as_str(), &config.session.locale);
    let server = Server::with_events(&config.socket_path, status, command_tx.clone(), event_tx.clone())?;

    // Subscribe before anything can transition
    let mut display_rx = event_tx.subscribe();

    let runtime_task = tokio::spawn(runtime.run(command_rx, recognition_rx, stop_rx));

    // Start listening right away, like opening the app
    if config.autostart {
        command_tx.send(UserCommand::Restart).await?;
    }

    let server_for_events = &server;

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Keep the IPC snapshot current and render the display
        _ = async {
            loop {
                match display_rx.recv().await {
                    Ok(SessionEvent::SnapshotChanged { snapshot }) => {
                        info!(
                            status = %display::status_line(&snapshot),
                            card = %display::card_text(&snapshot),
                            partial = %snapshot.partial_text,
                            "display updated"
                        );
                        server_for_events.set_snapshot(snapshot).await;
                    }
                    Ok(event) => {
                        info!(%event, "session event");
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "session event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("session event handler exited");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    let _ = stop_tx.send(());
    if let Err(e) = runtime_task.await {
        error!(?e, "session runtime task failed");
    }
    server.shutdown().await;

    info!("wake-voice-daemon stopped");

    Ok(())
}
