//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications for
//! session events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::events::{SessionEvent, UserCommand};
use crate::state::Snapshot;

use super::protocol::{DaemonStatus, Notification, Request, Response, MAX_FRAME_LEN};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
    /// Commands forwarded to the session runtime
    commands: mpsc::Sender<UserCommand>,
    /// Source of session events for subscribed clients
    events: Option<broadcast::Sender<SessionEvent>>,
}

/// Shared server state
struct ServerState {
    status: DaemonStatus,
    start_time: std::time::Instant,
}

/// What each client handler needs from the server
struct ClientContext {
    state: Arc<RwLock<ServerState>>,
    commands: mpsc::Sender<UserCommand>,
    events: Option<broadcast::Sender<SessionEvent>>,
}

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        status: DaemonStatus,
        commands: mpsc::Sender<UserCommand>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            status,
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state,
            shutdown_tx,
            commands,
            events: None,
        })
    }

    /// Create a new IPC server that can push session events to subscribers
    pub fn with_events(
        socket_path: &Path,
        status: DaemonStatus,
        commands: mpsc::Sender<UserCommand>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Result<Self> {
        let mut server = Self::new(socket_path, status, commands)?;
        server.events = Some(events);
        Ok(server)
    }

    /// Update the snapshot reported by `get_status`
    pub async fn set_snapshot(&self, snapshot: Snapshot) {
        let mut state = self.state.write().await;
        let old_mode = state.status.snapshot.mode;

        if old_mode != snapshot.mode {
            debug!(from = %old_mode, to = %snapshot.mode, "IPC server: mode updated");
        }
        state.status.snapshot = snapshot;
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let ctx = ClientContext {
                        state: Arc::clone(&self.state),
                        commands: self.commands.clone(),
                        events: self.events.clone(),
                    };
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, ctx) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(stream: UnixStream, ctx: ClientContext) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();

        // Frames are read on their own task so a half-read request is never
        // dropped while a notification is being written.
        let (request_tx, mut request_rx) = mpsc::channel::<Result<Request, String>>(8);
        let reader_task = tokio::spawn(async move {
            loop {
                match read_frame(&mut reader).await {
                    Ok(Some(bytes)) => {
                        let request =
                            serde_json::from_slice::<Request>(&bytes).map_err(|e| e.to_string());
                        if request_tx.send(request).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(?e, "failed to read request, disconnecting");
                        break;
                    }
                }
            }
        });

        let mut notifications: Option<broadcast::Receiver<SessionEvent>> = None;

        let result = loop {
            tokio::select! {
                incoming = request_rx.recv() => {
                    let Some(incoming) = incoming else {
                        debug!("client disconnected");
                        break Ok(());
                    };

                    let response = match incoming {
                        Ok(Request::Subscribe) => match &ctx.events {
                            Some(events) => {
                                notifications = Some(events.subscribe());
                                debug!("client subscribed to notifications");
                                Response::Subscribed
                            }
                            None => Response::Error {
                                code: "unsupported".to_string(),
                                message: "notifications are not available".to_string(),
                            },
                        },
                        Ok(request) => {
                            debug!(?request, "received request");
                            Self::process_request(request, &ctx).await
                        }
                        Err(message) => Response::Error {
                            code: "bad_request".to_string(),
                            message,
                        },
                    };

                    if let Err(e) = write_frame(&mut writer, &response).await {
                        break Err(e);
                    }
                }

                event = next_notification(&mut notifications) => match event {
                    Ok(event) => {
                        if let Err(e) = write_frame(&mut writer, &Notification::Notification { event }).await {
                            break Err(e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "subscriber lagged, notifications dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        notifications = None;
                    }
                },
            }
        };

        reader_task.abort();
        result
    }

    /// Process a request and return a response
    async fn process_request(request: Request, ctx: &ClientContext) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let mut state = ctx.state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                Response::Status(state.status.clone())
            }

            Request::Subscribe => Response::Subscribed,

            Request::Restart => Self::forward(UserCommand::Restart, ctx).await,

            Request::Stop => Self::forward(UserCommand::Stop, ctx).await,
        }
    }

    /// Hand a user command to the session runtime
    async fn forward(command: UserCommand, ctx: &ClientContext) -> Response {
        match ctx.commands.send(command).await {
            Ok(()) => {
                info!(?command, "command received via IPC");
                Response::Accepted { command }
            }
            Err(_) => Response::Error {
                code: "unavailable".to_string(),
                message: "session runtime is not running".to_string(),
            },
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Wait for the next event, or forever if not subscribed
async fn next_notification(
    rx: &mut Option<broadcast::Receiver<SessionEvent>>,
) -> Result<SessionEvent, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Read one length-prefixed frame. Returns `None` on a clean disconnect.
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        bail!("message of {len} bytes exceeds {MAX_FRAME_LEN} byte limit");
    }

    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;
    Ok(Some(msg_buf))
}

/// Send a length-prefixed JSON message
async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}
