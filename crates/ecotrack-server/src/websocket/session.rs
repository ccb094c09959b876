//! WebSocket session lifecycle: handles a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use ecotrack_core::Identity;
use ecotrack_hub::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use ecotrack_hub::{BroadcastHub, ClientConnection};
use futures::{Sink, SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::ServerConfig;

/// How long cleanup waits for the writer task to flush a Close frame.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Heartbeat bounds for one session.
#[derive(Clone, Copy, Debug)]
pub struct SessionLimits {
    /// Interval between server-initiated Ping frames.
    pub heartbeat_interval: Duration,
    /// Silence after which the client is considered dead.
    pub heartbeat_timeout: Duration,
}

impl SessionLimits {
    /// Limits from server configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_timeout: config.heartbeat_timeout(),
        }
    }
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

/// RAII guard that unregisters a session and stops its writer on drop
/// (even when the session future is cancelled or panics).
struct SessionGuard<'a> {
    hub: &'a BroadcastHub,
    connection: &'a Arc<ClientConnection>,
    writer: AbortHandle,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        let _ = self.hub.disconnect(self.connection);
        self.writer.abort();
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    }
}

/// Why a session's read loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EndReason {
    ClientClosed,
    TransportError,
    CloseRequested,
    Shutdown,
}

/// Run a WebSocket session for an accepted client.
///
/// 1. Registers the connection (closing any predecessor with the same id)
/// 2. Spawns the writer task, the only owner of the socket's sink, which
///    forwards queued frames and sends periodic Pings
/// 3. Dispatches inbound text frames in arrival order
/// 4. Ends on client close, transport error, eviction, heartbeat timeout,
///    or server shutdown
/// 5. Always unregisters on the way out
#[instrument(skip_all, fields(client_id = %identity.id, role = %identity.role))]
pub async fn run_ws_session(
    ws: WebSocket,
    identity: Identity,
    hub: Arc<BroadcastHub>,
    limits: SessionLimits,
    shutdown: CancellationToken,
) {
    let (ws_tx, mut ws_rx) = ws.split();
    let (connection, outbound) = hub.connect(identity);
    let audience = connection.audience.as_str();

    let connection_start = Instant::now();
    info!(audience, "client connected");
    counter!(WS_CONNECTIONS_TOTAL, "audience" => audience).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let mut writer = tokio::spawn(write_loop(
        ws_tx,
        outbound,
        Arc::clone(&connection),
        limits,
    ));
    let _guard = SessionGuard {
        hub: &hub,
        connection: &connection,
        writer: writer.abort_handle(),
    };

    let reason = loop {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            () = connection.closed() => break EndReason::CloseRequested,
            () = shutdown.cancelled() => {
                connection.begin_close();
                break EndReason::Shutdown;
            }
        };

        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "websocket read error");
                break EndReason::TransportError;
            }
            None => break EndReason::TransportError,
        };
        connection.mark_alive();

        match msg {
            Message::Text(text) => {
                let _ = hub.dispatch_inbound(&connection, text.as_str());
            }
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => {
                    let _ = hub.dispatch_inbound(&connection, text);
                }
                Err(_) => debug!(len = data.len(), "ignoring non-UTF8 binary frame"),
            },
            Message::Close(_) => {
                info!("client sent close frame");
                break EndReason::ClientClosed;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    };

    // Clean up
    let removed = hub.disconnect(&connection);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }

    info!(?reason, removed, "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL, "audience" => audience).increment(1);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
}

/// Forward queued frames to the socket and keep the heartbeat.
///
/// Exits when the queue closes, the connection's close signal fires, a
/// write fails, or the client stays silent past the heartbeat timeout.
/// A zero heartbeat interval is clamped to one millisecond.
async fn write_loop<S>(
    mut ws_tx: S,
    mut outbound: mpsc::Receiver<Arc<String>>,
    connection: Arc<ClientConnection>,
    limits: SessionLimits,
) where
    S: Sink<Message> + Unpin,
{
    let mut ping_interval =
        tokio::time::interval(limits.heartbeat_interval.max(Duration::from_millis(1)));
    // Skip the immediate first tick
    let _ = ping_interval.tick().await;

    loop {
        tokio::select! {
            msg = outbound.recv() => {
                let Some(text) = msg else { break };
                if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                    break;
                }
            }
            () = connection.closed() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            _ = ping_interval.tick() => {
                if !connection.check_alive()
                    && connection.last_pong_elapsed() > limits.heartbeat_timeout
                {
                    warn!(
                        timeout_secs = limits.heartbeat_timeout.as_secs(),
                        "client unresponsive, disconnecting"
                    );
                    connection.begin_close();
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }
    let _ = ws_tx.close().await;
}
