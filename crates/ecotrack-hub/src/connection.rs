//! Per-client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use ecotrack_core::{Audience, Identity, Role};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Lifecycle of a connection. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionState {
    /// Registered, handshake not yet complete.
    Connecting = 0,
    /// Accepting outbound messages.
    Open = 1,
    /// Close requested (eviction, prune, shutdown); no further sends.
    Closing = 2,
    /// Session finished and unregistered.
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Result of a single non-blocking send attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Queued for the writer task.
    Delivered,
    /// Queue full; the message was dropped and counted.
    Full,
    /// The writer task is gone.
    Closed,
    /// The connection is not in [`ConnectionState::Open`].
    NotOpen,
}

/// A connected realtime client.
///
/// The receiving half of `tx` belongs to the session's writer task, which is
/// the only code that touches the socket's sink.
pub struct ClientConnection {
    /// Caller-supplied client id.
    pub id: String,
    /// Role fixed at handshake.
    pub role: Role,
    /// Audience fixed at handshake.
    pub audience: Audience,
    tx: mpsc::Sender<Arc<String>>,
    state: AtomicU8,
    /// When this connection was registered.
    pub connected_at: Instant,
    /// Whether the client has answered since the last heartbeat check.
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    /// Lifetime count of messages dropped because the queue was full.
    dropped_messages: AtomicU64,
    close: CancellationToken,
}

impl ClientConnection {
    /// Create a connection in [`ConnectionState::Connecting`].
    pub fn new(identity: Identity, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        let audience = identity.audience();
        Self {
            id: identity.id,
            role: identity.role,
            audience,
            tx,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            close: CancellationToken::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether sends are currently accepted.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// `CONNECTING -> OPEN`. Returns `false` if the connection already moved on.
    pub fn mark_open(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Connecting as u8,
                ConnectionState::Open as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Request close: stop accepting sends and fire the close signal.
    pub fn begin_close(&self) {
        let _ = self.state.fetch_max(ConnectionState::Closing as u8, Ordering::AcqRel);
        self.close.cancel();
    }

    /// Terminal state, set once the session has unregistered.
    pub fn mark_closed(&self) {
        self.state.store(ConnectionState::Closed as u8, Ordering::Release);
        self.close.cancel();
    }

    /// Resolves once [`begin_close`](Self::begin_close) or
    /// [`mark_closed`](Self::mark_closed) has been called.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.close.cancelled()
    }

    /// Whether a close has been requested.
    pub fn is_closing(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Queue a serialized frame without waiting.
    pub fn send(&self, message: Arc<String>) -> SendOutcome {
        if !self.is_open() {
            return SendOutcome::NotOpen;
        }
        match self.tx.try_send(message) {
            Ok(()) => SendOutcome::Delivered,
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Full
            }
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or any inbound frame received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or registration).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("state", &self.state())
            .field("dropped_messages", &self.drop_count())
            .finish_non_exhaustive()
    }
}
