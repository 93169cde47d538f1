//! Live client channel state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::ids::{ClientIdentity, ConnectionId};
use crate::message::ServerEvent;

/// One live bidirectional connection to a client.
///
/// The transport owns the receiving half of `tx` and writes whatever arrives
/// there to the socket. Two channels are the same channel iff their `id`s match.
pub struct ClientConnection {
    /// Unique per accepted connection, never reused.
    pub id: ConnectionId,
    /// Identity announced by the client via `register`.
    identity: Mutex<Option<ClientIdentity>>,
    tx: mpsc::UnboundedSender<Arc<String>>,
    pub connected_at: Instant,
    is_alive: AtomicBool,
    /// Cancelled when the relay wants the transport to close this connection.
    close: CancellationToken,
}

impl ClientConnection {
    pub fn new(tx: mpsc::UnboundedSender<Arc<String>>) -> Self {
        Self::with_id(ConnectionId::new(), tx)
    }

    pub fn with_id(id: ConnectionId, tx: mpsc::UnboundedSender<Arc<String>>) -> Self {
        Self {
            id,
            identity: Mutex::new(None),
            tx,
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
            close: CancellationToken::new(),
        }
    }

    /// Convenience for tests and in-process transports.
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<Arc<String>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self::new(tx)), rx)
    }

    /// Bind this connection to an identity, returning the previous binding.
    pub fn bind(&self, identity: ClientIdentity) -> Option<ClientIdentity> {
        self.identity.lock().replace(identity)
    }

    pub fn identity(&self) -> Option<ClientIdentity> {
        self.identity.lock().clone()
    }

    /// Queue a raw text frame. Returns `false` once the transport is gone.
    pub fn send(&self, message: Arc<String>) -> bool {
        self.tx.send(message).is_ok()
    }

    /// Serialize an event and queue it.
    pub fn send_event(&self, event: &ServerEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(json) => self.send(Arc::new(json)),
            Err(e) => {
                warn!(conn_id = %self.id, error = %e, "failed to serialize server event");
                false
            }
        }
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed() && !self.close.is_cancelled()
    }

    /// Ask the transport to close this connection.
    pub fn close(&self) {
        self.close.cancel();
    }

    /// Token the transport waits on to learn about [`close`](Self::close).
    pub fn close_token(&self) -> CancellationToken {
        self.close.clone()
    }

    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Check and reset the alive flag. `true` if a pong arrived since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl PartialEq for ClientConnection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ClientConnection {}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("identity", &self.identity())
            .field("open", &self.is_open())
            .finish()
    }
}
