//! WebSocket connection state: outbound queue, side data and the close latch.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use metrics::histogram;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use wirehub_protocol::{Message, SessionId};

use crate::errors::ConnectionClosed;
use crate::metrics::WS_CONNECTION_DURATION_SECONDS;
use crate::websocket::registry::ConnectionRegistry;

/// Item on a connection's outbound queue.
#[derive(Debug)]
pub(crate) enum Outbound {
    /// Encode and write this message.
    Message(Message),
    /// Stop the write pump once everything queued before it is written.
    Drain,
}

/// One upgraded socket.
///
/// The socket itself is owned by the read and write pumps; this handle is the
/// shared side: the bounded outbound queue, the `done` signal and side data.
pub struct Connection {
    session_id: SessionId,
    outbound: mpsc::Sender<Outbound>,
    done: CancellationToken,
    closed: AtomicBool,
    side_data: RwLock<HashMap<String, Value>>,
    registry: Weak<ConnectionRegistry>,
    connected_at: Instant,
}

impl Connection {
    /// Create a connection with a fresh session id and a queue of `capacity`.
    ///
    /// Returns the receiving half of the queue for the write pump.
    pub(crate) fn new(
        registry: Weak<ConnectionRegistry>,
        capacity: usize,
        done: CancellationToken,
    ) -> (Arc<Self>, mpsc::Receiver<Outbound>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let conn = Arc::new(Self {
            session_id: SessionId::new(),
            outbound,
            done,
            closed: AtomicBool::new(false),
            side_data: RwLock::new(HashMap::new()),
            registry,
            connected_at: Instant::now(),
        });
        (conn, rx)
    }

    /// Session identifier.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Enqueue a message for the write pump.
    ///
    /// Waits while the queue is full. Fails once the connection is closing;
    /// a message enqueued before close may still be discarded unwritten.
    pub async fn write(&self, message: Message) -> Result<(), ConnectionClosed> {
        self.enqueue(Outbound::Message(message)).await
    }

    /// Ask the write pump to stop after flushing what is already queued.
    pub async fn shutdown(&self) -> Result<(), ConnectionClosed> {
        self.enqueue(Outbound::Drain).await
    }

    async fn enqueue(&self, item: Outbound) -> Result<(), ConnectionClosed> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        tokio::select! {
            biased;
            () = self.done.cancelled() => Err(self.closed_error()),
            sent = self.outbound.send(item) => sent.map_err(|_| self.closed_error()),
        }
    }

    /// Close the connection. Only the first call has any effect.
    ///
    /// Cancels `done` (stopping both pumps, which then close the socket) and
    /// removes the session from the registry. Returns `true` on the call that
    /// performed the close.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.done.cancel();
        if let Some(registry) = self.registry.upgrade() {
            let _ = registry.remove(self.session_id.as_str());
        }
        let age = self.age();
        histogram!(WS_CONNECTION_DURATION_SECONDS).record(age.as_secs_f64());
        info!(session_id = %self.session_id, age_secs = age.as_secs_f64(), "connection closed");
        true
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Read a side-data value.
    pub fn side_data(&self, key: &str) -> Option<Value> {
        self.side_data.read().get(key).cloned()
    }

    /// Set a side-data value, replacing any previous one.
    pub fn set_side_data(&self, key: impl Into<String>, value: impl Into<Value>) {
        let _ = self.side_data.write().insert(key.into(), value.into());
    }

    /// The owning registry, if it is still alive.
    pub fn registry(&self) -> Option<Arc<ConnectionRegistry>> {
        self.registry.upgrade()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    pub(crate) fn done(&self) -> &CancellationToken {
        &self.done
    }

    fn closed_error(&self) -> ConnectionClosed {
        ConnectionClosed(self.session_id.clone())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("session_id", &self.session_id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
