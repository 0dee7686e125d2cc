//! Live connections indexed by session id, with targeted send and broadcast.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use metrics::{counter, gauge};
use parking_lot::RwLock;
use tracing::{debug, warn};
use wirehub_protocol::{Message, SessionId};

use super::connection::Connection;
use crate::metrics::{
    WS_BROADCAST_DROPS_TOTAL, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};

/// Concurrent session id → connection map.
///
/// Lookups take the read lock; register and remove take the write lock. Fan-out
/// works on a snapshot so no lock is held across an enqueue.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<SessionId, Arc<Connection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Add a connection under its session id. Replaces an existing entry.
    pub fn register(&self, connection: Arc<Connection>) {
        let session_id = connection.session_id().clone();
        let previous = self.connections.write().insert(session_id.clone(), connection);
        if previous.is_none() {
            counter!(WS_CONNECTIONS_TOTAL).increment(1);
            gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        }
        debug!(%session_id, "connection registered");
    }

    /// Look up a connection.
    pub fn get(&self, session_id: &str) -> Option<Arc<Connection>> {
        self.connections.read().get(session_id).cloned()
    }

    /// Remove a connection. Called from the connection's close path.
    pub fn remove(&self, session_id: &str) -> Option<Arc<Connection>> {
        let removed = self.connections.write().remove(session_id);
        if removed.is_some() {
            counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
            gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
            debug!(session_id, "connection removed");
        }
        removed
    }

    /// Enqueue `message` to each listed session. Unknown ids are skipped.
    ///
    /// Returns how many connections accepted the message.
    pub async fn send<I, S>(&self, session_ids: I, message: &Message) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let targets: Vec<Arc<Connection>> = {
            let conns = self.connections.read();
            session_ids
                .into_iter()
                .filter_map(|id| conns.get(id.as_ref()).cloned())
                .collect()
        };
        Self::fan_out(targets, message).await
    }

    /// Enqueue `message` to every live connection.
    ///
    /// Connections that join during the call may be missed; ones closing
    /// during it drop the message.
    pub async fn broadcast_all(&self, message: &Message) -> usize {
        let targets: Vec<Arc<Connection>> = self.connections.read().values().cloned().collect();
        debug!(
            msg_type = message.msg_type,
            recipients = targets.len(),
            "broadcast to all"
        );
        Self::fan_out(targets, message).await
    }

    async fn fan_out(targets: Vec<Arc<Connection>>, message: &Message) -> usize {
        let results = join_all(
            targets
                .iter()
                .map(|conn| conn.write(message.clone())),
        )
        .await;

        let mut delivered = 0;
        for result in results {
            match result {
                Ok(()) => delivered += 1,
                Err(err) => {
                    counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                    warn!(error = %err, msg_type = message.msg_type, "dropped fan-out message");
                }
            }
        }
        delivered
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no connection is live.
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Session ids of all live connections (sorted).
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.connections.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
