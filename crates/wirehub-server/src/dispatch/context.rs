//! Per-request context handed to message handlers.

use std::sync::Arc;

use serde_json::Value;
use wirehub_protocol::{Message, RequestId, SessionId};

use crate::errors::ConnectionClosed;
use crate::websocket::connection::Connection;
use crate::websocket::registry::ConnectionRegistry;

/// The handler's view of one exchange.
#[derive(Clone)]
pub struct RequestContext {
    connection: Arc<Connection>,
    msg_type: u32,
    request_id: RequestId,
}

impl RequestContext {
    /// Context for a request received on `connection`.
    pub fn new(connection: Arc<Connection>, msg_type: u32, request_id: RequestId) -> Self {
        Self {
            connection,
            msg_type,
            request_id,
        }
    }

    /// Connection the request arrived on.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Session id of the originating connection.
    pub fn session_id(&self) -> &SessionId {
        self.connection.session_id()
    }

    /// Message type of the request.
    pub fn msg_type(&self) -> u32 {
        self.msg_type
    }

    /// Correlation id of the request.
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Read a side-data value set by an interceptor or earlier handler.
    pub fn side_data(&self, key: &str) -> Option<Value> {
        self.connection.side_data(key)
    }

    /// The registry the connection belongs to, while the server is alive.
    pub fn registry(&self) -> Option<Arc<ConnectionRegistry>> {
        self.connection.registry()
    }

    /// Queue an extra message on the originating connection ahead of the final reply.
    pub async fn send(&self, message: Message) -> Result<(), ConnectionClosed> {
        self.connection.write(message).await
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("session_id", self.session_id())
            .field("msg_type", &self.msg_type)
            .field("request_id", &self.request_id)
            .finish()
    }
}
