//! Server-level error types.

use thiserror::Error;
use wirehub_protocol::SessionId;

/// Errors surfaced to the caller of the server or upgrade path.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or serving the listener failed.
    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),

    /// Configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(#[from] Box<figment::Error>),

    /// An interceptor rejected the connection during the handshake.
    #[error("connection rejected: {0}")]
    Intercepted(#[from] InterceptError),
}

/// Rejection returned by an interceptor. The socket is closed with this reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct InterceptError {
    reason: String,
}

impl InterceptError {
    /// Reject with a human-readable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// The rejection reason.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Enqueue attempted on a connection that is closing or closed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("connection {0} is closed")]
pub struct ConnectionClosed(pub SessionId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intercept_error_display_is_reason() {
        let err = InterceptError::new("missing token");
        assert_eq!(err.to_string(), "missing token");
        assert_eq!(err.reason(), "missing token");
    }

    #[test]
    fn intercepted_wraps_reason() {
        let err: ServerError = InterceptError::new("banned").into();
        assert_eq!(err.to_string(), "connection rejected: banned");
    }

    #[test]
    fn connection_closed_names_session() {
        let err = ConnectionClosed(SessionId::from("sess_9"));
        assert_eq!(err.to_string(), "connection sess_9 is closed");
    }

    #[test]
    fn io_error_converts_to_bind() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        let err: ServerError = io.into();
        assert!(matches!(err, ServerError::Bind(_)));
    }
}
