//! Handler error codes and error type.

use wirehub_protocol::WireError;

// ── Error code constants ────────────────────────────────────────────

/// Payload missing or not of the registered prototype.
pub const INVALID_PAYLOAD: u32 = 400;
/// Caller is not allowed to perform the operation.
pub const UNAUTHORIZED: u32 = 401;
/// Requested resource not found.
pub const NOT_FOUND: u32 = 404;
/// Unexpected internal error.
pub const INTERNAL_ERROR: u32 = 500;

/// Error type returned by message handlers.
///
/// Converted into an error-flagged reply addressed to the originating request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerError {
    /// Payload missing or malformed for this operation.
    #[error("{message}")]
    InvalidPayload {
        /// Description of what is wrong.
        message: String,
    },

    /// Caller lacks permission.
    #[error("{message}")]
    Unauthorized {
        /// Description.
        message: String,
    },

    /// Requested resource not found.
    #[error("{message}")]
    NotFound {
        /// Description.
        message: String,
    },

    /// Internal failure.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },

    /// Domain-specific error with an arbitrary code.
    #[error("{message}")]
    Custom {
        /// Machine-readable code.
        code: u32,
        /// Human-readable message.
        message: String,
    },
}

impl HandlerError {
    /// Shorthand for [`HandlerError::InvalidPayload`].
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    /// Shorthand for [`HandlerError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Shorthand for [`HandlerError::Custom`].
    pub fn custom(code: u32, message: impl Into<String>) -> Self {
        Self::Custom {
            code,
            message: message.into(),
        }
    }

    /// Numeric code written to the wire.
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidPayload { .. } => INVALID_PAYLOAD,
            Self::Unauthorized { .. } => UNAUTHORIZED,
            Self::NotFound { .. } => NOT_FOUND,
            Self::Internal { .. } => INTERNAL_ERROR,
            Self::Custom { code, .. } => *code,
        }
    }

    /// Convert to the wire error body.
    pub fn to_wire(&self) -> WireError {
        WireError::new(self.code(), self.to_string())
    }
}

impl From<HandlerError> for WireError {
    fn from(err: HandlerError) -> Self {
        err.to_wire()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_per_variant() {
        assert_eq!(HandlerError::invalid_payload("x").code(), 400);
        assert_eq!(
            HandlerError::Unauthorized {
                message: "x".into()
            }
            .code(),
            401
        );
        assert_eq!(
            HandlerError::NotFound {
                message: "x".into()
            }
            .code(),
            404
        );
        assert_eq!(HandlerError::internal("x").code(), 500);
        assert_eq!(HandlerError::custom(4242, "x").code(), 4242);
    }

    #[test]
    fn to_wire_carries_code_and_message() {
        let wire: WireError = HandlerError::custom(7, "room is full").into();
        assert_eq!(wire.code, 7);
        assert_eq!(wire.message, "room is full");
    }

    #[test]
    fn display_is_message_only() {
        assert_eq!(HandlerError::internal("boom").to_string(), "boom");
    }
}
