//! Shared-token handshake check.

use async_trait::async_trait;
use tracing::debug;
use wirehub_server::{Connection, Handshake, InterceptError, Interceptor};

/// Side-data key holding the authenticated user name.
pub const USER_KEY: &str = "user";

const BEARER_PREFIX: &str = "Bearer ";
const ANONYMOUS: &str = "anonymous";

/// Accepts a connection presenting the configured token, either as an
/// `Authorization: Bearer <token>` header or a `token` query parameter.
///
/// The user name comes from the `user` query parameter and is stored in the
/// connection's side data under [`USER_KEY`].
pub struct TokenInterceptor {
    token: String,
}

impl TokenInterceptor {
    /// Require `token` on every handshake.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Validate the handshake and return the user name.
    pub fn authenticate(&self, handshake: &Handshake) -> Result<String, InterceptError> {
        let presented = handshake
            .header("authorization")
            .and_then(|h| h.strip_prefix(BEARER_PREFIX))
            .or_else(|| handshake.query_param("token"))
            .ok_or_else(|| InterceptError::new("missing token"))?;
        if presented != self.token {
            return Err(InterceptError::new("invalid token"));
        }
        let user = handshake
            .query_param("user")
            .filter(|u| !u.is_empty())
            .unwrap_or(ANONYMOUS);
        Ok(user.to_owned())
    }
}

#[async_trait]
impl Interceptor for TokenInterceptor {
    async fn intercept(&self, conn: &Connection, handshake: &Handshake) -> Result<(), InterceptError> {
        let user = self.authenticate(handshake)?;
        debug!(session_id = %conn.session_id(), user = %user, "token accepted");
        conn.set_side_data(USER_KEY, user);
        Ok(())
    }
}
