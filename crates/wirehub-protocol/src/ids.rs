//! Session and request identifiers.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::errors::CodecError;

/// Width of the request id field in the frame header.
pub const REQUEST_ID_LEN: usize = 36;

/// Opaque correlation token echoed from a request to every reply in its exchange.
///
/// Always exactly [`REQUEST_ID_LEN`] raw bytes. Ids minted here are hyphenated
/// UUIDs, but peers may send any 36 bytes and they are echoed verbatim.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId([u8; REQUEST_ID_LEN]);

impl RequestId {
    /// All-zero id, used for server-initiated pushes that answer no request.
    pub const NONE: Self = Self([0; REQUEST_ID_LEN]);

    /// Mint a fresh random request id.
    pub fn new() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    /// Render a UUID in its 36-character hyphenated form.
    pub fn from_uuid(uuid: Uuid) -> Self {
        let mut buf = [0u8; REQUEST_ID_LEN];
        let _ = uuid.hyphenated().encode_lower(&mut buf);
        Self(buf)
    }

    /// Wrap raw header bytes.
    pub const fn from_bytes(bytes: [u8; REQUEST_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw header bytes.
    pub const fn as_bytes(&self) -> &[u8; REQUEST_ID_LEN] {
        &self.0
    }

    /// Whether this is the all-zero push id.
    pub fn is_none(&self) -> bool {
        self.0 == [0; REQUEST_ID_LEN]
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<&[u8]> for RequestId {
    type Error = CodecError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let raw: [u8; REQUEST_ID_LEN] = bytes
            .try_into()
            .map_err(|_| CodecError::InvalidRequestId { len: bytes.len() })?;
        Ok(Self(raw))
    }
}

impl FromStr for RequestId {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.as_bytes())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("RequestId(NONE)")
        } else {
            write!(f, "RequestId({self})")
        }
    }
}

/// Identity of one live connection, generated once at upgrade time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new random session id (hyphenated UUID v4, 36 bytes).
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// String form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_request_id_is_36_bytes_of_text() {
        let id = RequestId::new();
        let text = id.to_string();
        assert_eq!(text.len(), REQUEST_ID_LEN);
        assert_eq!(text.matches('-').count(), 4);
    }

    #[test]
    fn request_ids_are_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[test]
    fn parse_request_id_from_str() {
        let raw = "123e4567-e89b-12d3-a456-426614174000";
        let id: RequestId = raw.parse().unwrap();
        assert_eq!(id.as_bytes(), raw.as_bytes());
        assert_eq!(id.to_string(), raw);
    }

    #[test]
    fn wrong_length_request_id_rejected() {
        let err = "too-short".parse::<RequestId>().unwrap_err();
        assert!(matches!(err, CodecError::InvalidRequestId { len: 9 }));
    }

    #[test]
    fn none_request_id() {
        assert!(RequestId::NONE.is_none());
        assert!(!RequestId::new().is_none());
        assert_eq!(format!("{:?}", RequestId::NONE), "RequestId(NONE)");
    }

    #[test]
    fn arbitrary_bytes_survive() {
        let mut raw = [0xAB_u8; REQUEST_ID_LEN];
        raw[0] = 0xFF;
        let id = RequestId::from_bytes(raw);
        assert_eq!(id.as_bytes(), &raw);
    }

    #[test]
    fn session_id_shape() {
        let id = SessionId::new();
        assert_eq!(id.as_str().len(), 36);
        assert_ne!(id, SessionId::new());
    }

    #[test]
    fn session_id_borrows_as_str() {
        let mut map = std::collections::HashMap::new();
        let id = SessionId::from("sess_1");
        let _ = map.insert(id, 1);
        assert_eq!(map.get("sess_1"), Some(&1));
    }
}
