//! Typed payloads and the prototype lookup used by the decoder.
//!
//! A *prototype* is a payload type registered against a message type. The
//! decoder asks a [`Prototypes`] implementation to turn the bytes after the
//! header into a fresh instance of that type. Any `bincode::Encode` type is a
//! [`Payload`]; adding `bincode::Decode` makes it a [`DecodePayload`].

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::CodecError;

/// Shared, type-erased payload carried by a [`Message`](crate::Message).
pub type PayloadRef = Arc<dyn Payload>;

/// A value that can be written as the body of a success frame.
pub trait Payload: Any + Send + Sync + fmt::Debug {
    /// Serialize into the frame body.
    fn encode_payload(&self) -> Result<Vec<u8>, CodecError>;

    /// Borrow as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Convert into a shared `Any` for owned downcasting.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T> Payload for T
where
    T: bincode::Encode + Any + Send + Sync + fmt::Debug,
{
    fn encode_payload(&self) -> Result<Vec<u8>, CodecError> {
        Ok(bincode::encode_to_vec(self, bincode::config::standard())?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A payload that can be allocated fresh from frame bytes.
pub trait DecodePayload: Payload + Sized {
    /// Decode a new instance from the frame body.
    fn decode_payload(bytes: &[u8]) -> Result<Self, CodecError>;
}

impl<T> DecodePayload for T
where
    T: Payload + bincode::Decode<()>,
{
    fn decode_payload(bytes: &[u8]) -> Result<Self, CodecError> {
        let (value, _read) = bincode::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(value)
    }
}

/// Lookup from message type to payload prototype.
pub trait Prototypes {
    /// Decode `bytes` with the prototype registered for `msg_type`.
    ///
    /// Returns `None` when no prototype is registered; the bytes are then left
    /// undecoded and the message carries no payload.
    fn decode_payload(&self, msg_type: u32, bytes: &[u8]) -> Option<Result<PayloadRef, CodecError>>;
}

type DecodeFn = fn(&[u8]) -> Result<PayloadRef, CodecError>;

fn decode_erased<T: DecodePayload>(bytes: &[u8]) -> Result<PayloadRef, CodecError> {
    Ok(Arc::new(T::decode_payload(bytes)?))
}

/// Plain message-type → prototype table, for peers that decode without handlers
/// (clients reading replies, tests).
#[derive(Default, Clone)]
pub struct PrototypeMap {
    decoders: HashMap<u32, DecodeFn>,
}

impl PrototypeMap {
    /// Empty map: every payload is left undecoded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` as the prototype for `msg_type`. Last registration wins.
    pub fn insert<T: DecodePayload>(&mut self, msg_type: u32) {
        let _ = self.decoders.insert(msg_type, decode_erased::<T>);
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with<T: DecodePayload>(mut self, msg_type: u32) -> Self {
        self.insert::<T>(msg_type);
        self
    }

    /// Whether a prototype is registered for `msg_type`.
    pub fn contains(&self, msg_type: u32) -> bool {
        self.decoders.contains_key(&msg_type)
    }
}

impl Prototypes for PrototypeMap {
    fn decode_payload(&self, msg_type: u32, bytes: &[u8]) -> Option<Result<PayloadRef, CodecError>> {
        self.decoders.get(&msg_type).map(|decode| decode(bytes))
    }
}

impl fmt::Debug for PrototypeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.decoders.keys().copied().collect();
        types.sort_unstable();
        f.debug_struct("PrototypeMap").field("msg_types", &types).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(bincode::Encode, bincode::Decode, Debug, Clone, PartialEq)]
    struct Chat {
        urgent: bool,
        text: String,
    }

    #[derive(bincode::Encode, bincode::Decode, Debug, Clone, PartialEq)]
    struct Counter(u64);

    #[test]
    fn encode_then_decode_typed() {
        let chat = Chat {
            urgent: true,
            text: "hi".into(),
        };
        let bytes = chat.encode_payload().unwrap();
        assert_eq!(Chat::decode_payload(&bytes).unwrap(), chat);
    }

    #[test]
    fn decode_garbage_fails() {
        // 0x09 is not a valid bool
        let err = Chat::decode_payload(&[0x09, 0x00]).unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn decode_empty_fails() {
        assert!(Chat::decode_payload(&[]).is_err());
    }

    #[test]
    fn downcast_through_any() {
        let payload: PayloadRef = Arc::new(Counter(7));
        assert_eq!(payload.as_any().downcast_ref::<Counter>(), Some(&Counter(7)));
        assert!(payload.as_any().downcast_ref::<Chat>().is_none());

        let owned = payload.into_any().downcast::<Counter>().unwrap();
        assert_eq!(*owned, Counter(7));
    }

    #[test]
    fn prototype_map_decodes_registered_types() {
        let map = PrototypeMap::new().with::<Counter>(5);
        let bytes = Counter(42).encode_payload().unwrap();

        let decoded = map.decode_payload(5, &bytes).unwrap().unwrap();
        assert_eq!(decoded.as_any().downcast_ref::<Counter>(), Some(&Counter(42)));
        assert!(map.decode_payload(6, &bytes).is_none());
    }

    #[test]
    fn prototype_map_last_registration_wins() {
        let mut map = PrototypeMap::new();
        map.insert::<Chat>(1);
        map.insert::<Counter>(1);
        let bytes = Counter(3).encode_payload().unwrap();
        let decoded = map.decode_payload(1, &bytes).unwrap().unwrap();
        assert!(decoded.as_any().is::<Counter>());
    }

    #[test]
    fn prototype_map_debug_lists_types() {
        let map = PrototypeMap::new().with::<Counter>(9).with::<Chat>(2);
        assert_eq!(format!("{map:?}"), "PrototypeMap { msg_types: [2, 9] }");
        assert!(map.contains(9));
    }
}
