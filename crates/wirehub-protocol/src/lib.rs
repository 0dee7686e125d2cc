//! # wirehub-protocol
//!
//! Binary wire format for the wirehub messaging engine.
//!
//! - Fixed 44-byte little-endian frame header (`msgType`, `hasError`, `isEnd`, `requestId`)
//! - Typed payloads encoded with `bincode`, looked up by message type
//! - Error frames carrying a numeric code and a UTF-8 message
//!
//! Everything here is pure: no I/O, no shared state.

#![deny(unsafe_code)]

pub mod errors;
pub mod frame;
pub mod ids;
pub mod payload;

pub use errors::{CodecError, WireError};
pub use frame::{decode, encode, Body, Message, HEADER_LEN};
pub use ids::{RequestId, SessionId, REQUEST_ID_LEN};
pub use payload::{DecodePayload, Payload, PayloadRef, PrototypeMap, Prototypes};
