//! Frame layout and the encode/decode pair.
//!
//! ```text
//! offset 0..4   msgType     u32 LE
//! offset 4..6   hasError    u16 LE (0 or 1)
//! offset 6..8   isEnd       u16 LE (0 or 1)
//! offset 8..44  requestId   36 raw bytes
//! offset 44..   payload     success: encoded payload
//!                           error:   u32 LE code + UTF-8 message
//! ```

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::errors::{CodecError, WireError};
use crate::ids::{RequestId, REQUEST_ID_LEN};
use crate::payload::{Payload, PayloadRef, Prototypes};

/// Fixed header size in bytes.
pub const HEADER_LEN: usize = 4 + 2 + 2 + REQUEST_ID_LEN;

const ERROR_CODE_LEN: usize = 4;

/// Frame body: a typed payload or an error.
#[derive(Debug, Clone)]
pub enum Body {
    /// Success path. `None` when the message type has no registered prototype
    /// (inbound) or the message carries no data (outbound).
    Payload(Option<PayloadRef>),
    /// Error path (`hasError = 1`).
    Error(WireError),
}

/// One logical request or response unit.
#[derive(Debug, Clone)]
pub struct Message {
    /// Selects the handler and payload prototype.
    pub msg_type: u32,
    /// Correlation token, echoed to every reply of the exchange.
    pub request_id: RequestId,
    /// Last message of its exchange.
    pub is_end: bool,
    /// Payload or error.
    pub body: Body,
}

impl Message {
    /// Terminal success reply to `request_id`.
    pub fn reply(msg_type: u32, request_id: RequestId, payload: impl Payload) -> Self {
        Self::reply_shared(msg_type, request_id, Arc::new(payload))
    }

    /// Terminal success reply with an already-shared payload.
    pub fn reply_shared(msg_type: u32, request_id: RequestId, payload: PayloadRef) -> Self {
        Self {
            msg_type,
            request_id,
            is_end: true,
            body: Body::Payload(Some(payload)),
        }
    }

    /// Terminal error reply to `request_id`.
    pub fn error(msg_type: u32, request_id: RequestId, error: WireError) -> Self {
        Self {
            msg_type,
            request_id,
            is_end: true,
            body: Body::Error(error),
        }
    }

    /// Server-initiated message answering no request.
    pub fn push(msg_type: u32, payload: impl Payload) -> Self {
        Self::reply(msg_type, RequestId::NONE, payload)
    }

    /// Client-side request carrying a fresh request id.
    pub fn request(msg_type: u32, payload: impl Payload) -> Self {
        Self::reply(msg_type, RequestId::new(), payload)
    }

    /// Mark this message as a non-terminal part of a multi-part exchange.
    #[must_use]
    pub fn partial(mut self) -> Self {
        self.is_end = false;
        self
    }

    /// Whether this is an error frame.
    pub fn has_error(&self) -> bool {
        matches!(self.body, Body::Error(_))
    }

    /// The decoded payload, if any.
    pub fn payload(&self) -> Option<&PayloadRef> {
        match &self.body {
            Body::Payload(payload) => payload.as_ref(),
            Body::Error(_) => None,
        }
    }

    /// The payload downcast to `T`.
    pub fn payload_as<T: Payload>(&self) -> Option<&T> {
        self.payload().and_then(|p| p.as_any().downcast_ref::<T>())
    }

    /// The error, if this is an error frame.
    pub fn wire_error(&self) -> Option<&WireError> {
        match &self.body {
            Body::Error(err) => Some(err),
            Body::Payload(_) => None,
        }
    }
}

/// Encode a message into one frame.
///
/// Fails only when payload serialization fails; nothing is partially written.
pub fn encode(message: &Message) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + 64);
    buf.put_u32_le(message.msg_type);
    buf.put_u16_le(u16::from(message.has_error()));
    buf.put_u16_le(u16::from(message.is_end));
    buf.put_slice(message.request_id.as_bytes());

    match &message.body {
        Body::Payload(Some(payload)) => buf.put_slice(&payload.encode_payload()?),
        Body::Payload(None) => {}
        Body::Error(err) => {
            buf.put_u32_le(err.code);
            buf.put_slice(err.message.as_bytes());
        }
    }

    Ok(buf.freeze())
}

/// Decode one frame, using `prototypes` to materialize the payload.
///
/// A message type without a registered prototype is not an error: the body is
/// skipped and the message carries `Body::Payload(None)`.
pub fn decode<P>(frame: &[u8], prototypes: &P) -> Result<Message, CodecError>
where
    P: Prototypes + ?Sized,
{
    if frame.len() < HEADER_LEN {
        return Err(CodecError::FrameTooShort { len: frame.len() });
    }

    let mut buf = frame;
    let msg_type = buf.get_u32_le();
    let has_error = read_flag(&mut buf, "hasError")?;
    let is_end = read_flag(&mut buf, "isEnd")?;
    let request_id = RequestId::try_from(&buf[..REQUEST_ID_LEN])?;
    buf.advance(REQUEST_ID_LEN);

    let body = if has_error {
        Body::Error(decode_error_body(buf)?)
    } else {
        match prototypes.decode_payload(msg_type, buf) {
            Some(payload) => Body::Payload(Some(payload?)),
            None => Body::Payload(None),
        }
    };

    Ok(Message {
        msg_type,
        request_id,
        is_end,
        body,
    })
}

fn read_flag(buf: &mut &[u8], field: &'static str) -> Result<bool, CodecError> {
    match buf.get_u16_le() {
        0 => Ok(false),
        1 => Ok(true),
        value => Err(CodecError::InvalidFlag { field, value }),
    }
}

fn decode_error_body(mut buf: &[u8]) -> Result<WireError, CodecError> {
    if buf.len() < ERROR_CODE_LEN {
        return Err(CodecError::MalformedErrorBody { len: buf.len() });
    }
    let code = buf.get_u32_le();
    Ok(WireError {
        code,
        message: String::from_utf8_lossy(buf).into_owned(),
    })
}
