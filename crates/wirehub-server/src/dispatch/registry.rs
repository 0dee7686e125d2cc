//! Dispatch table: message type → handler and payload prototype.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use tracing::{debug, warn};
use wirehub_protocol::{Body, CodecError, DecodePayload, Message, Payload, PayloadRef, Prototypes};

use crate::dispatch::context::RequestContext;
use crate::dispatch::errors::HandlerError;
use crate::metrics::{HANDLER_DURATION_SECONDS, HANDLER_ERRORS_TOTAL, HANDLER_INVOCATIONS_TOTAL};

/// Trait implemented by every message handler.
///
/// `Request` is the prototype: inbound bytes for the handler's message type are
/// decoded into a fresh `Request` per frame. The returned `Reply` is sent back
/// with the request's message type and request id as the final message of the
/// exchange.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Payload type decoded from inbound frames.
    type Request: DecodePayload + Clone;
    /// Payload type written in the reply.
    type Reply: Payload;

    /// Execute the handler.
    async fn handle(
        &self,
        ctx: &RequestContext,
        request: Self::Request,
    ) -> Result<Self::Reply, HandlerError>;
}

#[async_trait]
trait ErasedHandler: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<PayloadRef, CodecError>;

    async fn call(
        &self,
        ctx: &RequestContext,
        payload: Option<PayloadRef>,
    ) -> Result<PayloadRef, HandlerError>;
}

struct Typed<H>(H);

#[async_trait]
impl<H: MessageHandler> ErasedHandler for Typed<H> {
    fn decode(&self, bytes: &[u8]) -> Result<PayloadRef, CodecError> {
        Ok(Arc::new(H::Request::decode_payload(bytes)?))
    }

    async fn call(
        &self,
        ctx: &RequestContext,
        payload: Option<PayloadRef>,
    ) -> Result<PayloadRef, HandlerError> {
        let payload = payload.ok_or_else(|| HandlerError::invalid_payload("missing payload"))?;
        let request = payload
            .into_any()
            .downcast::<H::Request>()
            .map_err(|_| HandlerError::invalid_payload("unexpected payload type"))?;
        let reply = self.0.handle(ctx, Arc::unwrap_or_clone(request)).await?;
        Ok(Arc::new(reply))
    }
}

/// Adapter turning an async closure into a [`MessageHandler`].
struct FnHandler<F, Req, Rep> {
    f: F,
    _marker: PhantomData<fn(Req) -> Rep>,
}

#[async_trait]
impl<F, Fut, Req, Rep> MessageHandler for FnHandler<F, Req, Rep>
where
    F: Fn(RequestContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Rep, HandlerError>> + Send + 'static,
    Req: DecodePayload + Clone,
    Rep: Payload,
{
    type Request = Req;
    type Reply = Rep;

    async fn handle(&self, ctx: &RequestContext, request: Req) -> Result<Rep, HandlerError> {
        (self.f)(ctx.clone(), request).await
    }
}

/// Registry mapping message types to handlers.
///
/// Filled once before serving, then shared read-only behind an `Arc`.
pub struct DispatchTable {
    handlers: HashMap<u32, Arc<dyn ErasedHandler>>,
}

impl DispatchTable {
    /// Handlers running longer than this are logged as slow.
    const SLOW_HANDLER_THRESHOLD: Duration = Duration::from_secs(5);

    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for `msg_type`. Replaces any earlier registration.
    pub fn register(&mut self, msg_type: u32, handler: impl MessageHandler) {
        if self
            .handlers
            .insert(msg_type, Arc::new(Typed(handler)))
            .is_some()
        {
            debug!(msg_type, "handler replaced");
        }
    }

    /// Register an async closure as the handler for `msg_type`.
    pub fn register_fn<F, Fut, Req, Rep>(&mut self, msg_type: u32, f: F)
    where
        F: Fn(RequestContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Rep, HandlerError>> + Send + 'static,
        Req: DecodePayload + Clone,
        Rep: Payload,
    {
        self.register(
            msg_type,
            FnHandler {
                f,
                _marker: PhantomData,
            },
        );
    }

    /// Check whether a handler is registered for `msg_type`.
    pub fn has_handler(&self, msg_type: u32) -> bool {
        self.handlers.contains_key(&msg_type)
    }

    /// All registered message types (sorted).
    pub fn msg_types(&self) -> Vec<u32> {
        let mut types: Vec<u32> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the handler for `message` and build its terminal reply.
    ///
    /// Returns `None` when no handler is registered for the message type or the
    /// inbound frame is itself an error.
    pub async fn dispatch(&self, ctx: &RequestContext, message: Message) -> Option<Message> {
        let handler = self.handlers.get(&message.msg_type)?;
        let Message {
            msg_type,
            request_id,
            body,
            ..
        } = message;
        let Body::Payload(payload) = body else {
            debug!(msg_type, %request_id, "error frame not dispatched");
            return None;
        };

        let label = msg_type.to_string();
        counter!(HANDLER_INVOCATIONS_TOTAL, "msg_type" => label.clone()).increment(1);

        let start = Instant::now();
        let reply = match handler.call(ctx, payload).await {
            Ok(payload) => Message::reply_shared(msg_type, request_id, payload),
            Err(err) => {
                counter!(
                    HANDLER_ERRORS_TOTAL,
                    "msg_type" => label.clone(),
                    "code" => err.code().to_string()
                )
                .increment(1);
                debug!(msg_type, %request_id, code = err.code(), error = %err, "handler failed");
                Message::error(msg_type, request_id, err.to_wire())
            }
        };

        let duration = start.elapsed();
        histogram!(HANDLER_DURATION_SECONDS, "msg_type" => label).record(duration.as_secs_f64());

        if duration >= Self::SLOW_HANDLER_THRESHOLD {
            warn!(
                msg_type,
                duration_secs = duration.as_secs_f64(),
                "slow message handler"
            );
        }

        Some(reply)
    }
}

impl Prototypes for DispatchTable {
    fn decode_payload(&self, msg_type: u32, bytes: &[u8]) -> Option<Result<PayloadRef, CodecError>> {
        self.handlers.get(&msg_type).map(|handler| handler.decode(bytes))
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("msg_types", &self.msg_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak;

    use tokio_util::sync::CancellationToken;
    use wirehub_protocol::{decode, encode, RequestId, WireError};

    use crate::websocket::connection::Connection;

    #[derive(bincode::Encode, bincode::Decode, Debug, Clone, PartialEq)]
    struct Greeting {
        name: String,
    }

    #[derive(bincode::Encode, bincode::Decode, Debug, Clone, PartialEq)]
    struct Count(u32);

    // ── Test handler implementations ────────────────────────────────

    struct HelloHandler;

    #[async_trait]
    impl MessageHandler for HelloHandler {
        type Request = Greeting;
        type Reply = Greeting;

        async fn handle(
            &self,
            _ctx: &RequestContext,
            request: Greeting,
        ) -> Result<Greeting, HandlerError> {
            Ok(Greeting {
                name: format!("hello {}", request.name),
            })
        }
    }

    struct FailHandler;

    #[async_trait]
    impl MessageHandler for FailHandler {
        type Request = Count;
        type Reply = Count;

        async fn handle(&self, _ctx: &RequestContext, _request: Count) -> Result<Count, HandlerError> {
            Err(HandlerError::custom(4001, "quota exceeded"))
        }
    }

    fn make_ctx(msg_type: u32, request_id: RequestId) -> RequestContext {
        let (conn, _rx) = Connection::new(Weak::new(), 4, CancellationToken::new());
        RequestContext::new(conn, msg_type, request_id)
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn dispatch_replies_with_same_type_and_request_id() {
        let mut table = DispatchTable::new();
        table.register(5, HelloHandler);

        let request = Message::request(5, Greeting { name: "ada".into() });
        let id = request.request_id;
        let reply = table.dispatch(&make_ctx(5, id), request).await.unwrap();

        assert_eq!(reply.msg_type, 5);
        assert_eq!(reply.request_id, id);
        assert!(reply.is_end);
        assert!(!reply.has_error());
        assert_eq!(
            reply.payload_as::<Greeting>(),
            Some(&Greeting {
                name: "hello ada".into()
            })
        );
    }

    #[tokio::test]
    async fn handler_error_becomes_error_frame() {
        let mut table = DispatchTable::new();
        table.register(9, FailHandler);

        let request = Message::request(9, Count(1));
        let id = request.request_id;
        let reply = table.dispatch(&make_ctx(9, id), request).await.unwrap();

        assert!(reply.has_error());
        assert!(reply.is_end);
        assert_eq!(reply.request_id, id);
        assert_eq!(reply.wire_error(), Some(&WireError::new(4001, "quota exceeded")));
    }

    #[tokio::test]
    async fn unregistered_type_yields_nothing() {
        let table = DispatchTable::new();
        let request = Message::request(42, Count(1));
        let id = request.request_id;
        assert!(table.dispatch(&make_ctx(42, id), request).await.is_none());
    }

    #[tokio::test]
    async fn inbound_error_frame_not_dispatched() {
        let mut table = DispatchTable::new();
        table.register(5, HelloHandler);
        let id = RequestId::new();
        let inbound = Message::error(5, id, WireError::new(1, "client side"));
        assert!(table.dispatch(&make_ctx(5, id), inbound).await.is_none());
    }

    #[tokio::test]
    async fn missing_payload_is_invalid_payload() {
        let mut table = DispatchTable::new();
        table.register(5, HelloHandler);
        let id = RequestId::new();
        let inbound = Message {
            msg_type: 5,
            request_id: id,
            is_end: true,
            body: Body::Payload(None),
        };
        let reply = table.dispatch(&make_ctx(5, id), inbound).await.unwrap();
        assert_eq!(reply.wire_error().map(|e| e.code), Some(400));
    }

    #[tokio::test]
    async fn register_fn_closure_handler() {
        let mut table = DispatchTable::new();
        table.register_fn(3, |ctx: RequestContext, Count(n): Count| async move {
            Ok::<_, HandlerError>(Count(n + ctx.msg_type()))
        });

        let request = Message::request(3, Count(10));
        let id = request.request_id;
        let reply = table.dispatch(&make_ctx(3, id), request).await.unwrap();
        assert_eq!(reply.payload_as::<Count>(), Some(&Count(13)));
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let mut table = DispatchTable::new();
        table.register_fn(1, |_ctx: RequestContext, _: Count| async { Ok::<_, HandlerError>(Count(1)) });
        table.register_fn(1, |_ctx: RequestContext, _: Count| async { Ok::<_, HandlerError>(Count(2)) });
        assert_eq!(table.len(), 1);

        let request = Message::request(1, Count(0));
        let id = request.request_id;
        let reply = table.dispatch(&make_ctx(1, id), request).await.unwrap();
        assert_eq!(reply.payload_as::<Count>(), Some(&Count(2)));
    }

    #[test]
    fn table_acts_as_prototype_lookup() {
        let mut table = DispatchTable::new();
        table.register(5, HelloHandler);

        let frame = encode(&Message::request(5, Greeting { name: "bo".into() })).unwrap();
        let decoded = decode(&frame, &table).unwrap();
        assert_eq!(
            decoded.payload_as::<Greeting>(),
            Some(&Greeting { name: "bo".into() })
        );

        let unknown = encode(&Message::request(6, Count(1))).unwrap();
        let decoded = decode(&unknown, &table).unwrap();
        assert!(decoded.payload().is_none());
    }

    #[test]
    fn msg_types_sorted() {
        let mut table = DispatchTable::new();
        table.register(9, FailHandler);
        table.register(2, HelloHandler);
        table.register(5, HelloHandler);
        assert_eq!(table.msg_types(), vec![2, 5, 9]);
        assert!(table.has_handler(5));
        assert!(!table.has_handler(6));
        assert!(!table.is_empty());
    }
}
