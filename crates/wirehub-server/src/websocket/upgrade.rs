//! Upgrade handler: handshake interceptors, registration and the blocking serve.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::counter;
use tracing::{debug, info, warn};

use super::connection::Connection;
use super::session::{run_connection, CLOSE_GRACE};
use crate::errors::{InterceptError, ServerError};
use crate::metrics::WS_HANDSHAKE_REJECTIONS_TOTAL;
use crate::server::AppState;

/// Longest close reason allowed in a control frame.
const MAX_CLOSE_REASON: usize = 123;

/// Request data available to interceptors.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    headers: HeaderMap,
    uri: Uri,
}

impl Handshake {
    /// Capture the upgrade request's headers and URI.
    pub fn new(headers: HeaderMap, uri: Uri) -> Self {
        Self { headers, uri }
    }

    /// All request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request URI.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// A header value, if present and valid ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// First value of a query parameter. Values are not percent-decoded.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.uri.query()?.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (k == key).then_some(v)
        })
    }
}

/// Check run once per connection before it is registered.
///
/// Interceptors run in registration order; the first error rejects the
/// connection and the rest are skipped. An interceptor may attach side data
/// (such as the authenticated user) to the connection.
#[async_trait]
pub trait Interceptor: Send + Sync + 'static {
    /// Accept or reject the connection.
    async fn intercept(&self, conn: &Connection, handshake: &Handshake)
    -> Result<(), InterceptError>;
}

#[async_trait]
impl<F> Interceptor for F
where
    F: Fn(&Connection, &Handshake) -> Result<(), InterceptError> + Send + Sync + 'static,
{
    async fn intercept(
        &self,
        conn: &Connection,
        handshake: &Handshake,
    ) -> Result<(), InterceptError> {
        self(conn, handshake)
    }
}

/// `GET <path>` upgrade endpoint.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    uri: Uri,
    State(state): State<AppState>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }

    let handshake = Handshake::new(headers, uri);
    let tracker = state.shutdown.tracker().clone();
    ws.max_message_size(state.config.max_message_size)
        .on_failed_upgrade(|err| warn!(error = %err, "websocket upgrade failed"))
        .on_upgrade(move |socket| tracker.track_future(serve_socket(state, socket, handshake)))
}

async fn serve_socket(state: AppState, socket: WebSocket, handshake: Handshake) {
    let (sink, stream) = socket.split();
    if let Err(err) = serve_transport(&state, sink, stream, handshake).await {
        debug!(error = %err, "connection setup failed");
    }
}

/// Run interceptors, register the connection and serve it until both pumps exit.
pub(crate) async fn serve_transport<S, R, E>(
    state: &AppState,
    mut sink: S,
    stream: R,
    handshake: Handshake,
) -> Result<(), ServerError>
where
    S: Sink<WsMessage> + Unpin + Send + 'static,
    S::Error: fmt::Display,
    R: Stream<Item = Result<WsMessage, E>> + Unpin + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let done = state.shutdown.token().child_token();
    let (conn, rx) = Connection::new(
        Arc::downgrade(&state.registry),
        state.config.queue_capacity(),
        done,
    );

    for interceptor in state.interceptors.iter() {
        if let Err(err) = interceptor.intercept(&conn, &handshake).await {
            counter!(WS_HANDSHAKE_REJECTIONS_TOTAL).increment(1);
            warn!(session_id = %conn.session_id(), reason = %err, "connection rejected");
            let frame = CloseFrame {
                code: close_code::POLICY,
                reason: truncate_reason(err.reason()).into(),
            };
            let goodbye = async {
                let _ = sink.send(WsMessage::Close(Some(frame))).await;
                let _ = sink.close().await;
            };
            let _ = tokio::time::timeout(CLOSE_GRACE, goodbye).await;
            return Err(err.into());
        }
    }

    state.registry.register(Arc::clone(&conn));
    info!(session_id = %conn.session_id(), path = %handshake.uri().path(), "connection established");

    run_connection(
        conn,
        rx,
        sink,
        stream,
        Arc::clone(&state.dispatch),
        state.config.keepalive_interval(),
    )
    .await;
    Ok(())
}

fn truncate_reason(reason: &str) -> String {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason.to_owned();
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_owned()
}
