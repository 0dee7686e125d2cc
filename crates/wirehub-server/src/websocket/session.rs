//! Per-connection read and write pumps.
//!
//! The read pump decodes inbound frames and spawns one task per dispatched
//! message; each task funnels its reply into the connection's bounded queue.
//! The write pump is the only writer to the socket: it drains the queue,
//! sends keepalive pings and stops on `done`. Whichever pump exits first
//! closes the connection, which stops the other.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message as WsMessage;
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::counter;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn, Instrument, Span};
use wirehub_protocol::{decode, encode};

use super::connection::{Connection, Outbound};
use crate::dispatch::context::RequestContext;
use crate::dispatch::registry::DispatchTable;
use crate::metrics::{WS_DECODE_ERRORS_TOTAL, WS_FRAMES_RECEIVED_TOTAL, WS_FRAMES_SENT_TOTAL};

/// Run both pumps for `conn` and return once both have exited.
#[instrument(skip_all, fields(session_id = %conn.session_id()))]
pub(crate) async fn run_connection<S, R, E>(
    conn: Arc<Connection>,
    rx: mpsc::Receiver<Outbound>,
    sink: S,
    stream: R,
    dispatch: Arc<DispatchTable>,
    keepalive: Duration,
) where
    S: Sink<WsMessage> + Unpin + Send + 'static,
    S::Error: fmt::Display,
    R: Stream<Item = Result<WsMessage, E>> + Unpin + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let span = Span::current();
    let reader = tokio::spawn(
        read_pump(Arc::clone(&conn), stream, dispatch).instrument(span.clone()),
    );
    let writer = tokio::spawn(write_pump(Arc::clone(&conn), rx, sink, keepalive).instrument(span));

    let (read_result, write_result) = tokio::join!(reader, writer);
    for (pump, result) in [("read", read_result), ("write", write_result)] {
        if let Err(err) = result {
            warn!(pump, error = %err, "pump task failed");
        }
    }
    // Covers a pump that panicked before reaching its own close.
    let _ = conn.close();
    debug!("pumps stopped");
}

async fn read_pump<R, E>(conn: Arc<Connection>, mut stream: R, dispatch: Arc<DispatchTable>)
where
    R: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: fmt::Display,
{
    let done = conn.done().clone();
    loop {
        let frame = tokio::select! {
            biased;
            () = done.cancelled() => break,
            frame = stream.next() => frame,
        };
        match frame {
            Some(Ok(WsMessage::Binary(bytes))) => handle_frame(&conn, &dispatch, &bytes),
            Some(Ok(WsMessage::Text(text))) => {
                handle_frame(&conn, &dispatch, text.as_str().as_bytes());
            }
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {}
            Some(Ok(WsMessage::Close(frame))) => {
                debug!(?frame, "peer sent close");
                break;
            }
            Some(Err(err)) => {
                warn!(error = %err, "websocket read failed");
                break;
            }
            None => {
                debug!("websocket stream ended");
                break;
            }
        }
    }
    let _ = conn.close();
}

fn handle_frame(conn: &Arc<Connection>, dispatch: &Arc<DispatchTable>, frame: &[u8]) {
    counter!(WS_FRAMES_RECEIVED_TOTAL).increment(1);

    let message = match decode(frame, dispatch.as_ref()) {
        Ok(message) => message,
        Err(err) => {
            counter!(WS_DECODE_ERRORS_TOTAL).increment(1);
            warn!(error = %err, len = frame.len(), "dropping undecodable frame");
            return;
        }
    };

    if message.has_error() {
        debug!(
            msg_type = message.msg_type,
            request_id = %message.request_id,
            "ignoring inbound error frame"
        );
        return;
    }
    if !dispatch.has_handler(message.msg_type) {
        trace!(msg_type = message.msg_type, "no handler registered");
        return;
    }

    let conn = Arc::clone(conn);
    let dispatch = Arc::clone(dispatch);
    let _ = tokio::spawn(
        async move {
            let ctx = RequestContext::new(Arc::clone(&conn), message.msg_type, message.request_id);
            let Some(reply) = dispatch.dispatch(&ctx, message).await else {
                return;
            };
            if let Err(err) = conn.write(reply).await {
                debug!(error = %err, "reply dropped");
            }
        }
        .in_current_span(),
    );
}

/// Upper bound on the closing handshake once the write pump has stopped.
pub(crate) const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// How a single sink write ended.
enum Sent {
    Ok,
    Failed,
    Cancelled,
}

/// Write one frame, giving up as soon as `done` fires so a peer that stopped
/// reading cannot hold the pump.
async fn send_frame<S>(sink: &mut S, done: &CancellationToken, frame: WsMessage) -> Sent
where
    S: Sink<WsMessage> + Unpin,
    S::Error: fmt::Display,
{
    tokio::select! {
        biased;
        () = done.cancelled() => Sent::Cancelled,
        result = sink.send(frame) => match result {
            Ok(()) => Sent::Ok,
            Err(err) => {
                warn!(error = %err, "websocket write failed");
                Sent::Failed
            }
        },
    }
}

async fn write_pump<S>(
    conn: Arc<Connection>,
    mut rx: mpsc::Receiver<Outbound>,
    mut sink: S,
    keepalive: Duration,
) where
    S: Sink<WsMessage> + Unpin,
    S::Error: fmt::Display,
{
    let done = conn.done().clone();
    let mut ping = tokio::time::interval(keepalive);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let _ = ping.tick().await; // consume first immediate tick

    let mut sink_failed = false;
    loop {
        let frame = tokio::select! {
            biased;
            () = done.cancelled() => break,
            item = rx.recv() => match item {
                Some(Outbound::Message(message)) => match encode(&message) {
                    Ok(frame) => WsMessage::Binary(frame),
                    Err(err) => {
                        warn!(
                            msg_type = message.msg_type,
                            request_id = %message.request_id,
                            error = %err,
                            "failed to encode outbound message"
                        );
                        continue;
                    }
                },
                Some(Outbound::Drain) | None => {
                    debug!("outbound queue drained");
                    break;
                }
            },
            _ = ping.tick() => WsMessage::Ping(Bytes::new()),
        };
        let is_ping = matches!(frame, WsMessage::Ping(_));
        match send_frame(&mut sink, &done, frame).await {
            Sent::Ok if is_ping => trace!("sent keepalive ping"),
            Sent::Ok => counter!(WS_FRAMES_SENT_TOTAL).increment(1),
            Sent::Failed => {
                sink_failed = true;
                break;
            }
            Sent::Cancelled => break,
        }
    }

    let _ = conn.close();
    let goodbye = async {
        if !sink_failed {
            let _ = sink.send(WsMessage::Close(None)).await;
        }
        let _ = sink.close().await;
    };
    if tokio::time::timeout(CLOSE_GRACE, goodbye).await.is_err() {
        debug!("peer not reading, dropping socket without close handshake");
    }
}
