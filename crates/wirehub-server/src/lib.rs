//! # wirehub-server
//!
//! Axum `WebSocket` engine for the wirehub binary protocol.
//!
//! - Dispatch table: message type → typed handler, built once before serving
//! - Connections with a bounded outbound queue, side data and close-once semantics
//! - Read/write pumps per connection with keepalive pings
//! - Connection registry with targeted send and broadcast
//! - Upgrade handler running handshake interceptors
//! - Graceful shutdown via `CancellationToken` + `TaskTracker`

#![deny(unsafe_code)]

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use axum::http::{HeaderMap, Uri};
pub use config::ServerConfig;
pub use dispatch::context::RequestContext;
pub use dispatch::errors::HandlerError;
pub use dispatch::registry::{DispatchTable, MessageHandler};
pub use errors::{ConnectionClosed, InterceptError, ServerError};
pub use server::WireHubServer;
pub use websocket::connection::Connection;
pub use websocket::registry::ConnectionRegistry;
pub use websocket::upgrade::{Handshake, Interceptor};
