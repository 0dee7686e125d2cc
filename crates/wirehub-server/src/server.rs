//! `WireHubServer`: Axum router, listener and runtime API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};
use wirehub_protocol::Message;

use crate::config::ServerConfig;
use crate::dispatch::registry::DispatchTable;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::connection::Connection;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::upgrade::{ws_handler, Interceptor};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    /// Handler table, read-only while serving.
    pub(crate) dispatch: Arc<DispatchTable>,
    /// Live connections.
    pub(crate) registry: Arc<ConnectionRegistry>,
    /// Handshake checks in registration order.
    pub(crate) interceptors: Arc<[Arc<dyn Interceptor>]>,
    /// Shutdown coordinator.
    pub(crate) shutdown: ShutdownCoordinator,
    /// Server configuration.
    pub(crate) config: Arc<ServerConfig>,
    /// When the server started.
    pub(crate) start_time: Instant,
    /// Prometheus handle, when metrics are enabled.
    pub(crate) metrics: Option<PrometheusHandle>,
}

/// The wirehub server.
///
/// Lifecycle: build with [`new`](Self::new) and register interceptors, then
/// either [`listen`](Self::listen) on an owned socket or merge
/// [`router`](Self::router) into an existing Axum app, and finally
/// [`shutdown`](Self::shutdown).
pub struct WireHubServer {
    config: Arc<ServerConfig>,
    dispatch: Arc<DispatchTable>,
    registry: Arc<ConnectionRegistry>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    shutdown: ShutdownCoordinator,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl WireHubServer {
    /// Create a server around a fully populated dispatch table.
    pub fn new(config: ServerConfig, dispatch: DispatchTable) -> Self {
        Self {
            config: Arc::new(config),
            dispatch: Arc::new(dispatch),
            registry: Arc::new(ConnectionRegistry::new()),
            interceptors: Vec::new(),
            shutdown: ShutdownCoordinator::new(),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Append an interceptor to the handshake chain.
    #[must_use]
    pub fn with_interceptor(mut self, interceptor: impl Interceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Serve `/metrics` from this Prometheus handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub(crate) fn state(&self) -> AppState {
        AppState {
            dispatch: Arc::clone(&self.dispatch),
            registry: Arc::clone(&self.registry),
            interceptors: self.interceptors.iter().cloned().collect(),
            shutdown: self.shutdown.clone(),
            config: Arc::clone(&self.config),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        }
    }

    /// Build the Axum router: the upgrade path, `/health`, and `/metrics` when enabled.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route(&self.config.upgrade_path(), get(ws_handler))
            .route("/health", get(health_handler));
        if self.metrics.is_some() {
            router = router.route("/metrics", get(metrics_handler));
        }
        router.with_state(self.state())
    }

    /// Bind `host:port` and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task,
    /// which ends once [`shutdown`](Self::shutdown) is called.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(%local_addr, path = %self.config.upgrade_path(), "wirehub listening");
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %err, "server error");
            }
        });
        Ok((local_addr, handle))
    }

    /// Look up a live connection.
    pub fn get_connection(&self, session_id: &str) -> Option<Arc<Connection>> {
        self.registry.get(session_id)
    }

    /// Enqueue `message` to each listed session, skipping unknown ids.
    pub async fn send<I, S>(&self, session_ids: I, message: &Message) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.registry.send(session_ids, message).await
    }

    /// Enqueue `message` to every live connection.
    pub async fn broadcast_all(&self, message: &Message) -> usize {
        self.registry.broadcast_all(message).await
    }

    /// Stop accepting, close every connection and wait for their pumps.
    ///
    /// Returns `false` if the configured shutdown timeout elapsed first.
    pub async fn shutdown(&self) -> bool {
        self.shutdown
            .graceful_shutdown(self.config.shutdown_timeout())
            .await
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get the dispatch table.
    pub fn dispatch(&self) -> &Arc<DispatchTable> {
        &self.dispatch
    }

    /// Get the shutdown coordinator.
    pub fn shutdown_coordinator(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.len(),
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
