//! Liveness report served at `GET /health`.

use std::time::Instant;

use serde::Serialize;

/// Serving state reported by `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Accepting upgrades.
    Ok,
    /// Shutdown has begun; new upgrades get 503.
    Draining,
}

/// Body of the `/health` response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Serving state.
    pub status: HealthStatus,
    /// Whole seconds since startup.
    pub uptime_secs: u64,
    /// Sessions currently in the registry.
    pub connections: usize,
}

/// Snapshot the server's liveness.
pub fn health_check(started: Instant, connections: usize, draining: bool) -> HealthResponse {
    let status = if draining {
        HealthStatus::Draining
    } else {
        HealthStatus::Ok
    };
    HealthResponse {
        status,
        uptime_secs: started.elapsed().as_secs(),
        connections,
    }
}
