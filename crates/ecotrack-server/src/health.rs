//! `/health` endpoint.

use std::time::Instant;

use ecotrack_hub::ConnectionRegistry;
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Current WebSocket connection count.
    pub connections: usize,
    /// Administrative connections.
    pub admin_connections: usize,
    /// Operational connections.
    pub operational_connections: usize,
}

/// Build a health response from live registry counts.
pub fn health_check(start_time: Instant, registry: &ConnectionRegistry) -> HealthResponse {
    let admin_connections = registry.administrative_count();
    let operational_connections = registry.operational_count();
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: admin_connections + operational_connections,
        admin_connections,
        operational_connections,
    }
}
