//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

use relay_core::RelayStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    pub uptime_secs: u64,
    /// Registered client channels.
    pub connections: usize,
    /// Clients with buffered replies.
    pub pending_clients: usize,
    pub correlations: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, stats: RelayStats) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: stats.connections,
        pending_clients: stats.pending_clients,
        correlations: stats.correlations,
    }
}
