//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Must be called at most once per process, before any metric is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Client messages forwarded to the operator (counter).
pub const RELAY_FORWARDED_TOTAL: &str = "relay_forwarded_total";
/// Failed forwards (counter, labels: kind).
pub const RELAY_FORWARD_FAILURES_TOTAL: &str = "relay_forward_failures_total";
/// Rejected relay requests (counter).
pub const RELAY_VALIDATION_FAILURES_TOTAL: &str = "relay_validation_failures_total";
/// Operator messages by outcome (counter, labels: outcome).
pub const RELAY_REPLIES_TOTAL: &str = "relay_replies_total";
/// Buffered replies delivered on registration (counter).
pub const RELAY_FLUSHED_TOTAL: &str = "relay_flushed_total";
/// Correlations dropped by the sweeper (counter).
pub const RELAY_CORRELATIONS_EVICTED_TOTAL: &str = "relay_correlations_evicted_total";
/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Open WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
