//! Axum HTTP + WebSocket surface of the relay.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use relay_core::{OperatorMessage, RelayCoordinator, RelayRequest};

use crate::bridge;
use crate::config::RelayConfig;
use crate::error::ApiError;
use crate::health::{self, HealthResponse};
use crate::metrics::{RELAY_FORWARDED_TOTAL, RELAY_FORWARD_FAILURES_TOTAL, RELAY_VALIDATION_FAILURES_TOTAL};
use crate::shutdown::ShutdownCoordinator;
use crate::ws;

/// Per-connection liveness settings.
#[derive(Clone, Copy, Debug)]
pub struct HeartbeatSettings {
    pub interval: Duration,
    /// Close after this long without a pong.
    pub timeout: Duration,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(90),
        }
    }
}

impl From<&RelayConfig> for HeartbeatSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            interval: config.heartbeat_interval(),
            timeout: config.heartbeat_timeout(),
        }
    }
}

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RelayCoordinator>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub start_time: Instant,
    pub heartbeat: HeartbeatSettings,
    /// `None` when no global recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/send", post(send_handler))
        .route("/ping", get(ping_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub struct RelayServer {
    state: AppState,
}

impl RelayServer {
    pub fn new(
        coordinator: Arc<RelayCoordinator>,
        heartbeat: HeartbeatSettings,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        Self {
            state: AppState {
                coordinator,
                shutdown,
                start_time: Instant::now(),
                heartbeat,
                metrics: None,
            },
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub fn coordinator(&self) -> &Arc<RelayCoordinator> {
        &self.state.coordinator
    }

    /// Route operator messages from `rx` until shutdown.
    pub fn attach_operator(&self, rx: mpsc::Receiver<OperatorMessage>) {
        let handle = bridge::spawn_reply_consumer(
            Arc::clone(&self.state.coordinator),
            rx,
            self.state.shutdown.token(),
        );
        self.state.shutdown.track(handle);
    }

    /// Periodically drop expired correlations.
    pub fn start_sweeper(&self, every: Duration) {
        let handle = bridge::spawn_correlation_sweeper(
            Arc::clone(&self.state.coordinator),
            every,
            self.state.shutdown.token(),
        );
        self.state.shutdown.track(handle);
    }

    /// Bind `addr` and serve until shutdown. Returns the bound address.
    pub async fn listen(&self, addr: &str) -> std::io::Result<SocketAddr> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let token = self.state.shutdown.token();

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "http server failed");
            }
        });
        self.state.shutdown.track(handle);

        info!(addr = %local_addr, "relay server listening");
        Ok(local_addr)
    }
}

/// POST /send
async fn send_handler(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    // Unparseable bodies are treated like empty ones.
    let request: RelayRequest = serde_json::from_slice(&body).unwrap_or_default();

    match state.coordinator.relay_from_client(request).await {
        Ok(_) => {
            metrics::counter!(RELAY_FORWARDED_TOTAL).increment(1);
            Ok(Json(json!({"ok": true})))
        }
        Err(e) => {
            if e.is_client_error() {
                metrics::counter!(RELAY_VALIDATION_FAILURES_TOTAL).increment(1);
            } else {
                metrics::counter!(RELAY_FORWARD_FAILURES_TOTAL, "kind" => e.error_kind()).increment(1);
            }
            Err(e.into())
        }
    }
}

/// GET /ping
async fn ping_handler() -> Json<Value> {
    Json(json!({"ok": true}))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.coordinator.stats()))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws::handle_socket(socket, state))
}
