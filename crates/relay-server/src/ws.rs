//! One task pair per WebSocket: a writer draining the connection queue with
//! periodic pings, and a reader handling `register` and pongs.

use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use relay_core::{ClientConnection, ClientEvent, RegisterOutcome, RelayCoordinator};

use crate::metrics::{RELAY_FLUSHED_TOTAL, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL};
use crate::server::{AppState, HeartbeatSettings};

pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (connection, rx) = ClientConnection::channel();
    metrics::counter!(WS_CONNECTIONS_TOTAL).increment(1);
    metrics::gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    info!(conn_id = %connection.id, "websocket connected");

    let (ws_tx, ws_rx) = socket.split();
    let mut writer = tokio::spawn(write_loop(ws_tx, rx, Arc::clone(&connection), state.heartbeat));
    let mut reader = tokio::spawn(read_loop(
        ws_rx,
        Arc::clone(&connection),
        Arc::clone(&state.coordinator),
    ));
    let shutdown = state.shutdown.token();

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
        () = shutdown.cancelled() => {
            connection.close();
            let _ = (&mut writer).await;
            reader.abort();
        }
    }

    let _ = state.coordinator.unregister(&connection);
    metrics::gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    info!(
        conn_id = %connection.id,
        client_id = connection.identity().as_ref().map(|c| c.as_str()).unwrap_or("-"),
        age_secs = connection.age().as_secs(),
        "websocket disconnected"
    );
}

async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::UnboundedReceiver<Arc<String>>,
    connection: Arc<ClientConnection>,
    heartbeat: HeartbeatSettings,
) {
    let mut ping_interval = tokio::time::interval(heartbeat.interval);
    ping_interval.tick().await; // consume first immediate tick
    let max_missed = (heartbeat.timeout.as_secs() / heartbeat.interval.as_secs().max(1)).max(1);
    let mut missed: u64 = 0;
    let close = connection.close_token();

    loop {
        tokio::select! {
            biased;
            msg = rx.recv() => match msg {
                Some(text) => {
                    if ws_tx.send(WsMessage::Text(text.as_str().to_owned().into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            () = close.cancelled() => {
                // Whatever was queued before the close request still goes out.
                while let Ok(text) = rx.try_recv() {
                    if ws_tx.send(WsMessage::Text(text.as_str().to_owned().into())).await.is_err() {
                        return;
                    }
                }
                let frame = CloseFrame {
                    code: close_code::NORMAL,
                    reason: String::new().into(),
                };
                let _ = ws_tx.send(WsMessage::Close(Some(frame))).await;
                break;
            }
            _ = ping_interval.tick() => {
                if connection.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        warn!(conn_id = %connection.id, missed, "heartbeat timed out");
                        break;
                    }
                }
                if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                trace!(conn_id = %connection.id, "sent ping");
            }
        }
    }
}

async fn read_loop(
    mut ws_rx: SplitStream<WebSocket>,
    connection: Arc<ClientConnection>,
    coordinator: Arc<RelayCoordinator>,
) {
    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            WsMessage::Text(text) => {
                connection.mark_alive();
                let _ = handle_client_text(&coordinator, &connection, text.as_str());
            }
            WsMessage::Pong(_) => connection.mark_alive(),
            WsMessage::Close(_) => break,
            _ => {}
        }
    }
}

/// Apply one client envelope. Returns the registration outcome, if any.
pub fn handle_client_text(
    coordinator: &RelayCoordinator,
    connection: &Arc<ClientConnection>,
    text: &str,
) -> Option<RegisterOutcome> {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            debug!(conn_id = %connection.id, error = %e, "ignoring unrecognized client frame");
            return None;
        }
    };

    match event {
        ClientEvent::Register { client_id: Some(identity) } if !identity.is_empty() => {
            let outcome = coordinator.register(identity, Arc::clone(connection));
            if outcome.flushed > 0 {
                metrics::counter!(RELAY_FLUSHED_TOTAL).increment(outcome.flushed as u64);
            }
            Some(outcome)
        }
        ClientEvent::Register { .. } => {
            debug!(conn_id = %connection.id, "register without clientId ignored");
            None
        }
    }
}
