use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use valet_analytics::{AnalyticsEvent, EventKind};
use valet_core::config::MAX_PAYLOAD_BYTES;
use valet_protocol::OutboundMessage;
use valet_sessions::Outbound;

use crate::app::AppState;
use crate::ws::dispatch;

const PING_INTERVAL_SECS: u64 = 30;

/// Axum handler — upgrades HTTP to WebSocket at GET /ws/{client_id}.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    if !state.is_accepting() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(move |socket| handle_connection(socket, client_id, state))
        .into_response()
}

/// Per-connection pump — lives for the entire session lifetime. Outbound
/// messages flow through the session's ordered channel; inbound typed
/// messages are dispatched inline.
async fn handle_connection(socket: WebSocket, client_id: String, state: Arc<AppState>) {
    let (handle, mut outbound_rx) = state.sessions.connect(&client_id);
    state.analytics.track(AnalyticsEvent::new(
        EventKind::SessionStart,
        &client_id,
        &client_id,
        json!({}),
    ));

    let (mut tx, mut rx) = socket.split();

    let mut ping_interval =
        tokio::time::interval(std::time::Duration::from_secs(PING_INTERVAL_SECS));
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // the first tick fires immediately; skip it so the welcome leads
    ping_interval.tick().await;

    loop {
        tokio::select! {
            // client sent us something
            inbound = rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let text: &str = &text;
                        if text.len() > MAX_PAYLOAD_BYTES {
                            warn!(client_id, size = text.len(), "payload too large, closing");
                            break;
                        }
                        handle.touch();
                        let response = dispatch::handle_text(&state, &client_id, text).await;
                        if !handle.send(response.to_json()).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data)).await;
                        handle.touch();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(client_id, err = %e, "socket error");
                        break;
                    }
                    _ => {}
                }
            }

            // ordered outbound channel → socket
            queued = outbound_rx.recv() => {
                match queued {
                    Some(Outbound::Text(payload)) => {
                        if tx.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => break,
                }
            }

            // server-initiated keepalive
            _ = ping_interval.tick() => {
                if !handle.try_send(OutboundMessage::ping().to_json()) {
                    break;
                }
            }
        }
    }

    state.sessions.disconnect(&client_id);
    state.analytics.track(AnalyticsEvent::new(
        EventKind::SessionEnd,
        &client_id,
        &client_id,
        json!({ "messages": handle.message_count() }),
    ));
    info!(client_id, "ws connection closed");
}
