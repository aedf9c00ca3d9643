use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health — liveness probe: service metadata, subsystem statuses and
/// the open-session count.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let tools: Vec<Value> = state
        .broker
        .status_all()
        .into_iter()
        .map(|t| {
            json!({
                "name": t.name,
                "status": t.status,
                "last_ping": t.last_ping,
            })
        })
        .collect();

    Json(json!({
        "status": if state.is_accepting() { "ok" } else { "shutting_down" },
        "service": "valet-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "subsystems": {
            "classifier": state.classifier.metrics().backend,
            "cache": state.cache.stats(),
            "kv": state.kv.is_some(),
            "tools": tools,
        },
        "open_sessions": state.sessions.open_sessions(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
