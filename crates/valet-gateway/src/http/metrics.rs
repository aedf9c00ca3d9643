use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::AuthClaims;

/// GET /metrics — system-wide counters for operators.
pub async fn metrics_handler(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
) -> Json<Value> {
    Json(json!({
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
        "classifier": state.classifier.metrics(),
        "cache": state.cache.stats(),
        "batch_queue_depth": state.batch.len(),
        "active_contexts": state.context.active_contexts(),
        "active_workflows": state.engine.active_workflows(),
        "open_sessions": state.sessions.open_sessions(),
        "tools": state.broker.status_all(),
        "analytics": state.analytics.metrics(),
    }))
}
