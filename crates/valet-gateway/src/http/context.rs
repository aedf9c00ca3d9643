use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use valet_analytics::{AnalyticsEvent, EventKind};
use valet_core::types::CommandCategory;

use crate::app::AppState;
use crate::auth::AuthClaims;
use crate::error::ApiError;

/// GET /context/{user}/{session}/summary
pub async fn summary(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
    Path((user_id, session_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let summary = state
        .context
        .summary(&user_id, &session_id)
        .ok_or_else(|| ApiError::not_found(format!("no context for {user_id}/{session_id}")))?;
    Ok(Json(json!(summary)))
}

/// GET /context/{user}/{session}/suggestions
pub async fn suggestions(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
    Path((user_id, session_id)): Path<(String, String)>,
) -> Json<Value> {
    Json(json!({
        "user_id": user_id,
        "session_id": session_id,
        "suggestions": state.context.suggestions(&user_id, &session_id),
    }))
}

#[derive(Debug, Deserialize)]
pub struct InteractionRequest {
    pub user_input: String,
    pub bot_response: String,
    pub category: String,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
}

/// POST /context/{user}/{session}/interaction — atomic append of one turn.
pub async fn add_interaction(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
    Path((user_id, session_id)): Path<(String, String)>,
    Json(body): Json<InteractionRequest>,
) -> Result<Json<Value>, ApiError> {
    let category = CommandCategory::from_str(&body.category)
        .map_err(|e| ApiError::invalid_input(e))?;

    let updated = state.context.append_interaction(
        &user_id,
        &session_id,
        &body.user_input,
        &body.bot_response,
        category,
        body.parameters,
    );

    state.analytics.track(AnalyticsEvent::new(
        EventKind::ContextSwitch,
        &user_id,
        &session_id,
        json!({ "category": category }),
    ));

    Ok(Json(json!({
        "user_id": user_id,
        "session_id": session_id,
        "total_interactions": updated.history.len(),
        "current_topic": updated.current_topic,
    })))
}

/// DELETE /context/{user}/{session}
pub async fn clear_session(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
    Path((user_id, session_id)): Path<(String, String)>,
) -> Json<Value> {
    state.context.clear(&user_id, &session_id);
    Json(json!({ "cleared": true, "user_id": user_id, "session_id": session_id }))
}

/// DELETE /context/{user} — every session for the user.
pub async fn clear_user(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
    Path(user_id): Path<String>,
) -> Json<Value> {
    state.context.clear_user(&user_id);
    Json(json!({ "cleared": true, "user_id": user_id }))
}

/// GET /context/{user}/sessions
pub async fn user_sessions(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
    Path(user_id): Path<String>,
) -> Json<Value> {
    Json(json!({
        "user_id": user_id,
        "sessions": state.context.user_sessions(&user_id),
    }))
}
