use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use valet_analytics::{AnalyticsEvent, EventKind};
use valet_core::types::Utterance;

use crate::app::AppState;
use crate::auth::AuthClaims;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub text: String,
    pub user_id: String,
    pub session_id: String,
    #[serde(default = "bool_true")]
    pub use_context: bool,
}

fn bool_true() -> bool {
    true
}

/// POST /workflow/process — classify, resolve parameters and assemble a
/// step plan. The workflow (if any) is returned pending.
pub async fn process(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
    Json(body): Json<ProcessRequest>,
) -> Result<Json<Value>, ApiError> {
    let utterance = Utterance {
        text: body.text,
        user_id: body.user_id.clone(),
        session_id: body.session_id.clone(),
        use_context: body.use_context,
        parameters: HashMap::new(),
    };

    let report = state.engine.process(&utterance)?;

    if let Some(workflow) = &report.workflow {
        state.analytics.track(AnalyticsEvent::new(
            EventKind::WorkflowStart,
            &body.user_id,
            &body.session_id,
            json!({
                "workflow_id": workflow.workflow_id,
                "total_steps": workflow.total_steps,
                "complexity": workflow.complexity,
            }),
        ));
    }
    state.analytics.track(AnalyticsEvent::new(
        EventKind::ParameterResolution,
        &body.user_id,
        &body.session_id,
        json!({ "resolved": report.parameters.len() }),
    ));

    Ok(Json(json!(report)))
}

#[derive(Debug, Deserialize, Default)]
pub struct ContinueRequest {
    #[serde(default)]
    pub user_input: Option<String>,
}

/// POST /workflow/{id}/continue — advance the current step once,
/// optionally satisfying a prompted parameter.
pub async fn continue_workflow(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
    Path(workflow_id): Path<String>,
    body: Option<Json<ContinueRequest>>,
) -> Result<Json<Value>, ApiError> {
    let user_input = body.and_then(|Json(b)| b.user_input);
    let workflow = state
        .engine
        .continue_workflow(&workflow_id, user_input.as_deref())
        .await?;

    if workflow.status.is_terminal() {
        state.analytics.track(AnalyticsEvent::new(
            EventKind::WorkflowEnd,
            &workflow.user_id,
            &workflow.session_id,
            json!({
                "workflow_id": workflow.workflow_id,
                "status": workflow.status,
                "completion": workflow.completion_percentage,
            }),
        ));
    }

    Ok(Json(json!(workflow)))
}

/// GET /workflow/{id}
pub async fn status(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
    Path(workflow_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let workflow = state.engine.get(&workflow_id)?;
    Ok(Json(json!(workflow)))
}

/// GET /workflow/user/{user_id} — every workflow the user holds.
pub async fn list_for_user(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
    Path(user_id): Path<String>,
) -> Json<Value> {
    let workflows = state.engine.list_for_user(&user_id);
    Json(json!({ "user_id": user_id, "workflows": workflows }))
}
