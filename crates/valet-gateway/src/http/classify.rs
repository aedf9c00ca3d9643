use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use valet_analytics::{AnalyticsEvent, EventKind};
use valet_classifier::patterns::{patterns_for, CATEGORY_TABLE};
use valet_core::types::{CommandCategory, Priority, Utterance};

use crate::app::AppState;
use crate::auth::AuthClaims;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    pub text: String,
    pub user_id: String,
    pub session_id: String,
    #[serde(default)]
    pub use_context: bool,
    #[serde(default = "bool_true")]
    pub include_suggestions: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
}

fn bool_true() -> bool {
    true
}

/// POST /voice/classify — classify one utterance through the priority
/// queue (the queue absorbs bursts; high priority jumps the batch).
pub async fn classify(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
    Json(body): Json<ClassifyRequest>,
) -> Result<Json<Value>, ApiError> {
    let utterance = Utterance {
        text: body.text,
        user_id: body.user_id.clone(),
        session_id: body.session_id.clone(),
        use_context: body.use_context,
        parameters: body.parameters,
    };
    utterance.validate().map_err(ApiError::from)?;

    let rx = state.batch.submit(utterance, body.priority);
    let mut result = rx
        .await
        .map_err(|_| ApiError::internal("classification queue unavailable"))?;

    if !body.include_suggestions {
        result.suggestions.clear();
    }

    state.analytics.track(AnalyticsEvent::new(
        EventKind::Command,
        &body.user_id,
        &body.session_id,
        json!({
            "category": result.category,
            "success": result.category != CommandCategory::Unknown,
            "text_length": result.raw_text.chars().count(),
        }),
    ));

    let confidence_level = result.confidence_level();
    let requires_confirmation = result.requires_confirmation();
    let mut payload = serde_json::to_value(&result)
        .map_err(|e| ApiError::internal(e.to_string()))?;
    if let Some(obj) = payload.as_object_mut() {
        obj.insert("confidence_level".into(), json!(confidence_level));
        obj.insert("requires_confirmation".into(), json!(requires_confirmation));
    }
    Ok(Json(payload))
}

/// GET /voice/categories — the closed category set with parameter names.
pub async fn categories(
    State(_state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
) -> Json<Value> {
    let categories: Vec<Value> = CATEGORY_TABLE
        .iter()
        .map(|entry| {
            json!({
                "category": entry.category,
                "intent": entry.category.intent(),
                "parameters": entry.parameter_names,
                "pattern_count": entry.triggers.len(),
            })
        })
        .collect();
    Json(json!({ "categories": categories }))
}

/// GET /voice/categories/{category}/patterns
pub async fn category_patterns(
    State(_state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
    Path(category): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let category = CommandCategory::from_str(&category)
        .map_err(|e| ApiError::not_found(e))?;
    let entry = patterns_for(category)
        .ok_or_else(|| ApiError::not_found(format!("no patterns for '{category}'")))?;

    Ok(Json(json!({
        "category": category,
        "patterns": entry.triggers.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "exemplars": entry.exemplars,
    })))
}

/// GET /voice/metrics — classifier counters plus cache statistics.
pub async fn classifier_metrics(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
) -> Json<Value> {
    Json(json!({
        "classifier": state.classifier.metrics(),
        "cache": state.cache.stats(),
        "queue_depth": state.batch.len(),
    }))
}
