use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::AuthClaims;
use crate::error::ApiError;

/// GET /tools/status — per-tool health, refreshed by pinging each tool.
pub async fn tools_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let mut tools = Vec::new();
    for descriptor in state.broker.status_all() {
        // ping refreshes last_ping and degrades the status on failure
        let refreshed = state
            .broker
            .ping(&descriptor.name)
            .await
            .unwrap_or(descriptor);
        tools.push(json!(refreshed));
    }
    Json(json!({ "tools": tools }))
}

#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    pub content: String,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub options: Value,
}

fn default_format() -> String {
    "pdf".to_string()
}

/// POST /document/generate
pub async fn generate_document(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
    Json(body): Json<DocumentRequest>,
) -> Result<Json<Value>, ApiError> {
    let result = state
        .broker
        .generate_document(&body.content, &body.format, body.template.as_deref(), body.options)
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
}

/// POST /email/send
pub async fn send_email(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
    Json(body): Json<EmailRequest>,
) -> Result<Json<Value>, ApiError> {
    let result = state
        .broker
        .send_email(&body.to, &body.subject, &body.body, &body.cc, &body.bcc)
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_num_results")]
    pub num_results: u64,
    #[serde(default = "default_search_type")]
    pub search_type: String,
}

fn default_num_results() -> u64 {
    10
}

fn default_search_type() -> String {
    "general".to_string()
}

/// POST /search/web — concurrent fan-out, merged and ranked.
pub async fn web_search(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
    Json(body): Json<SearchRequest>,
) -> Result<Json<Value>, ApiError> {
    let result = state
        .broker
        .web_search(&body.query, body.num_results, &body.search_type)
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct AiRequest {
    pub prompt: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub context: Vec<Value>,
}

fn default_provider() -> String {
    "claude".to_string()
}

/// POST /ai/process
pub async fn ai_process(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
    Json(body): Json<AiRequest>,
) -> Result<Json<Value>, ApiError> {
    let result = state
        .broker
        .route_ai(&body.provider, &body.prompt, &body.context, body.model.as_deref())
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct VoiceRequest {
    pub audio: String,
    #[serde(default = "default_audio_format")]
    pub format: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_audio_format() -> String {
    "wav".to_string()
}

fn default_sample_rate() -> u32 {
    44100
}

/// POST /voice/process — speech-to-text → AI → text-to-speech chain.
pub async fn voice_process(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
    Json(body): Json<VoiceRequest>,
) -> Result<Json<Value>, ApiError> {
    let result = state
        .broker
        .process_voice(&body.audio, &body.format, body.sample_rate)
        .await?;
    Ok(Json(result))
}
