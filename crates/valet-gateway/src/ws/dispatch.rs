use std::sync::Arc;

use tracing::warn;

use valet_protocol::{InboundMessage, OutboundMessage};

use crate::app::AppState;

/// Handle one inbound duplex frame and produce the typed response.
///
/// Malformed or unknown-kind frames yield a typed error; the session
/// stays open either way.
pub async fn handle_text(state: &Arc<AppState>, client_id: &str, text: &str) -> OutboundMessage {
    let message: InboundMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!(client_id, err = %e, "malformed duplex frame");
            return OutboundMessage::error("invalid_input", format!("malformed message: {e}"));
        }
    };

    match message {
        InboundMessage::Audio {
            audio,
            format,
            sample_rate,
        } => match state.broker.process_voice(&audio, &format, sample_rate).await {
            Ok(result) => OutboundMessage::audio_response(
                result
                    .get("transcription")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default(),
                result
                    .get("ai_response")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default(),
                result
                    .get("audio_response")
                    .and_then(|v| v.as_str())
                    .map(String::from),
                result
                    .get("processing_ms")
                    .and_then(|v| v.as_f64())
                    .unwrap_or_default(),
            ),
            Err(e) => OutboundMessage::error(e.kind(), e.to_string()),
        },

        InboundMessage::AiRequest {
            prompt,
            provider,
            model,
            context,
        } => {
            let provider = provider.unwrap_or_else(|| "claude".to_string());
            match state
                .broker
                .route_ai(&provider, &prompt, &context, model.as_deref())
                .await
            {
                Ok(result) => OutboundMessage::ai_response(
                    result
                        .get("content")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default(),
                    provider,
                    result
                        .get("model")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default(),
                ),
                Err(e) => OutboundMessage::error(e.kind(), e.to_string()),
            }
        }

        InboundMessage::McpCommand {
            tool,
            command,
            params,
        } => match state.broker.dispatch(&tool, &command, params, None).await {
            Ok(result) => OutboundMessage::mcp_response(tool, command, result),
            Err(e) => OutboundMessage::error(e.kind(), e.to_string()),
        },
    }
}
