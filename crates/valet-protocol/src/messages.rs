use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client → Server duplex message.
/// Wire: `{ "type": "ai_request", "prompt": "...", ... }`
///
/// Unknown `type` values fail deserialization; the gateway answers with a
/// typed error and keeps the session open. Extra fields inside a known
/// message kind are tolerated.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Audio {
        /// Base64-encoded audio payload.
        audio: String,
        #[serde(default = "default_audio_format")]
        format: String,
        #[serde(default = "default_sample_rate")]
        sample_rate: u32,
    },
    AiRequest {
        prompt: String,
        #[serde(default)]
        provider: Option<String>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        context: Vec<Value>,
    },
    McpCommand {
        tool: String,
        command: String,
        #[serde(default)]
        params: Value,
    },
}

fn default_audio_format() -> String {
    "wav".to_string()
}

fn default_sample_rate() -> u32 {
    44100
}

/// Server → Client duplex message. Every variant carries a server-filled
/// millisecond timestamp.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Welcome {
        client_id: String,
        message: String,
        timestamp: i64,
    },
    AudioResponse {
        transcription: String,
        ai_response: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        audio_response: Option<String>,
        processing_ms: f64,
        timestamp: i64,
    },
    AiResponse {
        content: String,
        provider: String,
        model: String,
        timestamp: i64,
    },
    McpResponse {
        tool: String,
        command: String,
        result: Value,
        timestamp: i64,
    },
    Ping {
        timestamp: i64,
    },
    ServerShutdown {
        message: String,
        timestamp: i64,
    },
    Error {
        error: ErrorShape,
        timestamp: i64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorShape {
    pub kind: String,
    pub message: String,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl OutboundMessage {
    pub fn welcome(client_id: impl Into<String>) -> Self {
        OutboundMessage::Welcome {
            client_id: client_id.into(),
            message: "connected to valet gateway".to_string(),
            timestamp: now_ms(),
        }
    }

    pub fn ping() -> Self {
        OutboundMessage::Ping {
            timestamp: now_ms(),
        }
    }

    pub fn server_shutdown() -> Self {
        OutboundMessage::ServerShutdown {
            message: "server shutting down".to_string(),
            timestamp: now_ms(),
        }
    }

    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        OutboundMessage::Error {
            error: ErrorShape {
                kind: kind.into(),
                message: message.into(),
            },
            timestamp: now_ms(),
        }
    }

    pub fn audio_response(
        transcription: impl Into<String>,
        ai_response: impl Into<String>,
        audio_response: Option<String>,
        processing_ms: f64,
    ) -> Self {
        OutboundMessage::AudioResponse {
            transcription: transcription.into(),
            ai_response: ai_response.into(),
            audio_response,
            processing_ms,
            timestamp: now_ms(),
        }
    }

    pub fn ai_response(
        content: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        OutboundMessage::AiResponse {
            content: content.into(),
            provider: provider.into(),
            model: model.into(),
            timestamp: now_ms(),
        }
    }

    pub fn mcp_response(tool: impl Into<String>, command: impl Into<String>, result: Value) -> Self {
        OutboundMessage::McpResponse {
            tool: tool.into(),
            command: command.into(),
            result,
            timestamp: now_ms(),
        }
    }

    /// Serialize for the wire. Outbound frames are infallible by
    /// construction; a serializer error degrades to an empty object.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
