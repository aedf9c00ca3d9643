use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{BrokerError, Result};
use crate::tool::{opt_u64, require_str, ToolServer};

/// Capability interface over the speech-to-text engine.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8], format: &str, sample_rate: u32) -> Result<String>;
}

/// Capability interface over the text-to-speech engine.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Returns encoded audio bytes in the requested format.
    async fn synthesize(&self, text: &str, format: &str) -> Result<Vec<u8>>;
}

/// Default engines used when no vendor backend is configured: the
/// transcriber reports the tool degraded rather than inventing text, and
/// the synthesizer returns no audio.
pub struct UnconfiguredTranscriber;

#[async_trait]
impl Transcriber for UnconfiguredTranscriber {
    async fn transcribe(&self, _audio: &[u8], _format: &str, _sample_rate: u32) -> Result<String> {
        Err(BrokerError::ToolError(
            "no speech-to-text backend configured".into(),
        ))
    }
}

pub struct UnconfiguredSynthesizer;

#[async_trait]
impl Synthesizer for UnconfiguredSynthesizer {
    async fn synthesize(&self, _text: &str, _format: &str) -> Result<Vec<u8>> {
        Err(BrokerError::ToolError(
            "no text-to-speech backend configured".into(),
        ))
    }
}

pub struct VoiceTool {
    transcriber: Box<dyn Transcriber>,
    synthesizer: Box<dyn Synthesizer>,
}

impl VoiceTool {
    pub fn new(transcriber: Box<dyn Transcriber>, synthesizer: Box<dyn Synthesizer>) -> Self {
        Self {
            transcriber,
            synthesizer,
        }
    }

    async fn speech_to_text(&self, params: &Value) -> Result<Value> {
        let audio_b64 = require_str(params, "audio")?;
        let format = params
            .get("format")
            .and_then(|v| v.as_str())
            .unwrap_or("wav");
        let sample_rate = opt_u64(params, "sample_rate").unwrap_or(44100) as u32;

        let audio = BASE64
            .decode(audio_b64)
            .map_err(|e| BrokerError::InvalidParams(format!("audio is not valid base64: {e}")))?;

        let text = self.transcriber.transcribe(&audio, format, sample_rate).await?;
        debug!(chars = text.len(), "audio transcribed");
        Ok(json!({ "text": text, "format": format, "sample_rate": sample_rate }))
    }

    async fn text_to_speech(&self, params: &Value) -> Result<Value> {
        let text = require_str(params, "text")?;
        let format = params
            .get("format")
            .and_then(|v| v.as_str())
            .unwrap_or("mp3");

        let audio = self.synthesizer.synthesize(text, format).await?;
        Ok(json!({ "audio_data": BASE64.encode(audio), "format": format }))
    }
}

#[async_trait]
impl ToolServer for VoiceTool {
    fn name(&self) -> &'static str {
        "voice"
    }

    fn capabilities(&self) -> Vec<String> {
        vec![
            "speech_to_text".to_string(),
            "text_to_speech".to_string(),
            "audio_processing".to_string(),
        ]
    }

    async fn execute(&self, command: &str, params: Value) -> Result<Value> {
        match command {
            "speech_to_text" | "audio_processing" => self.speech_to_text(&params).await,
            "text_to_speech" => self.text_to_speech(&params).await,
            other => Err(BrokerError::UnsupportedCommand {
                name: "voice".to_string(),
                command: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedTranscriber(&'static str);

    #[async_trait]
    impl Transcriber for CannedTranscriber {
        async fn transcribe(&self, _audio: &[u8], _format: &str, _rate: u32) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct CannedSynthesizer;

    #[async_trait]
    impl Synthesizer for CannedSynthesizer {
        async fn synthesize(&self, text: &str, _format: &str) -> Result<Vec<u8>> {
            Ok(text.as_bytes().to_vec())
        }
    }

    #[tokio::test]
    async fn speech_to_text_decodes_and_transcribes() {
        let tool = VoiceTool::new(
            Box::new(CannedTranscriber("turn on the lights")),
            Box::new(CannedSynthesizer),
        );
        let audio = BASE64.encode(b"fake-pcm");
        let out = tool
            .execute("speech_to_text", json!({ "audio": audio }))
            .await
            .unwrap();
        assert_eq!(out["text"], "turn on the lights");
    }

    #[tokio::test]
    async fn invalid_base64_is_invalid_input() {
        let tool = VoiceTool::new(
            Box::new(CannedTranscriber("x")),
            Box::new(CannedSynthesizer),
        );
        let err = tool
            .execute("speech_to_text", json!({ "audio": "!!not-base64!!" }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn text_to_speech_round_trips_bytes() {
        let tool = VoiceTool::new(
            Box::new(CannedTranscriber("x")),
            Box::new(CannedSynthesizer),
        );
        let out = tool
            .execute("text_to_speech", json!({ "text": "hello" }))
            .await
            .unwrap();
        let audio = BASE64.decode(out["audio_data"].as_str().unwrap()).unwrap();
        assert_eq!(audio, b"hello");
    }

    #[tokio::test]
    async fn unconfigured_backends_surface_tool_error() {
        let tool = VoiceTool::new(
            Box::new(UnconfiguredTranscriber),
            Box::new(UnconfiguredSynthesizer),
        );
        let audio = BASE64.encode(b"x");
        let err = tool
            .execute("speech_to_text", json!({ "audio": audio }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "tool_error");
    }
}
