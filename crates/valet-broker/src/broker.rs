use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use valet_core::config::{
    DEFAULT_DISPATCH_TIMEOUT_SECS, MAX_DISPATCH_TIMEOUT_SECS, MIN_DISPATCH_TIMEOUT_SECS,
};

use crate::error::{BrokerError, Result};
use crate::tool::{ToolDescriptor, ToolServer, ToolStatus};

struct ToolEntry {
    server: Arc<dyn ToolServer>,
    state: RwLock<ToolState>,
}

struct ToolState {
    status: ToolStatus,
    last_ping: Option<chrono::DateTime<Utc>>,
    error_message: Option<String>,
}

/// Owns typed handles to the fixed tool bank and routes commands to them.
///
/// Tool handles are created at startup and immutable at runtime; only the
/// per-tool status cell mutates afterwards. One tool's start failure marks
/// it `error` without aborting the broker.
pub struct ToolBroker {
    tools: HashMap<String, ToolEntry>,
    /// Registration order; shutdown walks it in reverse.
    order: Vec<String>,
    default_timeout: Duration,
}

impl ToolBroker {
    pub fn new(servers: Vec<Arc<dyn ToolServer>>) -> Self {
        let mut tools = HashMap::new();
        let mut order = Vec::new();
        for server in servers {
            let name = server.name().to_string();
            order.push(name.clone());
            tools.insert(
                name,
                ToolEntry {
                    server,
                    state: RwLock::new(ToolState {
                        status: ToolStatus::Initialized,
                        last_ping: None,
                        error_message: None,
                    }),
                },
            );
        }
        Self {
            tools,
            order,
            default_timeout: Duration::from_secs(DEFAULT_DISPATCH_TIMEOUT_SECS),
        }
    }

    /// Override the default dispatch timeout (clamped to the 1–300 s
    /// bounds like any caller-supplied timeout).
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = clamp_timeout(timeout);
        self
    }

    pub async fn start_all(&self) {
        for name in &self.order {
            let entry = &self.tools[name];
            match entry.server.start().await {
                Ok(()) => {
                    self.set_state(name, ToolStatus::Running, None);
                    info!(tool = %name, "tool started");
                }
                Err(e) => {
                    // isolation: a failed tool stays registered as `error`
                    self.set_state(name, ToolStatus::Error, Some(e.to_string()));
                    error!(tool = %name, err = %e, "tool start failed");
                }
            }
        }
    }

    /// Shut tools down in reverse registration order.
    pub async fn shutdown(&self) {
        for name in self.order.iter().rev() {
            let entry = &self.tools[name];
            match entry.server.shutdown().await {
                Ok(()) => {
                    self.set_state(name, ToolStatus::Stopped, None);
                    info!(tool = %name, "tool stopped");
                }
                Err(e) => warn!(tool = %name, err = %e, "tool shutdown failed"),
            }
        }
    }

    pub async fn ping(&self, name: &str) -> Result<ToolDescriptor> {
        let entry = self.entry(name)?;
        match entry.server.ping().await {
            Ok(()) => {
                let mut state = entry.state.write().unwrap_or_else(|e| e.into_inner());
                state.last_ping = Some(Utc::now());
            }
            Err(e) => {
                self.set_state(name, ToolStatus::Error, Some(e.to_string()));
                warn!(tool = %name, err = %e, "tool ping failed");
            }
        }
        self.status(name)
    }

    pub fn status(&self, name: &str) -> Result<ToolDescriptor> {
        let entry = self.entry(name)?;
        let state = entry.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(ToolDescriptor {
            name: name.to_string(),
            capabilities: entry.server.capabilities(),
            status: state.status,
            last_ping: state.last_ping,
            error_message: state.error_message.clone(),
        })
    }

    pub fn status_all(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.status(name).ok())
            .collect()
    }

    /// Route a typed command. Refuses synchronously unless the tool is
    /// running and declares the command; the call itself runs under the
    /// (clamped) timeout and maps expiry to a `tool_timeout` failure.
    pub async fn dispatch(
        &self,
        name: &str,
        command: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let entry = self.entry(name)?;

        {
            let state = entry.state.read().unwrap_or_else(|e| e.into_inner());
            if state.status != ToolStatus::Running {
                return Err(BrokerError::ToolStopped {
                    name: name.to_string(),
                    status: state.status.to_string(),
                });
            }
        }

        if !entry.server.capabilities().iter().any(|c| c.as_str() == command) {
            return Err(BrokerError::UnsupportedCommand {
                name: name.to_string(),
                command: command.to_string(),
            });
        }

        let timeout = clamp_timeout(timeout.unwrap_or(self.default_timeout));
        match tokio::time::timeout(timeout, entry.server.execute(command, params)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(tool = %name, command, secs = timeout.as_secs(), "tool dispatch timed out");
                Err(BrokerError::Timeout {
                    secs: timeout.as_secs(),
                })
            }
        }
    }

    // Specialized compositions over the tool bank.

    /// Route an AI chat request through the provider tool.
    pub async fn route_ai(
        &self,
        provider: &str,
        prompt: &str,
        context: &[Value],
        model: Option<&str>,
    ) -> Result<Value> {
        let started = Instant::now();
        let mut result = self
            .dispatch(
                "ai",
                "chat",
                json!({
                    "provider": provider,
                    "prompt": prompt,
                    "context": context,
                    "model": model,
                }),
                None,
            )
            .await?;
        if let Some(obj) = result.as_object_mut() {
            obj.insert(
                "processing_ms".to_string(),
                json!(started.elapsed().as_secs_f64() * 1000.0),
            );
        }
        Ok(result)
    }

    /// Full voice round trip: speech-to-text, AI response, text-to-speech.
    /// An empty transcription short-circuits with empty responses.
    pub async fn process_voice(
        &self,
        audio: &str,
        format: &str,
        sample_rate: u32,
    ) -> Result<Value> {
        let started = Instant::now();

        let stt = self
            .dispatch(
                "voice",
                "speech_to_text",
                json!({ "audio": audio, "format": format, "sample_rate": sample_rate }),
                None,
            )
            .await?;
        let transcription = stt
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        if transcription.is_empty() {
            return Ok(json!({
                "transcription": "",
                "ai_response": "",
                "audio_response": null,
                "processing_ms": started.elapsed().as_secs_f64() * 1000.0,
            }));
        }

        let ai = self.route_ai("claude", &transcription, &[], None).await?;
        let ai_response = ai
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let audio_response = if ai_response.is_empty() {
            None
        } else {
            let tts = self
                .dispatch(
                    "voice",
                    "text_to_speech",
                    json!({ "text": ai_response, "format": "mp3" }),
                    None,
                )
                .await?;
            tts.get("audio_data")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        };

        Ok(json!({
            "transcription": transcription,
            "ai_response": ai_response,
            "audio_response": audio_response,
            "processing_ms": started.elapsed().as_secs_f64() * 1000.0,
        }))
    }

    /// Fan-out web search across the enabled providers.
    pub async fn web_search(
        &self,
        query: &str,
        num_results: u64,
        search_type: &str,
    ) -> Result<Value> {
        self.dispatch(
            "search",
            "web_search",
            json!({
                "query": query,
                "num_results": num_results,
                "search_type": search_type,
            }),
            None,
        )
        .await
    }

    pub async fn generate_document(
        &self,
        content: &str,
        format: &str,
        template: Option<&str>,
        options: Value,
    ) -> Result<Value> {
        let command = match format {
            "pdf" => "generate_pdf",
            "docx" | "doc" => "generate_docx",
            "markdown" | "md" | "txt" => "generate_markdown",
            other => {
                return Err(BrokerError::InvalidParams(format!(
                    "unsupported document format '{other}'"
                )))
            }
        };
        self.dispatch(
            "document",
            command,
            json!({ "content": content, "template": template, "options": options }),
            None,
        )
        .await
    }

    pub async fn send_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        cc: &[String],
        bcc: &[String],
    ) -> Result<Value> {
        self.dispatch(
            "email",
            "send_email",
            json!({ "to": to, "subject": subject, "body": body, "cc": cc, "bcc": bcc }),
            None,
        )
        .await
    }

    fn entry(&self, name: &str) -> Result<&ToolEntry> {
        self.tools.get(name).ok_or_else(|| BrokerError::UnknownTool {
            name: name.to_string(),
        })
    }

    fn set_state(&self, name: &str, status: ToolStatus, error_message: Option<String>) {
        if let Some(entry) = self.tools.get(name) {
            let mut state = entry.state.write().unwrap_or_else(|e| e.into_inner());
            state.status = status;
            state.error_message = error_message;
            if status == ToolStatus::Running {
                state.last_ping = Some(Utc::now());
            }
        }
    }
}

fn clamp_timeout(timeout: Duration) -> Duration {
    Duration::from_secs(
        timeout
            .as_secs()
            .clamp(MIN_DISPATCH_TIMEOUT_SECS, MAX_DISPATCH_TIMEOUT_SECS),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl ToolServer for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn capabilities(&self) -> Vec<String> {
            vec!["echo".to_string()]
        }
        async fn execute(&self, _command: &str, params: Value) -> Result<Value> {
            Ok(params)
        }
    }

    struct FailsToStart;

    #[async_trait]
    impl ToolServer for FailsToStart {
        fn name(&self) -> &'static str {
            "flaky"
        }
        fn capabilities(&self) -> Vec<String> {
            vec!["noop".to_string()]
        }
        async fn start(&self) -> Result<()> {
            Err(BrokerError::ToolError("refused to boot".into()))
        }
        async fn execute(&self, _command: &str, _params: Value) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    struct SlowTool;

    #[async_trait]
    impl ToolServer for SlowTool {
        fn name(&self) -> &'static str {
            "slow"
        }
        fn capabilities(&self) -> Vec<String> {
            vec!["sleep".to_string()]
        }
        async fn execute(&self, _command: &str, _params: Value) -> Result<Value> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Value::Null)
        }
    }

    fn broker() -> ToolBroker {
        ToolBroker::new(vec![
            Arc::new(EchoTool),
            Arc::new(FailsToStart),
            Arc::new(SlowTool),
        ])
    }

    #[tokio::test]
    async fn dispatch_refuses_before_start() {
        let b = broker();
        let err = b.dispatch("echo", "echo", json!({}), None).await.unwrap_err();
        assert_eq!(err.kind(), "tool_stopped");
    }

    #[tokio::test]
    async fn start_failure_is_isolated() {
        let b = broker();
        b.start_all().await;

        assert_eq!(b.status("echo").unwrap().status, ToolStatus::Running);
        let flaky = b.status("flaky").unwrap();
        assert_eq!(flaky.status, ToolStatus::Error);
        assert!(flaky.error_message.unwrap().contains("refused to boot"));

        // a broken tool never receives commands
        let err = b.dispatch("flaky", "noop", json!({}), None).await.unwrap_err();
        assert_eq!(err.kind(), "tool_stopped");
    }

    #[tokio::test]
    async fn unknown_tool_and_command_are_distinct() {
        let b = broker();
        b.start_all().await;

        let unknown = b.dispatch("nope", "echo", json!({}), None).await.unwrap_err();
        assert_eq!(unknown.kind(), "tool_unknown");

        let unsupported = b
            .dispatch("echo", "self_destruct", json!({}), None)
            .await
            .unwrap_err();
        assert_eq!(unsupported.kind(), "unsupported_command");
    }

    #[tokio::test]
    async fn dispatch_round_trips_params() {
        let b = broker();
        b.start_all().await;
        let result = b
            .dispatch("echo", "echo", json!({"x": 42}), None)
            .await
            .unwrap();
        assert_eq!(result["x"], 42);
    }

    #[tokio::test]
    async fn timeout_maps_to_tool_timeout() {
        let b = broker();
        b.start_all().await;
        let err = b
            .dispatch("slow", "sleep", json!({}), Some(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "tool_timeout");
    }

    #[tokio::test]
    async fn shutdown_marks_tools_stopped() {
        let b = broker();
        b.start_all().await;
        b.shutdown().await;
        assert_eq!(b.status("echo").unwrap().status, ToolStatus::Stopped);
    }
}
