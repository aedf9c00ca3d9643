use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use valet_core::config::AiConfig;
use valet_store::KvStore;

use crate::error::{BrokerError, Result};
use crate::tool::{opt_str, require_str, ToolServer};

const USAGE_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

/// Model metadata used for optimal-provider selection.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub provider: &'static str,
    pub model: &'static str,
    pub cost_per_token: f64,
    pub capabilities: &'static [&'static str],
    pub context_window: u64,
    pub max_output: u64,
}

/// Static provider/model catalog. Costs are per token in USD.
pub const MODEL_CATALOG: &[ModelInfo] = &[
    ModelInfo {
        provider: "claude",
        model: "claude-3-5-sonnet",
        cost_per_token: 0.000015,
        capabilities: &["chat", "analysis", "coding", "creative"],
        context_window: 200_000,
        max_output: 4096,
    },
    ModelInfo {
        provider: "claude",
        model: "claude-3-haiku",
        cost_per_token: 0.00000025,
        capabilities: &["chat", "summarization"],
        context_window: 200_000,
        max_output: 4096,
    },
    ModelInfo {
        provider: "gpt",
        model: "gpt-4",
        cost_per_token: 0.00003,
        capabilities: &["chat", "analysis", "coding"],
        context_window: 128_000,
        max_output: 4096,
    },
    ModelInfo {
        provider: "gpt",
        model: "gpt-4o",
        cost_per_token: 0.000015,
        capabilities: &["chat", "coding", "vision"],
        context_window: 128_000,
        max_output: 16_384,
    },
    ModelInfo {
        provider: "gemini",
        model: "gemini-1.5-pro",
        cost_per_token: 0.000001,
        capabilities: &["chat", "analysis", "long-context"],
        context_window: 1_000_000,
        max_output: 8192,
    },
    ModelInfo {
        provider: "gemini",
        model: "gemini-pro",
        cost_per_token: 0.000002,
        capabilities: &["chat"],
        context_window: 30_720,
        max_output: 2048,
    },
];

#[derive(Debug, Clone, Serialize)]
pub struct ModelSelection {
    pub provider: String,
    pub model: String,
    pub cost_per_token: f64,
    pub alternatives: Vec<ModelInfo>,
}

/// Cheapest provider-model satisfying every constraint, with the
/// runners-up listed as alternatives.
pub fn select_optimal(
    task_capability: &str,
    budget_per_token: Option<f64>,
    context_length: Option<u64>,
) -> Option<ModelSelection> {
    let mut suitable: Vec<&ModelInfo> = MODEL_CATALOG
        .iter()
        .filter(|m| m.capabilities.contains(&task_capability))
        .filter(|m| budget_per_token.map(|b| m.cost_per_token <= b).unwrap_or(true))
        .filter(|m| context_length.map(|c| m.context_window >= c).unwrap_or(true))
        .collect();

    suitable.sort_by(|a, b| {
        a.cost_per_token
            .partial_cmp(&b.cost_per_token)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let best = suitable.first()?;
    Some(ModelSelection {
        provider: best.provider.to_string(),
        model: best.model.to_string(),
        cost_per_token: best.cost_per_token,
        alternatives: suitable.iter().skip(1).map(|m| (*m).clone()).collect(),
    })
}

/// Capability interface over an actual chat completion backend. Vendor
/// SDK details live behind this seam.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &str;
    async fn chat(&self, model: &str, prompt: &str, context: &[Value]) -> Result<ChatReply>;
}

#[derive(Debug, Clone)]
pub struct ChatReply {
    pub content: String,
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// OpenAI-compatible chat completions client.
pub struct OpenAiCompatBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatBackend {
    pub fn new(config: &AiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[async_trait]
impl ChatBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn chat(&self, model: &str, prompt: &str, context: &[Value]) -> Result<ChatReply> {
        let mut messages: Vec<Value> = context.to_vec();
        messages.push(json!({ "role": "user", "content": prompt }));

        let mut request = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("content-type", "application/json")
            .json(&json!({ "model": model, "messages": messages }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await.map_err(|e| {
            // connection errors surface as tool errors so dispatch can
            // report the tool degraded rather than an internal fault
            if e.is_connect() || e.is_timeout() {
                BrokerError::ToolError(format!("chat backend unavailable: {e}"))
            } else {
                BrokerError::Http(e)
            }
        })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "chat backend error");
            return Err(BrokerError::ToolError(format!(
                "chat backend returned {status}"
            )));
        }

        let body: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| BrokerError::ToolError(format!("chat backend parse: {e}")))?;

        let content = body
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();
        let usage = body.usage.unwrap_or_default();

        Ok(ChatReply {
            content,
            model: if body.model.is_empty() {
                model.to_string()
            } else {
                body.model
            },
            tokens_in: usage.prompt_tokens,
            tokens_out: usage.completion_tokens,
        })
    }
}

/// AI provider tool: routes chat to the backend, answers model-selection
/// queries, and appends per-call usage to the daily counters.
pub struct AiProviderTool {
    backend: Arc<dyn ChatBackend>,
    kv: Option<Arc<dyn KvStore>>,
    default_model: String,
}

impl AiProviderTool {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        kv: Option<Arc<dyn KvStore>>,
        default_model: String,
    ) -> Self {
        Self {
            backend,
            kv,
            default_model,
        }
    }

    fn track_usage(&self, provider: &str, model: &str, tokens: u64) {
        let Some(kv) = &self.kv else { return };
        let day = Utc::now().format("%Y-%m-%d");
        let key = format!("usage:{provider}:{model}:{day}");
        if let Err(e) = kv.incr_by(&key, tokens as i64, Some(USAGE_TTL)) {
            warn!(err = %e, "usage tracking failed");
        }
    }

    async fn chat(&self, params: &Value) -> Result<Value> {
        let prompt = require_str(params, "prompt")?;
        let provider = opt_str(params, "provider").unwrap_or("claude");
        let model = opt_str(params, "model").unwrap_or(&self.default_model);
        let context: Vec<Value> = params
            .get("context")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let reply = self.backend.chat(model, prompt, &context).await?;
        self.track_usage(provider, &reply.model, reply.tokens_in + reply.tokens_out);
        debug!(provider, model = %reply.model, "ai request served");

        Ok(json!({
            "content": reply.content,
            "provider": provider,
            "model": reply.model,
            "usage": {
                "input_tokens": reply.tokens_in,
                "output_tokens": reply.tokens_out,
                "total_tokens": reply.tokens_in + reply.tokens_out,
            },
        }))
    }

    fn model_selection(&self, params: &Value) -> Result<Value> {
        let task = require_str(params, "task")?;
        let budget = params.get("budget").and_then(|v| v.as_f64());
        let context_length = params.get("context_length").and_then(|v| v.as_u64());

        match select_optimal(task, budget, context_length) {
            Some(selection) => Ok(json!(selection)),
            None => Err(BrokerError::InvalidParams(format!(
                "no model satisfies task '{task}' under the given constraints"
            ))),
        }
    }
}

#[async_trait]
impl ToolServer for AiProviderTool {
    fn name(&self) -> &'static str {
        "ai"
    }

    fn capabilities(&self) -> Vec<String> {
        vec!["chat".to_string(), "model_selection".to_string()]
    }

    async fn execute(&self, command: &str, params: Value) -> Result<Value> {
        match command {
            "chat" => self.chat(&params).await,
            "model_selection" => self.model_selection(&params),
            other => Err(BrokerError::UnsupportedCommand {
                name: "ai".to_string(),
                command: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use valet_store::MemoryKv;

    pub(crate) struct EchoBackend;

    #[async_trait]
    impl ChatBackend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }
        async fn chat(&self, model: &str, prompt: &str, _context: &[Value]) -> Result<ChatReply> {
            Ok(ChatReply {
                content: format!("echo: {prompt}"),
                model: model.to_string(),
                tokens_in: 10,
                tokens_out: 5,
            })
        }
    }

    #[test]
    fn cheapest_satisfying_model_wins() {
        let selection = select_optimal("chat", None, None).unwrap();
        assert_eq!(selection.model, "claude-3-haiku");
        assert!(!selection.alternatives.is_empty());
    }

    #[test]
    fn context_length_constraint_filters_models() {
        let selection = select_optimal("chat", None, Some(500_000)).unwrap();
        assert_eq!(selection.model, "gemini-1.5-pro");
    }

    #[test]
    fn budget_constraint_filters_models() {
        let selection = select_optimal("coding", Some(0.000015), None).unwrap();
        // gpt-4 is over budget; sonnet and gpt-4o remain, sonnet ties on
        // cost and both are acceptable — the cheapest wins
        assert!(selection.cost_per_token <= 0.000015);
    }

    #[test]
    fn impossible_constraints_yield_none() {
        assert!(select_optimal("chat", Some(1e-12), None).is_none());
        assert!(select_optimal("time-travel", None, None).is_none());
    }

    #[tokio::test]
    async fn chat_tracks_daily_usage() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let tool = AiProviderTool::new(
            Arc::new(EchoBackend),
            Some(kv.clone()),
            "test-model".to_string(),
        );

        let out = tool
            .execute("chat", json!({ "prompt": "hello", "provider": "claude" }))
            .await
            .unwrap();
        assert_eq!(out["content"], "echo: hello");
        assert_eq!(out["usage"]["total_tokens"], 15);

        let day = Utc::now().format("%Y-%m-%d");
        let counter = kv
            .get(&format!("usage:claude:test-model:{day}"))
            .unwrap()
            .unwrap();
        assert_eq!(counter, "15");
    }

    #[tokio::test]
    async fn model_selection_command_returns_alternatives() {
        let tool = AiProviderTool::new(Arc::new(EchoBackend), None, "m".to_string());
        let out = tool
            .execute("model_selection", json!({ "task": "analysis" }))
            .await
            .unwrap();
        assert_eq!(out["model"], "gemini-1.5-pro");
        assert!(out["alternatives"].as_array().unwrap().len() >= 1);
    }
}
