use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Lifecycle state of a registered tool server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolStatus {
    Initialized,
    Running,
    Stopped,
    Error,
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ToolStatus::Initialized => "initialized",
            ToolStatus::Running => "running",
            ToolStatus::Stopped => "stopped",
            ToolStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Snapshot of one tool's registration and health.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub capabilities: Vec<String>,
    pub status: ToolStatus,
    pub last_ping: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Typed command interface every tool service exposes to the broker.
///
/// Vendor internals (renderers, SMTP, STT/TTS engines, provider SDKs) stay
/// behind implementations of this trait; the broker only sees names,
/// capability sets and JSON command payloads.
#[async_trait]
pub trait ToolServer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Declared command names. Dispatch refuses anything not listed here.
    fn capabilities(&self) -> Vec<String>;

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    /// Cheap liveness check; updates `last_ping` on success.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, command: &str, params: Value) -> Result<Value>;
}

/// Helpers shared by the concrete tools for pulling typed fields out of
/// JSON command payloads.
pub(crate) fn require_str<'a>(params: &'a Value, field: &str) -> Result<&'a str> {
    params
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| crate::error::BrokerError::InvalidParams(format!("missing field '{field}'")))
}

pub(crate) fn opt_str<'a>(params: &'a Value, field: &str) -> Option<&'a str> {
    params.get(field).and_then(|v| v.as_str())
}

pub(crate) fn opt_u64(params: &Value, field: &str) -> Option<u64> {
    params.get(field).and_then(|v| v.as_u64())
}
