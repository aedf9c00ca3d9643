use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use valet_store::KvStore;

use crate::error::{BrokerError, Result};
use crate::tool::{require_str, ToolServer};

const EMAIL_RECORD_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

static ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("static pattern")
});

/// Capability interface over the actual mail transport.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Default transport: accepts the message without vendor delivery.
/// Deployments wire SMTP or an API relay behind the same trait.
pub struct NullTransport;

#[async_trait]
impl MailTransport for NullTransport {
    async fn deliver(&self, _to: &str, _subject: &str, _body: &str) -> Result<()> {
        Ok(())
    }
}

pub struct EmailTool {
    transport: Box<dyn MailTransport>,
    kv: Option<Arc<dyn KvStore>>,
}

impl EmailTool {
    pub fn new(transport: Box<dyn MailTransport>, kv: Option<Arc<dyn KvStore>>) -> Self {
        Self { transport, kv }
    }

    async fn send(&self, params: &Value) -> Result<Value> {
        let to = require_str(params, "to")?;
        let subject = require_str(params, "subject")?;
        let body = require_str(params, "body")?;

        if !ADDRESS_RE.is_match(to) {
            return Err(BrokerError::InvalidParams(format!(
                "invalid recipient address '{to}'"
            )));
        }

        self.transport.deliver(to, subject, body).await?;

        let message_id = Uuid::new_v4().to_string();
        let sent_at = Utc::now().to_rfc3339();
        if let Some(kv) = &self.kv {
            let record = json!({ "to": to, "subject": subject, "sent_at": sent_at });
            if let Err(e) = kv.set(
                &format!("email_record:{message_id}"),
                &record.to_string(),
                Some(EMAIL_RECORD_TTL),
            ) {
                warn!(err = %e, "email record write failed");
            }
        }

        debug!(message_id = %message_id, "email sent");
        Ok(json!({
            "message_id": message_id,
            "to": to,
            "subject": subject,
            "sent_at": sent_at,
            "status": "sent",
        }))
    }

    fn compose(&self, params: &Value) -> Result<Value> {
        let subject = require_str(params, "subject")?;
        let points: Vec<&str> = params
            .get("points")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        let mut body = String::new();
        for point in &points {
            body.push_str("- ");
            body.push_str(point);
            body.push('\n');
        }
        Ok(json!({ "subject": subject, "body": body }))
    }
}

#[async_trait]
impl ToolServer for EmailTool {
    fn name(&self) -> &'static str {
        "email"
    }

    fn capabilities(&self) -> Vec<String> {
        vec!["send_email".to_string(), "compose_email".to_string()]
    }

    async fn execute(&self, command: &str, params: Value) -> Result<Value> {
        match command {
            "send_email" => self.send(&params).await,
            "compose_email" => self.compose(&params),
            other => Err(BrokerError::UnsupportedCommand {
                name: "email".to_string(),
                command: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use valet_store::MemoryKv;

    #[tokio::test]
    async fn send_records_message_in_kv() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let tool = EmailTool::new(Box::new(NullTransport), Some(kv.clone()));

        let out = tool
            .execute(
                "send_email",
                json!({ "to": "alice@example.com", "subject": "launch", "body": "it's live" }),
            )
            .await
            .unwrap();

        assert_eq!(out["status"], "sent");
        let message_id = out["message_id"].as_str().unwrap();
        let record = kv
            .get(&format!("email_record:{message_id}"))
            .unwrap()
            .unwrap();
        let record: Value = serde_json::from_str(&record).unwrap();
        assert_eq!(record["to"], "alice@example.com");
        assert_eq!(record["subject"], "launch");
    }

    #[tokio::test]
    async fn malformed_recipient_is_rejected() {
        let tool = EmailTool::new(Box::new(NullTransport), None);
        let err = tool
            .execute(
                "send_email",
                json!({ "to": "not-an-address", "subject": "s", "body": "b" }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn compose_builds_bulleted_body() {
        let tool = EmailTool::new(Box::new(NullTransport), None);
        let out = tool
            .execute(
                "compose_email",
                json!({ "subject": "standup", "points": ["shipped search", "fixed cache"] }),
            )
            .await
            .unwrap();
        assert_eq!(out["body"], "- shipped search\n- fixed cache\n");
    }
}
