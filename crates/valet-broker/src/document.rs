use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::{BrokerError, Result};
use crate::tool::{opt_str, require_str, ToolServer};

/// Capability interface over an actual renderer. The engine receives the
/// content and returns an opaque reference to the rendered artifact;
/// nothing is persisted by the gateway beyond that reference.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, content: &str, format: &str, template: Option<&str>) -> Result<String>;
}

/// Default renderer: stamps a reference without shelling out to a vendor
/// engine. Deployments wire a real renderer behind the same trait.
pub struct ReferenceRenderer;

#[async_trait]
impl DocumentRenderer for ReferenceRenderer {
    async fn render(&self, _content: &str, format: &str, _template: Option<&str>) -> Result<String> {
        Ok(format!("valet://documents/{}.{format}", Uuid::new_v4()))
    }
}

pub struct DocumentTool {
    renderer: Box<dyn DocumentRenderer>,
}

impl DocumentTool {
    pub fn new(renderer: Box<dyn DocumentRenderer>) -> Self {
        Self { renderer }
    }

    async fn generate(&self, format: &str, params: &Value) -> Result<Value> {
        let content = require_str(params, "content")?;
        if content.is_empty() {
            return Err(BrokerError::InvalidParams("content must not be empty".into()));
        }
        let template = opt_str(params, "template");

        let reference = self.renderer.render(content, format, template).await?;
        debug!(format, reference = %reference, "document generated");

        Ok(json!({
            "document_id": reference,
            "format": format,
            "size_chars": content.chars().count(),
            "template": template,
            "generated_at": Utc::now().to_rfc3339(),
        }))
    }
}

#[async_trait]
impl ToolServer for DocumentTool {
    fn name(&self) -> &'static str {
        "document"
    }

    fn capabilities(&self) -> Vec<String> {
        vec![
            "generate_pdf".to_string(),
            "generate_docx".to_string(),
            "generate_markdown".to_string(),
            "extract_text".to_string(),
        ]
    }

    async fn execute(&self, command: &str, params: Value) -> Result<Value> {
        match command {
            "generate_pdf" => self.generate("pdf", &params).await,
            "generate_docx" => self.generate("docx", &params).await,
            "generate_markdown" => self.generate("md", &params).await,
            "extract_text" => {
                let content = require_str(&params, "content")?;
                Ok(json!({ "text": content }))
            }
            other => Err(BrokerError::UnsupportedCommand {
                name: "document".to_string(),
                command: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generate_returns_reference_only() {
        let tool = DocumentTool::new(Box::new(ReferenceRenderer));
        let out = tool
            .execute("generate_pdf", json!({ "content": "quarterly numbers" }))
            .await
            .unwrap();

        let reference = out["document_id"].as_str().unwrap();
        assert!(reference.starts_with("valet://documents/"));
        assert!(reference.ends_with(".pdf"));
        assert_eq!(out["size_chars"], 17);
    }

    #[tokio::test]
    async fn empty_content_is_invalid() {
        let tool = DocumentTool::new(Box::new(ReferenceRenderer));
        let err = tool
            .execute("generate_markdown", json!({ "content": "" }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }
}
