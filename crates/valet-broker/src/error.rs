use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Tool '{name}' is not running (status: {status})")]
    ToolStopped { name: String, status: String },

    #[error("Tool '{name}' does not support command '{command}'")]
    UnsupportedCommand { name: String, command: String },

    #[error("Invalid tool parameters: {0}")]
    InvalidParams(String),

    #[error("Tool call timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BrokerError {
    pub fn kind(&self) -> &'static str {
        match self {
            BrokerError::UnknownTool { .. } => "tool_unknown",
            BrokerError::ToolStopped { .. } => "tool_stopped",
            BrokerError::UnsupportedCommand { .. } => "unsupported_command",
            BrokerError::InvalidParams(_) => "invalid_input",
            BrokerError::Timeout { .. } => "tool_timeout",
            BrokerError::ToolError(_) => "tool_error",
            BrokerError::Http(_) => "tool_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;
