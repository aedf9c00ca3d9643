use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValetError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ValetError {
    /// Stable kind tag carried in the wire error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            ValetError::Config(_) => "config_error",
            ValetError::InvalidInput(_) => "invalid_input",
            ValetError::Serialization(_) => "invalid_input",
            ValetError::Io(_) => "internal_error",
            ValetError::Internal(_) => "internal_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, ValetError>;
