use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Context not found for {user_id}/{session_id}")]
    NotFound { user_id: String, session_id: String },

    #[error("Context store unavailable: {0}")]
    Unavailable(String),
}

impl ContextError {
    pub fn kind(&self) -> &'static str {
        match self {
            ContextError::NotFound { .. } => "not_found",
            ContextError::Unavailable(_) => "context_store_unavailable",
        }
    }
}

pub type Result<T> = std::result::Result<T, ContextError>;
