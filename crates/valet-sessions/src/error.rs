use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {client_id}")]
    NotFound { client_id: String },

    #[error("Session {client_id} is closed")]
    Closed { client_id: String },

    #[error("Group not found: {group}")]
    GroupNotFound { group: String },
}

impl SessionError {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::NotFound { .. } => "not_found",
            SessionError::Closed { .. } => "session_lost",
            SessionError::GroupNotFound { .. } => "not_found",
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
