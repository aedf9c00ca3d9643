use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid API key")]
    InvalidKey,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    Expired,
}

impl AuthError {
    /// Stable kind tag — the gateway maps all three to the 401 family but
    /// clients distinguish expiry from malformed credentials.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::InvalidKey => "invalid_credentials",
            AuthError::InvalidToken => "invalid_credentials",
            AuthError::Expired => "expired_credentials",
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
