use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Database(_) => "context_store_unavailable",
            StoreError::Unavailable(_) => "context_store_unavailable",
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
