use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The similarity backend failed to load and no fallback is possible.
    /// Distinct from an `unknown` classification, which is a valid result.
    #[error("Classifier unavailable: {0}")]
    Unavailable(String),
}

impl ClassifierError {
    pub fn kind(&self) -> &'static str {
        match self {
            ClassifierError::Unavailable(_) => "classifier_unavailable",
        }
    }
}

pub type Result<T> = std::result::Result<T, ClassifierError>;
