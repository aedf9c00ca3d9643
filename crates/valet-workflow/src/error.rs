use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Workflow not found: {id}")]
    NotFound { id: String },

    #[error("Workflow {id} already has a step running")]
    StepInProgress { id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl WorkflowError {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::NotFound { .. } => "not_found",
            WorkflowError::StepInProgress { .. } => "workflow_busy",
            WorkflowError::InvalidInput(_) => "invalid_input",
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
