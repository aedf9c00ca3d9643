use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use valet_core::config::{DEFAULT_DISPATCH_TIMEOUT_SECS, STEP_MAX_RETRIES};
use valet_core::types::CommandCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandComplexity {
    Simple,
    Compound,
    Sequential,
    Conditional,
    Iterative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    WaitingInput,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

/// Where a resolved parameter value came from. Literal beats contextual
/// beats inferred; a required prompted entry with no value means "ask the
/// user".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParameterSource {
    Literal,
    Contextual,
    Inferred,
    Prompted,
    Default,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedParameter {
    pub name: String,
    pub value: Option<Value>,
    pub source: ParameterSource,
    pub confidence: f64,
    pub required: bool,
    pub description: String,
}

impl AdvancedParameter {
    pub fn needs_prompt(&self) -> bool {
        self.required && self.value.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandStep {
    pub step_id: String,
    pub command: String,
    pub category: CommandCategory,
    pub parameters: HashMap<String, AdvancedParameter>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub status: WorkflowStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CommandStep {
    pub fn new(step_id: String, command: &str, category: CommandCategory) -> Self {
        Self {
            step_id,
            command: command.to_string(),
            category,
            parameters: HashMap::new(),
            dependencies: Vec::new(),
            status: WorkflowStatus::Pending,
            result: None,
            error: None,
            retry_count: 0,
            max_retries: STEP_MAX_RETRIES,
            timeout_secs: DEFAULT_DISPATCH_TIMEOUT_SECS,
            started_at: None,
            completed_at: None,
        }
    }

    /// Prompted parameters still waiting on the user, ordered by name so
    /// prompting is deterministic.
    pub fn unmet_prompts(&self) -> Vec<&AdvancedParameter> {
        let mut prompts: Vec<&AdvancedParameter> = self
            .parameters
            .values()
            .filter(|p| p.needs_prompt())
            .collect();
        prompts.sort_by(|a, b| a.name.cmp(&b.name));
        prompts
    }
}

/// Ordered plan derived from a single utterance. Retained until terminal;
/// a user may hold several at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiStepWorkflow {
    pub workflow_id: String,
    pub user_id: String,
    pub session_id: String,
    pub original_command: String,
    pub complexity: CommandComplexity,
    pub steps: Vec<CommandStep>,
    pub current_step: usize,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// completed steps / total steps, in [0, 1].
    pub completion_percentage: f64,
}

impl MultiStepWorkflow {
    pub fn current(&self) -> Option<&CommandStep> {
        self.steps.get(self.current_step)
    }

    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == WorkflowStatus::Completed)
            .count()
    }

    /// Recompute progress and the aggregate status. The workflow is
    /// `completed` only when every step is.
    pub fn update_progress(&mut self) {
        let total = self.steps.len();
        self.completion_percentage = if total > 0 {
            self.completed_steps() as f64 / total as f64
        } else {
            0.0
        };
        if total > 0 && self.completed_steps() == total {
            self.status = WorkflowStatus::Completed;
        }
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workflow_with_steps(n: usize) -> MultiStepWorkflow {
        let now = Utc::now();
        MultiStepWorkflow {
            workflow_id: "w1".into(),
            user_id: "u".into(),
            session_id: "s".into(),
            original_command: "do things".into(),
            complexity: CommandComplexity::Sequential,
            steps: (0..n)
                .map(|i| CommandStep::new(format!("w1-step-{i}"), "chat", CommandCategory::GeneralConversation))
                .collect(),
            current_step: 0,
            status: WorkflowStatus::Pending,
            created_at: now,
            updated_at: now,
            completion_percentage: 0.0,
        }
    }

    #[test]
    fn completion_is_exact_ratio() {
        let mut wf = workflow_with_steps(4);
        wf.steps[0].status = WorkflowStatus::Completed;
        wf.update_progress();
        assert_eq!(wf.completion_percentage, 0.25);
        assert_eq!(wf.status, WorkflowStatus::Pending);
    }

    #[test]
    fn workflow_completes_only_when_every_step_does() {
        let mut wf = workflow_with_steps(2);
        wf.steps[0].status = WorkflowStatus::Completed;
        wf.update_progress();
        assert_ne!(wf.status, WorkflowStatus::Completed);

        wf.steps[1].status = WorkflowStatus::Completed;
        wf.update_progress();
        assert_eq!(wf.status, WorkflowStatus::Completed);
        assert_eq!(wf.completion_percentage, 1.0);
    }

    #[test]
    fn prompted_parameter_needs_user() {
        let p = AdvancedParameter {
            name: "recipient".into(),
            value: None,
            source: ParameterSource::Prompted,
            confidence: 0.0,
            required: true,
            description: "who receives the email".into(),
        };
        assert!(p.needs_prompt());
    }
}
