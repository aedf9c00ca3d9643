use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Append-only event record. Immutable once published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub kind: EventKind,
    pub user_id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
}

impl AnalyticsEvent {
    pub fn new(kind: EventKind, user_id: &str, session_id: &str, data: Value) -> Self {
        Self {
            kind,
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Command,
    WorkflowStart,
    WorkflowEnd,
    ParameterResolution,
    ContextSwitch,
    Error,
    Feedback,
    SessionStart,
    SessionEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BehaviorPattern {
    PowerUser,
    Routine,
    Explorer,
    HelpSeeker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngagementLevel {
    High,
    Medium,
    Low,
}

/// Aggregated per-user behaviour profile, updated by the batch drainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub total_commands: u64,
    pub successful_commands: u64,
    pub error_count: u64,
    /// Command count per category name.
    pub command_frequency: HashMap<String, u64>,
    pub total_command_chars: u64,
    pub behavior_patterns: Vec<BehaviorPattern>,
    pub engagement_level: EngagementLevel,
    pub first_seen: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            total_commands: 0,
            successful_commands: 0,
            error_count: 0,
            command_frequency: HashMap::new(),
            total_command_chars: 0,
            behavior_patterns: Vec::new(),
            engagement_level: EngagementLevel::Medium,
            first_seen: now,
            last_active: now,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_commands == 0 {
            0.0
        } else {
            self.successful_commands as f64 / self.total_commands as f64
        }
    }

    pub fn average_command_length(&self) -> f64 {
        if self.total_commands == 0 {
            0.0
        } else {
            self.total_command_chars as f64 / self.total_commands as f64
        }
    }
}
