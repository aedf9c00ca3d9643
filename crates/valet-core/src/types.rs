use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::config::MAX_TEXT_LEN;
use crate::error::ValetError;

/// Closed classification target set. Declaration order is the tie-break
/// order for classification scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandCategory {
    DocumentGeneration,
    Email,
    Calendar,
    WebSearch,
    Calculations,
    Reminders,
    SystemControl,
    GeneralConversation,
    Unknown,
}

impl CommandCategory {
    pub const ALL: [CommandCategory; 9] = [
        CommandCategory::DocumentGeneration,
        CommandCategory::Email,
        CommandCategory::Calendar,
        CommandCategory::WebSearch,
        CommandCategory::Calculations,
        CommandCategory::Reminders,
        CommandCategory::SystemControl,
        CommandCategory::GeneralConversation,
        CommandCategory::Unknown,
    ];

    /// Categories eligible for scoring, in declaration order.
    pub fn scorable() -> impl Iterator<Item = CommandCategory> {
        Self::ALL
            .iter()
            .copied()
            .filter(|c| *c != CommandCategory::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandCategory::DocumentGeneration => "document-generation",
            CommandCategory::Email => "email",
            CommandCategory::Calendar => "calendar",
            CommandCategory::WebSearch => "web-search",
            CommandCategory::Calculations => "calculations",
            CommandCategory::Reminders => "reminders",
            CommandCategory::SystemControl => "system-control",
            CommandCategory::GeneralConversation => "general-conversation",
            CommandCategory::Unknown => "unknown",
        }
    }

    /// Per-category intent refinement string used for downstream routing.
    pub fn intent(&self) -> String {
        format!("{}-intent", self.as_str())
    }
}

impl std::fmt::Display for CommandCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CommandCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    VeryLow,
}

/// Immutable classification input. Destroyed after classification returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub user_id: String,
    pub session_id: String,
    #[serde(default)]
    pub use_context: bool,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
}

impl Utterance {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.text.is_empty() {
            return Err(ValetError::InvalidInput("text must not be empty".into()));
        }
        if self.text.chars().count() > MAX_TEXT_LEN {
            return Err(ValetError::InvalidInput(format!(
                "text exceeds {MAX_TEXT_LEN} characters"
            )));
        }
        Ok(())
    }
}

/// Classification output. Immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: CommandCategory,
    pub intent: String,
    pub confidence: f64,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    pub raw_text: String,
    pub normalized_text: String,
    #[serde(default)]
    pub context_used: bool,
    pub preprocessing_ms: f64,
    pub classification_ms: f64,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl ClassificationResult {
    /// Partitions [0,1] exactly at 0.3, 0.5 and 0.8.
    pub fn confidence_level(&self) -> ConfidenceLevel {
        if self.confidence > 0.8 {
            ConfidenceLevel::High
        } else if self.confidence > 0.5 {
            ConfidenceLevel::Medium
        } else if self.confidence > 0.3 {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::VeryLow
        }
    }

    pub fn requires_confirmation(&self) -> bool {
        self.confidence < 0.7 || self.category == CommandCategory::Unknown
    }
}

/// One turn in a conversation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub timestamp: DateTime<Utc>,
    pub user_input: String,
    pub bot_response: String,
    pub category: CommandCategory,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
}

/// Immutable view of a conversation taken at classification time.
/// The classifier and workflow engine receive this value, never a live
/// handle to the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub last_category: Option<CommandCategory>,
    pub current_topic: Option<String>,
    #[serde(default)]
    pub active_parameters: HashMap<String, Value>,
    /// Most recent interactions, oldest first, at most 5.
    #[serde(default)]
    pub recent: Vec<Interaction>,
}

/// Request priority for the batch queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(confidence: f64, category: CommandCategory) -> ClassificationResult {
        ClassificationResult {
            category,
            intent: category.intent(),
            confidence,
            parameters: HashMap::new(),
            raw_text: "x".into(),
            normalized_text: "x".into(),
            context_used: false,
            preprocessing_ms: 0.0,
            classification_ms: 0.0,
            suggestions: Vec::new(),
        }
    }

    #[test]
    fn confidence_level_partitions_at_thresholds() {
        let cases = [
            (0.81, ConfidenceLevel::High),
            (0.8, ConfidenceLevel::Medium),
            (0.51, ConfidenceLevel::Medium),
            (0.5, ConfidenceLevel::Low),
            (0.31, ConfidenceLevel::Low),
            (0.3, ConfidenceLevel::VeryLow),
            (0.0, ConfidenceLevel::VeryLow),
        ];
        for (confidence, expected) in cases {
            let r = result_with(confidence, CommandCategory::Email);
            assert_eq!(r.confidence_level(), expected, "confidence {confidence}");
        }
    }

    #[test]
    fn confirmation_required_below_threshold_or_unknown() {
        assert!(result_with(0.69, CommandCategory::Email).requires_confirmation());
        assert!(!result_with(0.7, CommandCategory::Email).requires_confirmation());
        assert!(result_with(0.95, CommandCategory::Unknown).requires_confirmation());
    }

    #[test]
    fn utterance_length_bounds() {
        let mut u = Utterance {
            text: "hello".into(),
            user_id: "u".into(),
            session_id: "s".into(),
            use_context: false,
            parameters: HashMap::new(),
        };
        assert!(u.validate().is_ok());
        u.text = String::new();
        assert!(u.validate().is_err());
        u.text = "a".repeat(1001);
        assert!(u.validate().is_err());
    }

    #[test]
    fn category_round_trips_through_kebab_case() {
        for c in CommandCategory::ALL {
            let json = serde_json::to_string(&c).unwrap();
            let back: CommandCategory = serde_json::from_str(&json).unwrap();
            assert_eq!(c, back);
        }
        assert_eq!(
            serde_json::to_string(&CommandCategory::DocumentGeneration).unwrap(),
            "\"document-generation\""
        );
    }
}
