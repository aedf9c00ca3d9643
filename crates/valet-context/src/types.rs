use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use valet_core::config::{CONTEXT_IDLE_MINUTES, HISTORY_LIMIT};
use valet_core::types::{CommandCategory, ContextSnapshot, Interaction};

/// Per-(user, session) conversation record.
///
/// History is a bounded FIFO of at most [`HISTORY_LIMIT`] interactions;
/// `last_activity` is monotonically non-decreasing and drives the
/// 30-minute idle expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub user_id: String,
    pub session_id: String,
    #[serde(default)]
    pub history: VecDeque<Interaction>,
    pub current_topic: Option<String>,
    pub last_category: Option<CommandCategory>,
    #[serde(default)]
    pub active_parameters: HashMap<String, Value>,
    #[serde(default)]
    pub preferences: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl ConversationContext {
    pub fn new(user_id: &str, session_id: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            history: VecDeque::new(),
            current_topic: None,
            last_category: None,
            active_parameters: HashMap::new(),
            preferences: HashMap::new(),
            created_at: now,
            last_activity: now,
        }
    }

    /// Append one interaction, evicting the oldest past the history cap.
    /// Active parameters merge last-write-wins.
    pub fn add_interaction(
        &mut self,
        user_input: &str,
        bot_response: &str,
        category: CommandCategory,
        parameters: HashMap<String, Value>,
    ) {
        for (name, value) in &parameters {
            self.active_parameters.insert(name.clone(), value.clone());
        }

        self.history.push_back(Interaction {
            timestamp: Utc::now(),
            user_input: user_input.to_string(),
            bot_response: bot_response.to_string(),
            category,
            parameters,
        });
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }

        self.last_category = Some(category);
        self.touch();
    }

    /// Bump `last_activity`, never backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() - self.last_activity > Duration::minutes(CONTEXT_IDLE_MINUTES)
    }

    /// Immutable view handed to the classifier and workflow engine.
    pub fn snapshot(&self) -> ContextSnapshot {
        let recent: Vec<Interaction> = self
            .history
            .iter()
            .rev()
            .take(5)
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        ContextSnapshot {
            last_category: self.last_category,
            current_topic: self.current_topic.clone(),
            active_parameters: self.active_parameters.clone(),
            recent,
        }
    }
}

/// Aggregate view returned by the summary endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ContextSummary {
    pub user_id: String,
    pub session_id: String,
    pub total_interactions: usize,
    pub categories_used: Vec<String>,
    pub current_topic: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub duration_secs: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_bounded_at_twenty() {
        let mut ctx = ConversationContext::new("u", "s");
        for i in 0..25 {
            ctx.add_interaction(
                &format!("msg {i}"),
                "ok",
                CommandCategory::GeneralConversation,
                HashMap::new(),
            );
        }
        assert_eq!(ctx.history.len(), 20);
        // the oldest five were evicted
        assert_eq!(ctx.history.front().unwrap().user_input, "msg 5");
        assert_eq!(ctx.history.back().unwrap().user_input, "msg 24");
    }

    #[test]
    fn timestamps_never_decrease() {
        let mut ctx = ConversationContext::new("u", "s");
        let mut last = ctx.last_activity;
        for _ in 0..5 {
            ctx.add_interaction("hi", "hello", CommandCategory::GeneralConversation, HashMap::new());
            assert!(ctx.last_activity >= last);
            last = ctx.last_activity;
        }
        let stamps: Vec<_> = ctx.history.iter().map(|i| i.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn active_parameters_are_last_write_wins() {
        let mut ctx = ConversationContext::new("u", "s");
        let mut first = HashMap::new();
        first.insert("format".to_string(), Value::String("pdf".into()));
        ctx.add_interaction("a", "b", CommandCategory::DocumentGeneration, first);

        let mut second = HashMap::new();
        second.insert("format".to_string(), Value::String("docx".into()));
        ctx.add_interaction("c", "d", CommandCategory::DocumentGeneration, second);

        assert_eq!(
            ctx.active_parameters.get("format").and_then(|v| v.as_str()),
            Some("docx")
        );
    }

    #[test]
    fn snapshot_carries_recent_five_oldest_first() {
        let mut ctx = ConversationContext::new("u", "s");
        for i in 0..8 {
            ctx.add_interaction(
                &format!("m{i}"),
                "r",
                CommandCategory::WebSearch,
                HashMap::new(),
            );
        }
        let snap = ctx.snapshot();
        assert_eq!(snap.recent.len(), 5);
        assert_eq!(snap.recent[0].user_input, "m3");
        assert_eq!(snap.recent[4].user_input, "m7");
        assert_eq!(snap.last_category, Some(CommandCategory::WebSearch));
    }
}
