use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use valet_core::config::{CONTEXT_IDLE_MINUTES, CONTEXT_LOCAL_CAPACITY};
use valet_core::types::CommandCategory;
use valet_store::KvStore;

use crate::topic::extract_topic;
use crate::types::{ContextSummary, ConversationContext};

/// Fraction of local contexts dropped when the map overflows.
const EVICT_FRACTION: usize = 5; // oldest 20%

fn context_key(user_id: &str, session_id: &str) -> String {
    format!("{user_id}:{session_id}")
}

fn kv_context_key(user_id: &str, session_id: &str) -> String {
    format!("context:{user_id}:{session_id}")
}

fn kv_sessions_key(user_id: &str) -> String {
    format!("user_sessions:{user_id}")
}

fn idle_ttl() -> Duration {
    Duration::from_secs(CONTEXT_IDLE_MINUTES as u64 * 60)
}

/// Conversation store: bounded local map mirrored into the shared KV.
///
/// Writes to the same (user, session) are serialized by the map's
/// per-entry exclusive access; the KV mirror happens after the entry lock
/// is released and is fire-and-forget. Reads may be stale by at most one
/// concurrent write.
pub struct ContextStore {
    local: DashMap<String, ConversationContext>,
    kv: Option<Arc<dyn KvStore>>,
    capacity: usize,
}

impl ContextStore {
    pub fn new(kv: Option<Arc<dyn KvStore>>) -> Self {
        Self {
            local: DashMap::new(),
            kv,
            capacity: CONTEXT_LOCAL_CAPACITY,
        }
    }

    #[cfg(test)]
    fn with_capacity(kv: Option<Arc<dyn KvStore>>, capacity: usize) -> Self {
        Self {
            local: DashMap::new(),
            kv,
            capacity,
        }
    }

    /// Fetch a context, falling back local → shared KV → (optionally) a
    /// fresh record. Expired contexts are evicted on access.
    pub fn get(
        &self,
        user_id: &str,
        session_id: &str,
        create_if_missing: bool,
    ) -> Option<ConversationContext> {
        let key = context_key(user_id, session_id);

        if let Some(ctx) = self.local.get(&key) {
            if !ctx.is_expired() {
                return Some(ctx.value().clone());
            }
        }
        // either absent or expired; a separate call avoids holding the
        // entry ref across the removal
        self.local.remove_if(&key, |_, ctx| ctx.is_expired());

        if let Some(ctx) = self.kv_fetch(user_id, session_id) {
            if !ctx.is_expired() {
                self.local_insert(ctx.clone());
                return Some(ctx);
            }
        }

        if create_if_missing {
            let ctx = ConversationContext::new(user_id, session_id);
            self.save(&ctx);
            return Some(ctx);
        }

        None
    }

    /// Persist a context to both tiers.
    pub fn save(&self, ctx: &ConversationContext) {
        self.local_insert(ctx.clone());
        self.kv_mirror(ctx);
    }

    /// Atomic read-modify-write of one conversation turn.
    ///
    /// Topic extraction only runs for categories that carry capture
    /// phrases; everything else leaves the current topic in place.
    pub fn append_interaction(
        &self,
        user_id: &str,
        session_id: &str,
        user_input: &str,
        bot_response: &str,
        category: CommandCategory,
        parameters: HashMap<String, Value>,
    ) -> ConversationContext {
        let key = context_key(user_id, session_id);
        if !self.local.contains_key(&key) {
            // pull the shared copy (or a fresh record) into the local tier
            let _ = self.get(user_id, session_id, true);
        }

        let updated = {
            let mut entry = self
                .local
                .entry(key)
                .or_insert_with(|| ConversationContext::new(user_id, session_id));
            entry.add_interaction(user_input, bot_response, category, parameters);
            if let Some(topic) = extract_topic(user_input, category) {
                entry.current_topic = Some(topic);
            }
            entry.value().clone()
        };

        self.kv_mirror(&updated);
        debug!(user_id, session_id, "interaction appended");
        updated
    }

    /// Record the outcome of a classification without adding a full
    /// interaction: bumps the last category, merges extracted parameters
    /// and refreshes activity. The assistant's reply arrives later via
    /// [`append_interaction`](Self::append_interaction).
    pub fn note_classification(
        &self,
        user_id: &str,
        session_id: &str,
        category: CommandCategory,
        parameters: &HashMap<String, Value>,
    ) {
        let key = context_key(user_id, session_id);
        if !self.local.contains_key(&key) {
            let _ = self.get(user_id, session_id, true);
        }

        let updated = {
            let mut entry = self
                .local
                .entry(key)
                .or_insert_with(|| ConversationContext::new(user_id, session_id));
            entry.last_category = Some(category);
            for (name, value) in parameters {
                entry.active_parameters.insert(name.clone(), value.clone());
            }
            entry.touch();
            entry.value().clone()
        };
        self.kv_mirror(&updated);
    }

    pub fn summary(&self, user_id: &str, session_id: &str) -> Option<ContextSummary> {
        let ctx = self.get(user_id, session_id, false)?;
        let mut categories: Vec<String> = Vec::new();
        for interaction in &ctx.history {
            let name = interaction.category.to_string();
            if !categories.contains(&name) {
                categories.push(name);
            }
        }
        Some(ContextSummary {
            user_id: ctx.user_id.clone(),
            session_id: ctx.session_id.clone(),
            total_interactions: ctx.history.len(),
            categories_used: categories,
            current_topic: ctx.current_topic.clone(),
            last_activity: ctx.last_activity,
            duration_secs: (ctx.last_activity - ctx.created_at).num_seconds(),
        })
    }

    /// Conversation-starter suggestions: seeds for an empty history,
    /// otherwise derived from what the user has been doing.
    pub fn suggestions(&self, user_id: &str, session_id: &str) -> Vec<String> {
        let Some(ctx) = self.get(user_id, session_id, false) else {
            return seed_suggestions();
        };
        if ctx.history.is_empty() {
            return seed_suggestions();
        }

        let mut suggestions = Vec::new();
        if let Some(topic) = &ctx.current_topic {
            suggestions.push(format!("Continue working on {topic}"));
        }
        match ctx.last_category {
            Some(CommandCategory::DocumentGeneration) => {
                suggestions.push("Generate the document in another format".to_string());
                suggestions.push("Email the document to someone".to_string());
            }
            Some(CommandCategory::Email) => {
                suggestions.push("Send a follow-up email".to_string());
                suggestions.push("Schedule a meeting with the recipient".to_string());
            }
            Some(CommandCategory::WebSearch) => {
                suggestions.push("Search for related information".to_string());
                suggestions.push("Compile the findings into a report".to_string());
            }
            Some(CommandCategory::Calendar) => {
                suggestions.push("Send the meeting invite by email".to_string());
                suggestions.push("Set a reminder before the meeting".to_string());
            }
            _ => suggestions.push("Ask me to create, send, search, or schedule".to_string()),
        }
        suggestions.truncate(3);
        suggestions
    }

    pub fn clear(&self, user_id: &str, session_id: &str) {
        self.local.remove(&context_key(user_id, session_id));
        if let Some(kv) = &self.kv {
            if let Err(e) = kv.delete(&kv_context_key(user_id, session_id)) {
                warn!(err = %e, "kv context delete failed");
            }
            let _ = kv.set_remove(&kv_sessions_key(user_id), session_id);
        }
        info!(user_id, session_id, "context cleared");
    }

    pub fn clear_user(&self, user_id: &str) {
        for session_id in self.user_sessions(user_id) {
            self.clear(user_id, &session_id);
        }
    }

    /// All known session ids for a user, across both tiers.
    pub fn user_sessions(&self, user_id: &str) -> Vec<String> {
        let mut sessions: Vec<String> = self
            .kv
            .as_ref()
            .and_then(|kv| kv.set_members(&kv_sessions_key(user_id)).ok())
            .unwrap_or_default();

        let prefix = format!("{user_id}:");
        for entry in self.local.iter() {
            if let Some(session_id) = entry.key().strip_prefix(&prefix) {
                if !sessions.iter().any(|s| s.as_str() == session_id) {
                    sessions.push(session_id.to_string());
                }
            }
        }
        sessions
    }

    /// Drop every expired local context. Called by the gateway janitor.
    pub fn purge_expired(&self) -> usize {
        let before = self.local.len();
        self.local.retain(|_, ctx| !ctx.is_expired());
        before - self.local.len()
    }

    pub fn active_contexts(&self) -> usize {
        self.local.len()
    }

    fn local_insert(&self, ctx: ConversationContext) {
        let key = context_key(&ctx.user_id, &ctx.session_id);
        if !self.local.contains_key(&key) && self.local.len() >= self.capacity {
            self.evict_oldest();
        }
        self.local.insert(key, ctx);
    }

    fn evict_oldest(&self) {
        let mut by_age: Vec<(String, chrono::DateTime<chrono::Utc>)> = self
            .local
            .iter()
            .map(|e| (e.key().clone(), e.value().last_activity))
            .collect();
        by_age.sort_by_key(|(_, at)| *at);

        let drop_count = (self.capacity / EVICT_FRACTION).max(1);
        for (key, _) in by_age.into_iter().take(drop_count) {
            self.local.remove(&key);
        }
        debug!(dropped = drop_count, "evicted oldest local contexts");
    }

    fn kv_fetch(&self, user_id: &str, session_id: &str) -> Option<ConversationContext> {
        let kv = self.kv.as_ref()?;
        match kv.get(&kv_context_key(user_id, session_id)) {
            Ok(Some(blob)) => serde_json::from_str(&blob).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(err = %e, "kv context read failed, degrading to local");
                None
            }
        }
    }

    fn kv_mirror(&self, ctx: &ConversationContext) {
        let Some(kv) = &self.kv else { return };
        match serde_json::to_string(ctx) {
            Ok(blob) => {
                if let Err(e) = kv.set(
                    &kv_context_key(&ctx.user_id, &ctx.session_id),
                    &blob,
                    Some(idle_ttl()),
                ) {
                    warn!(err = %e, "kv context write failed");
                }
                if let Err(e) =
                    kv.set_add(&kv_sessions_key(&ctx.user_id), &ctx.session_id, Some(idle_ttl()))
                {
                    warn!(err = %e, "kv session set update failed");
                }
            }
            Err(e) => warn!(err = %e, "context serialization failed"),
        }
    }
}

fn seed_suggestions() -> Vec<String> {
    vec![
        "Create a document about a topic".to_string(),
        "Send an email to a teammate".to_string(),
        "Search the web for information".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use valet_store::MemoryKv;

    #[test]
    fn append_then_summary_counts_one_more() {
        let store = ContextStore::new(None);
        store.append_interaction(
            "u1",
            "s1",
            "hello",
            "hi there",
            CommandCategory::GeneralConversation,
            HashMap::new(),
        );
        let summary = store.summary("u1", "s1").unwrap();
        assert_eq!(summary.total_interactions, 1);

        store.append_interaction(
            "u1",
            "s1",
            "search for rust",
            "found it",
            CommandCategory::WebSearch,
            HashMap::new(),
        );
        let summary = store.summary("u1", "s1").unwrap();
        assert_eq!(summary.total_interactions, 2);
        assert_eq!(
            summary.categories_used,
            vec!["general-conversation".to_string(), "web-search".to_string()]
        );
    }

    #[test]
    fn clear_then_get_without_create_is_empty() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let store = ContextStore::new(Some(kv));
        store.append_interaction(
            "u1",
            "s1",
            "hi",
            "hello",
            CommandCategory::GeneralConversation,
            HashMap::new(),
        );
        assert!(store.get("u1", "s1", false).is_some());

        store.clear("u1", "s1");
        assert!(store.get("u1", "s1", false).is_none());
    }

    #[test]
    fn clear_user_drops_every_session() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let store = ContextStore::new(Some(kv));
        for session in ["s1", "s2", "s3"] {
            store.append_interaction(
                "u1",
                session,
                "hi",
                "hello",
                CommandCategory::GeneralConversation,
                HashMap::new(),
            );
        }
        assert_eq!(store.user_sessions("u1").len(), 3);

        store.clear_user("u1");
        assert!(store.user_sessions("u1").is_empty());
        assert!(store.get("u1", "s1", false).is_none());
    }

    #[test]
    fn kv_mirror_survives_local_eviction() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let store = ContextStore::with_capacity(Some(kv.clone()), 100);
        store.append_interaction(
            "u1",
            "s1",
            "write a doc about otters",
            "done",
            CommandCategory::DocumentGeneration,
            HashMap::new(),
        );
        store.local.clear();

        let restored = store.get("u1", "s1", false).unwrap();
        assert_eq!(restored.history.len(), 1);
        assert_eq!(restored.current_topic.as_deref(), Some("otters"));
    }

    #[test]
    fn capacity_overflow_evicts_oldest_contexts() {
        let store = ContextStore::with_capacity(None, 10);
        for i in 0..10 {
            store.save(&ConversationContext::new("u", &format!("s{i}")));
        }
        assert_eq!(store.active_contexts(), 10);

        // the 11th insert drops the oldest 20% first
        store.save(&ConversationContext::new("u", "s10"));
        assert_eq!(store.active_contexts(), 9);
        assert!(store.get("u", "s10", false).is_some());
    }

    #[test]
    fn topic_updates_only_for_topic_categories() {
        let store = ContextStore::new(None);
        store.append_interaction(
            "u",
            "s",
            "create a report about whales",
            "ok",
            CommandCategory::DocumentGeneration,
            HashMap::new(),
        );
        store.append_interaction(
            "u",
            "s",
            "send an email about budgets",
            "ok",
            CommandCategory::Email,
            HashMap::new(),
        );
        let ctx = store.get("u", "s", false).unwrap();
        assert_eq!(ctx.current_topic.as_deref(), Some("whales"));
    }

    #[test]
    fn suggestions_seed_then_follow_history() {
        let store = ContextStore::new(None);
        let seeds = store.suggestions("u", "fresh");
        assert_eq!(seeds.len(), 3);

        store.append_interaction(
            "u",
            "s",
            "search for ferrets",
            "ok",
            CommandCategory::WebSearch,
            HashMap::new(),
        );
        let derived = store.suggestions("u", "s");
        assert!(derived.iter().any(|s| s.contains("ferrets") || s.contains("related")));
    }
}
