use crate::types::{AnalyticsEvent, BehaviorPattern, EngagementLevel, EventKind, UserProfile};

/// Fold one event into a user profile.
pub fn apply_event(profile: &mut UserProfile, event: &AnalyticsEvent) {
    if event.timestamp > profile.last_active {
        profile.last_active = event.timestamp;
    }

    match event.kind {
        EventKind::Command => {
            profile.total_commands += 1;
            if event
                .data
                .get("success")
                .and_then(|v| v.as_bool())
                .unwrap_or(true)
            {
                profile.successful_commands += 1;
            }
            if let Some(category) = event.data.get("category").and_then(|v| v.as_str()) {
                *profile
                    .command_frequency
                    .entry(category.to_string())
                    .or_insert(0) += 1;
            }
            if let Some(len) = event.data.get("text_length").and_then(|v| v.as_u64()) {
                profile.total_command_chars += len;
            }
        }
        EventKind::Error => profile.error_count += 1,
        _ => {}
    }

    profile.behavior_patterns = infer_patterns(profile);
    profile.engagement_level = infer_engagement(profile);
}

/// Rule-based behaviour classification over the running counters.
fn infer_patterns(profile: &UserProfile) -> Vec<BehaviorPattern> {
    let mut patterns = Vec::new();

    if profile.total_commands >= 100 {
        patterns.push(BehaviorPattern::PowerUser);
    }
    if profile.command_frequency.len() >= 4 {
        patterns.push(BehaviorPattern::Explorer);
    }
    if let Some(max) = profile.command_frequency.values().max() {
        if profile.total_commands >= 5 && *max as f64 / profile.total_commands as f64 > 0.6 {
            patterns.push(BehaviorPattern::Routine);
        }
    }
    let attempts = profile.total_commands + profile.error_count;
    if attempts >= 5 && profile.error_count as f64 / attempts as f64 > 0.3 {
        patterns.push(BehaviorPattern::HelpSeeker);
    }

    patterns
}

fn infer_engagement(profile: &UserProfile) -> EngagementLevel {
    if profile.total_commands >= 50 && profile.success_rate() >= 0.7 {
        EngagementLevel::High
    } else if profile.total_commands < 5 || profile.success_rate() < 0.3 {
        EngagementLevel::Low
    } else {
        EngagementLevel::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn command_event(user: &str, category: &str, success: bool) -> AnalyticsEvent {
        AnalyticsEvent::new(
            EventKind::Command,
            user,
            "s1",
            json!({ "category": category, "success": success, "text_length": 20 }),
        )
    }

    #[test]
    fn command_events_accumulate_counters() {
        let mut profile = UserProfile::new("u1");
        apply_event(&mut profile, &command_event("u1", "email", true));
        apply_event(&mut profile, &command_event("u1", "email", false));

        assert_eq!(profile.total_commands, 2);
        assert_eq!(profile.successful_commands, 1);
        assert_eq!(profile.command_frequency["email"], 2);
        assert_eq!(profile.average_command_length(), 20.0);
        assert_eq!(profile.success_rate(), 0.5);
    }

    #[test]
    fn routine_pattern_emerges_from_category_dominance() {
        let mut profile = UserProfile::new("u1");
        for _ in 0..6 {
            apply_event(&mut profile, &command_event("u1", "web-search", true));
        }
        assert!(profile.behavior_patterns.contains(&BehaviorPattern::Routine));
    }

    #[test]
    fn explorer_pattern_needs_category_spread() {
        let mut profile = UserProfile::new("u1");
        for category in ["email", "calendar", "web-search", "reminders"] {
            apply_event(&mut profile, &command_event("u1", category, true));
        }
        assert!(profile.behavior_patterns.contains(&BehaviorPattern::Explorer));
    }

    #[test]
    fn engagement_tiers_follow_volume_and_success() {
        let mut profile = UserProfile::new("u1");
        assert_eq!(profile.engagement_level, EngagementLevel::Medium);

        for _ in 0..50 {
            apply_event(&mut profile, &command_event("u1", "email", true));
        }
        assert_eq!(profile.engagement_level, EngagementLevel::High);
    }
}
