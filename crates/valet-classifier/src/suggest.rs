/// Keyword-template suggestions for unclear input. Returned only when
/// confidence drops below 0.5; capped at three entries.
pub fn generate_suggestions(normalized_text: &str) -> Vec<String> {
    let mut suggestions = Vec::new();
    let keywords: Vec<&str> = normalized_text.split_whitespace().collect();
    let has = |set: &[&str]| keywords.iter().any(|k| set.contains(k));

    if has(&["create", "make", "generate", "write"]) {
        suggestions.push("Try: 'Create a document about [topic]'".to_string());
        suggestions.push("Try: 'Generate a PDF report on [subject]'".to_string());
    }
    if has(&["send", "email", "mail"]) {
        suggestions.push("Try: 'Send an email to [recipient] about [subject]'".to_string());
        suggestions.push("Try: 'Compose a message to the team'".to_string());
    }
    if has(&["search", "find", "look"]) {
        suggestions.push("Try: 'Search for information about [topic]'".to_string());
        suggestions.push("Try: 'Find details on [subject]'".to_string());
    }
    if has(&["schedule", "meeting", "appointment"]) {
        suggestions.push("Try: 'Schedule a meeting with [person] tomorrow'".to_string());
        suggestions.push("Try: 'Book an appointment for [date/time]'".to_string());
    }

    if suggestions.is_empty() {
        suggestions = vec![
            "Try being more specific about what you want to do".to_string(),
            "Use action words like 'create', 'send', 'search', or 'schedule'".to_string(),
            "Include details like recipients, topics, or dates".to_string(),
        ];
    }

    suggestions.truncate(3);
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gibberish_gets_exactly_three_generic_suggestions() {
        let s = generate_suggestions("xyz blarg zxc");
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn keyword_suggestions_are_capped_at_three() {
        let s = generate_suggestions("create send search schedule");
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn action_keywords_drive_templates() {
        let s = generate_suggestions("send something somewhere");
        assert!(s[0].contains("email"));
    }
}
