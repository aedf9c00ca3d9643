use once_cell::sync::Lazy;
use regex::Regex;

use valet_core::types::CommandCategory;

static DOC_TOPIC: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"about\s+(.+?)(?:\s+in\b|\s+for\b|$)",
        r"\bon\s+(.+?)(?:\s+in\b|\s+for\b|$)",
        r"regarding\s+(.+?)(?:\s+in\b|\s+for\b|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static topic pattern"))
    .collect()
});

static SEARCH_TOPIC: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"search\s+for\s+(.+?)$",
        r"find\s+(.+?)$",
        r"about\s+(.+?)$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static topic pattern"))
    .collect()
});

/// Extract the conversation topic from a turn. Only document generation
/// and web search carry capture phrases; other categories leave the topic
/// unchanged (signalled by `None`).
pub fn extract_topic(user_input: &str, category: CommandCategory) -> Option<String> {
    let patterns = match category {
        CommandCategory::DocumentGeneration => &*DOC_TOPIC,
        CommandCategory::WebSearch => &*SEARCH_TOPIC,
        _ => return None,
    };

    let lowered = user_input.to_lowercase();
    for pattern in patterns {
        if let Some(c) = pattern.captures(&lowered) {
            let topic = c[1].trim();
            if !topic.is_empty() {
                return Some(topic.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_topic_from_about_phrase() {
        assert_eq!(
            extract_topic(
                "create a report about renewable energy for the board",
                CommandCategory::DocumentGeneration
            )
            .as_deref(),
            Some("renewable energy")
        );
    }

    #[test]
    fn search_topic_from_query() {
        assert_eq!(
            extract_topic("search for rust async patterns", CommandCategory::WebSearch).as_deref(),
            Some("rust async patterns")
        );
    }

    #[test]
    fn other_categories_leave_topic_unchanged() {
        assert_eq!(
            extract_topic("send an email about budgets", CommandCategory::Email),
            None
        );
    }
}
