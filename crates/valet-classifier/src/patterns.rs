use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

use valet_core::types::CommandCategory;

/// Pattern family for one category: trigger regexes, training exemplars
/// for the similarity scorer, and the parameter names the category can
/// carry.
pub struct CategoryPatterns {
    pub category: CommandCategory,
    pub triggers: Vec<Regex>,
    pub exemplars: &'static [&'static str],
    pub parameter_names: &'static [&'static str],
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static category pattern")
}

/// All scorable categories in declaration order (the classification
/// tie-break order).
pub static CATEGORY_TABLE: Lazy<Vec<CategoryPatterns>> = Lazy::new(|| {
    vec![
        CategoryPatterns {
            category: CommandCategory::DocumentGeneration,
            triggers: vec![
                re(r"\b(create|generate|make|write)\s+(a\s+|an\s+)?(document|doc|pdf|report|letter|memo)\b"),
                re(r"\bdocument\s+(about|for|on)\b"),
                re(r"\bwrite\s+me\s+a\b"),
                re(r"\bcreate\s+a\s+(pdf|word|doc)\b"),
            ],
            exemplars: &[
                "create a document about artificial intelligence",
                "generate a pdf report on sales data",
                "write me a letter to the customer",
                "make a document for the meeting",
                "create a pdf report about the quarterly results",
            ],
            parameter_names: &["content_topic", "format", "template", "audience"],
        },
        CategoryPatterns {
            category: CommandCategory::Email,
            triggers: vec![
                re(r"\b(send|compose|write)\s+(an\s+|a\s+)?(email|mail|message)\b"),
                re(r"\bemail\s+(to|about)\b"),
                re(r"\bsend\s+.*\s+to\s+[\w.+-]+@[\w.-]+\b"),
                re(r"\bcompose\s+a\s+(message|mail)\b"),
            ],
            exemplars: &[
                "send an email to john@example.com",
                "compose a message about the project",
                "write an email to the team",
                "send mail to support",
            ],
            parameter_names: &["recipient", "subject", "content", "priority", "attachments"],
        },
        CategoryPatterns {
            category: CommandCategory::Calendar,
            triggers: vec![
                re(r"\b(schedule|book|create|add)\s+(a\s+|an\s+)?(meeting|appointment|event)\b"),
                re(r"\bmeet\s+with\b"),
                re(r"\b(calendar|schedule)\s+(for|on)\b"),
                re(r"\bset\s+up\s+a\s+(meeting|call)\b"),
            ],
            exemplars: &[
                "schedule a meeting with the team",
                "book an appointment for tomorrow",
                "create an event for the conference",
                "meet with sarah at 3 pm",
            ],
            parameter_names: &["date_time", "duration", "attendees", "location", "agenda"],
        },
        CategoryPatterns {
            category: CommandCategory::WebSearch,
            triggers: vec![
                re(r"\b(search|look\s+up|google)\s+(for|about)?\b"),
                re(r"\bfind\s+(information|details|results)\b"),
                re(r"\bwhat\s+is\s+[a-z]"),
                re(r"\bhow\s+to\b"),
                re(r"\btell\s+me\s+about\b"),
            ],
            exemplars: &[
                "search for python tutorials",
                "what is machine learning",
                "find information about climate change",
                "look up the weather forecast",
            ],
            parameter_names: &["query", "search_type", "num_results"],
        },
        CategoryPatterns {
            category: CommandCategory::Calculations,
            triggers: vec![
                re(r"\b(calculate|compute|what\s+is)\s+[\d+\-*/\s]+"),
                re(r"\b\d+\s*[+\-*/]\s*\d+\b"),
                re(r"\bmath\s+(problem|calculation)\b"),
                re(r"\bconvert\s+\d+\b"),
            ],
            exemplars: &[
                "calculate 15 plus 27",
                "what is 100 divided by 4",
                "compute the square root of 64",
                "convert 100 usd to eur",
            ],
            parameter_names: &["expression", "operation", "units"],
        },
        CategoryPatterns {
            category: CommandCategory::Reminders,
            triggers: vec![
                re(r"\b(remind|alert)\s+me\b"),
                re(r"\bset\s+(a\s+)?(reminder|alarm)\b"),
                re(r"\bdo\s+not\s+forget\b"),
                re(r"\bremember\s+to\b"),
            ],
            exemplars: &[
                "remind me to call mom",
                "set a reminder for the meeting",
                "do not forget to buy groceries",
                "alert me in 30 minutes",
            ],
            parameter_names: &["task", "time", "frequency", "priority"],
        },
        CategoryPatterns {
            category: CommandCategory::SystemControl,
            triggers: vec![
                re(r"\b(open|close|launch|start|stop|quit)\s+(the\s+)?(app|application|program|calculator|browser)\b"),
                re(r"\b(increase|decrease|set)\s+(the\s+)?(volume|brightness)\b"),
                re(r"\bturn\s+(on|off)\b"),
                re(r"\bsystem\s+(restart|shutdown)\b"),
            ],
            exemplars: &[
                "open the calculator app",
                "increase the volume",
                "turn off bluetooth",
                "close the browser",
            ],
            parameter_names: &["action", "target", "value"],
        },
        CategoryPatterns {
            category: CommandCategory::GeneralConversation,
            triggers: vec![
                re(r"\b(hello|hi|hey|good\s+(morning|afternoon|evening))\b"),
                re(r"\bhow\s+are\s+you\b"),
                re(r"\bwhat\s+can\s+you\s+do\b"),
                re(r"\btell\s+me\s+a\s+(joke|story)\b"),
            ],
            exemplars: &[
                "hello there",
                "how are you doing",
                "what can you help me with",
                "tell me a joke",
            ],
            parameter_names: &["greeting_type", "conversation_topic"],
        },
    ]
});

pub fn patterns_for(category: CommandCategory) -> Option<&'static CategoryPatterns> {
    CATEGORY_TABLE.iter().find(|p| p.category == category)
}

// Parameter extraction regex families, category-scoped.

static EMAIL_ADDR: Lazy<Regex> =
    Lazy::new(|| re(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"));
static EMAIL_SUBJECT: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        re(r"about\s+(.+?)(?:\s+to\b|\s+for\b|$)"),
        re(r"regarding\s+(.+?)(?:\s+to\b|\s+for\b|$)"),
        re(r"subject\s+(.+?)(?:\s+to\b|\s+for\b|$)"),
    ]
});
static DOC_FORMAT: Lazy<Regex> = Lazy::new(|| re(r"\b(pdf|docx|doc|txt|markdown|md)\b"));
static DOC_TOPIC: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        re(r"about\s+(.+?)(?:\s+in\b|\s+for\b|$)"),
        re(r"\bon\s+(.+?)(?:\s+in\b|\s+for\b|$)"),
        re(r"document\s+(.+?)(?:\s+in\b|\s+for\b|$)"),
    ]
});
static CALENDAR_TIME: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        re(r"\b(tomorrow|today|tonight|next\s+week|next\s+month)\b"),
        re(r"\b(\d{1,2}:\d{2})\s*(am|pm)?\b"),
        re(r"\b(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b"),
        re(r"\b(january|february|march|april|may|june|july|august|september|october|november|december)\s+\d{1,2}\b"),
    ]
});
static CALENDAR_ATTENDEES: Lazy<Regex> = Lazy::new(|| {
    re(r"with\s+(.+?)(?:\s+at\b|\s+on\b|\s+for\b|\s+tomorrow\b|\s+today\b|\s+then\b|$)")
});
static SEARCH_QUERY: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        re(r"search\s+for\s+(.+?)$"),
        re(r"find\s+(.+?)$"),
        re(r"look\s+up\s+(.+?)$"),
        re(r"what\s+is\s+(.+?)$"),
        re(r"tell\s+me\s+about\s+(.+?)$"),
    ]
});
static MATH_EXPR: Lazy<Regex> = Lazy::new(|| re(r"[\d+\-*/().\s]*\d[\d+\-*/().\s]*"));
static REMINDER_TASK: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        re(r"remind\s+me\s+to\s+(.+?)(?:\s+at\b|\s+in\b|\s+tomorrow\b|$)"),
        re(r"remember\s+to\s+(.+?)(?:\s+at\b|\s+in\b|\s+tomorrow\b|$)"),
        re(r"do\s+not\s+forget\s+to\s+(.+?)(?:\s+at\b|\s+in\b|\s+tomorrow\b|$)"),
    ]
});
static REMINDER_TIME: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        re(r"\bin\s+(\d+\s+(?:seconds?|minutes?|hours?|days?))\b"),
        re(r"\bat\s+(\d{1,2}(?::\d{2})?\s*(?:am|pm)?)\b"),
        re(r"\b(tomorrow|tonight|today)\b"),
    ]
});
static SYSTEM_ACTION: Lazy<Regex> = Lazy::new(|| {
    re(r"\b(open|close|launch|start|stop|quit|increase|decrease|enable|disable)\s+(?:the\s+)?(.+?)$")
});

/// Extract category-scoped parameters from normalized text. Missing
/// parameters stay absent.
pub fn extract_parameters(text: &str, category: CommandCategory) -> HashMap<String, Value> {
    let mut params = HashMap::new();
    let mut put = |name: &str, value: String| {
        params.insert(name.to_string(), Value::String(value));
    };

    match category {
        CommandCategory::Email => {
            if let Some(m) = EMAIL_ADDR.find(text) {
                put("recipient", m.as_str().to_string());
            }
            for pattern in EMAIL_SUBJECT.iter() {
                if let Some(c) = pattern.captures(text) {
                    put("subject", c[1].trim().to_string());
                    break;
                }
            }
        }
        CommandCategory::DocumentGeneration => {
            if let Some(c) = DOC_FORMAT.captures(text) {
                put("format", c[1].to_lowercase());
            }
            for pattern in DOC_TOPIC.iter() {
                if let Some(c) = pattern.captures(text) {
                    put("content_topic", c[1].trim().to_string());
                    break;
                }
            }
        }
        CommandCategory::Calendar => {
            for pattern in CALENDAR_TIME.iter() {
                if let Some(c) = pattern.captures(text) {
                    put("date_time", c[0].trim().to_string());
                    break;
                }
            }
            if let Some(c) = CALENDAR_ATTENDEES.captures(text) {
                put("attendees", c[1].trim().to_string());
            }
        }
        CommandCategory::WebSearch => {
            for pattern in SEARCH_QUERY.iter() {
                if let Some(c) = pattern.captures(text) {
                    put("query", c[1].trim().to_string());
                    break;
                }
            }
        }
        CommandCategory::Calculations => {
            if let Some(m) = MATH_EXPR.find(text) {
                let expr = m.as_str().trim();
                if !expr.is_empty() {
                    put("expression", expr.to_string());
                }
            }
        }
        CommandCategory::Reminders => {
            for pattern in REMINDER_TASK.iter() {
                if let Some(c) = pattern.captures(text) {
                    put("task", c[1].trim().to_string());
                    break;
                }
            }
            for pattern in REMINDER_TIME.iter() {
                if let Some(c) = pattern.captures(text) {
                    put("time", c[1].trim().to_string());
                    break;
                }
            }
        }
        CommandCategory::SystemControl => {
            if let Some(c) = SYSTEM_ACTION.captures(text) {
                put("action", c[1].to_string());
                put("target", c[2].trim().to_string());
            }
        }
        CommandCategory::GeneralConversation | CommandCategory::Unknown => {}
    }

    params
}

/// Parameters a category needs before a workflow step can run.
pub fn required_parameters(category: CommandCategory) -> &'static [&'static str] {
    match category {
        CommandCategory::DocumentGeneration => &["content_topic", "format"],
        CommandCategory::Email => &["recipient", "subject"],
        CommandCategory::Calendar => &["date_time", "attendees"],
        CommandCategory::WebSearch => &["query"],
        CommandCategory::Reminders => &["task", "time"],
        CommandCategory::Calculations => &["expression"],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get<'a>(params: &'a HashMap<String, Value>, name: &str) -> &'a str {
        params.get(name).and_then(|v| v.as_str()).unwrap_or("")
    }

    #[test]
    fn email_parameters_extracted() {
        let params = extract_parameters(
            "send an email to alice@example.com about the launch",
            CommandCategory::Email,
        );
        assert_eq!(get(&params, "recipient"), "alice@example.com");
        assert_eq!(get(&params, "subject"), "the launch");
    }

    #[test]
    fn document_parameters_extracted() {
        let params = extract_parameters(
            "create a pdf report about machine learning",
            CommandCategory::DocumentGeneration,
        );
        assert_eq!(get(&params, "format"), "pdf");
        assert_eq!(get(&params, "content_topic"), "machine learning");
    }

    #[test]
    fn search_query_extracted() {
        let params = extract_parameters(
            "search for fastapi best practices",
            CommandCategory::WebSearch,
        );
        assert_eq!(get(&params, "query"), "fastapi best practices");
    }

    #[test]
    fn calendar_attendees_stop_at_time_words() {
        let params = extract_parameters(
            "schedule a meeting with sarah tomorrow then send the invite",
            CommandCategory::Calendar,
        );
        assert_eq!(get(&params, "attendees"), "sarah");
        assert_eq!(get(&params, "date_time"), "tomorrow");
    }

    #[test]
    fn math_expression_extracted() {
        let params = extract_parameters("calculate 15 + 27", CommandCategory::Calculations);
        assert_eq!(get(&params, "expression"), "15 + 27");
    }

    #[test]
    fn missing_parameters_stay_absent() {
        let params = extract_parameters("compose a message", CommandCategory::Email);
        assert!(!params.contains_key("recipient"));
        assert!(!params.contains_key("subject"));
    }
}
