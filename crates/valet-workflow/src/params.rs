use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use valet_classifier::patterns::required_parameters;
use valet_core::types::{ClassificationResult, CommandCategory, ContextSnapshot};

use crate::types::{AdvancedParameter, ParameterSource};

fn rules(table: &[(&str, &str)]) -> Vec<(Regex, String)> {
    table
        .iter()
        .map(|(p, v)| (Regex::new(p).expect("static inference pattern"), v.to_string()))
        .collect()
}

static URGENCY: Lazy<Vec<(Regex, String)>> = Lazy::new(|| {
    rules(&[
        (r"\b(urgent|asap|immediately|right\s+away|now)\b", "high"),
        (r"\b(soon|quickly|fast)\b", "medium"),
        (r"\b(later|eventually|when\s+convenient)\b", "low"),
    ])
});
static TIMEFRAME: Lazy<Vec<(Regex, String)>> = Lazy::new(|| {
    rules(&[
        (r"\b(today|this\s+morning|this\s+afternoon|tonight)\b", "today"),
        (r"\b(tomorrow|next\s+day)\b", "tomorrow"),
        (r"\b(next\s+week|this\s+week)\b", "this_week"),
        (r"\b(next\s+month|this\s+month)\b", "this_month"),
    ])
});
static DOC_FORMAT: Lazy<Vec<(Regex, String)>> = Lazy::new(|| {
    rules(&[
        (r"\b(pdf|portable\s+document)\b", "pdf"),
        (r"\b(word|docx?|document)\b", "docx"),
        (r"\b(presentation|slides|ppt|powerpoint)\b", "pptx"),
        (r"\b(spreadsheet|excel|xlsx)\b", "xlsx"),
        (r"\b(markdown|md)\b", "md"),
        (r"\b(text|txt)\b", "txt"),
    ])
});
static PRIORITY: Lazy<Vec<(Regex, String)>> = Lazy::new(|| {
    rules(&[
        (r"\b(critical|urgent|emergency|asap|immediately)\b", "high"),
        (r"\b(important|priority|soon|quick)\b", "medium"),
        (r"\b(low\s+priority|when\s+convenient|later|eventually)\b", "low"),
    ])
});
static AUDIENCE: Lazy<Vec<(Regex, String)>> = Lazy::new(|| {
    rules(&[
        (r"\b(team|colleagues|coworkers)\b", "internal_team"),
        (r"\b(client|customer)\b", "external_client"),
        (r"\b(management|boss|supervisor)\b", "management"),
        (r"\b(public|everyone|general)\b", "public"),
        (r"\b(technical|developer|engineer)\b", "technical"),
    ])
});

fn first_match(table: &[(Regex, String)], text: &str) -> Option<String> {
    table
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, v)| v.clone())
}

/// Merge parameter evidence into one resolved list.
///
/// Precedence: literal extraction beats contextual reuse beats rule
/// inference; any category-required field still missing becomes a
/// `prompted` placeholder the workflow must satisfy before running.
pub fn resolve_parameters(
    text: &str,
    classification: &ClassificationResult,
    snapshot: Option<&ContextSnapshot>,
) -> Vec<AdvancedParameter> {
    let mut resolved: Vec<AdvancedParameter> = Vec::new();
    fn has(resolved: &[AdvancedParameter], name: &str) -> bool {
        resolved.iter().any(|p| p.name == name)
    }

    for (name, value) in &classification.parameters {
        resolved.push(AdvancedParameter {
            name: name.clone(),
            value: Some(value.clone()),
            source: ParameterSource::Literal,
            confidence: 0.9,
            required: false,
            description: format!("extracted '{name}' from the utterance"),
        });
    }

    if let Some(snapshot) = snapshot {
        // reuse from recent same-category turns first, newest last
        for interaction in snapshot
            .recent
            .iter()
            .filter(|i| i.category == classification.category)
        {
            for (name, value) in &interaction.parameters {
                if !has(&resolved, name) && !value.is_null() {
                    resolved.push(AdvancedParameter {
                        name: name.clone(),
                        value: Some(value.clone()),
                        source: ParameterSource::Contextual,
                        confidence: 0.7,
                        required: false,
                        description: format!(
                            "reused from a previous {} command",
                            classification.category
                        ),
                    });
                }
            }
        }

        for (name, value) in &snapshot.active_parameters {
            if !has(&resolved, name) && !value.is_null() {
                resolved.push(AdvancedParameter {
                    name: name.clone(),
                    value: Some(value.clone()),
                    source: ParameterSource::Contextual,
                    confidence: 0.8,
                    required: false,
                    description: format!("active context parameter '{name}'"),
                });
            }
        }
    }

    let lowered = text.to_lowercase();
    let infer = |name: &str, table: &[(Regex, String)], confidence: f64,
                 resolved: &mut Vec<AdvancedParameter>| {
        if resolved.iter().any(|p| p.name == name) {
            return;
        }
        if let Some(value) = first_match(table, &lowered) {
            resolved.push(AdvancedParameter {
                name: name.to_string(),
                value: Some(Value::String(value)),
                source: ParameterSource::Inferred,
                confidence,
                required: false,
                description: format!("inferred '{name}' from phrasing"),
            });
        }
    };

    if matches!(
        classification.category,
        CommandCategory::Calendar | CommandCategory::Reminders
    ) {
        infer("urgency", &URGENCY, 0.6, &mut resolved);
        infer("timeframe", &TIMEFRAME, 0.6, &mut resolved);
    }
    if classification.category == CommandCategory::DocumentGeneration {
        infer("format", &DOC_FORMAT, 0.7, &mut resolved);
    }
    infer("priority", &PRIORITY, 0.6, &mut resolved);
    infer("audience", &AUDIENCE, 0.5, &mut resolved);

    for required in required_parameters(classification.category) {
        if !resolved.iter().any(|p| p.name == *required) {
            resolved.push(AdvancedParameter {
                name: required.to_string(),
                value: None,
                source: ParameterSource::Prompted,
                confidence: 0.0,
                required: true,
                description: format!("required parameter '{required}'"),
            });
        } else if let Some(p) = resolved.iter_mut().find(|p| p.name == *required) {
            p.required = true;
        }
    }

    resolved
}
