use valet_core::types::CommandCategory;

use crate::types::CommandComplexity;

/// One step of a predefined workflow plan: the tool command to run and
/// the category that routes it to a tool.
pub struct TemplateStep {
    pub command: &'static str,
    pub category: CommandCategory,
}

pub struct WorkflowTemplate {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub complexity: CommandComplexity,
    pub steps: &'static [TemplateStep],
}

/// Fixed template catalog. Step commands are drawn from the tool bank's
/// declared capability sets so every instantiated step is dispatchable.
pub const TEMPLATES: &[WorkflowTemplate] = &[
    WorkflowTemplate {
        name: "document-creation",
        keywords: &["create document", "generate report", "write document"],
        complexity: CommandComplexity::Sequential,
        steps: &[
            TemplateStep {
                command: "knowledge_query",
                category: CommandCategory::WebSearch,
            },
            TemplateStep {
                command: "chat",
                category: CommandCategory::GeneralConversation,
            },
            TemplateStep {
                command: "generate_pdf",
                category: CommandCategory::DocumentGeneration,
            },
        ],
    },
    WorkflowTemplate {
        name: "email-campaign",
        keywords: &["email campaign", "send emails", "mass email"],
        complexity: CommandComplexity::Sequential,
        steps: &[
            TemplateStep {
                command: "chat",
                category: CommandCategory::GeneralConversation,
            },
            TemplateStep {
                command: "compose_email",
                category: CommandCategory::Email,
            },
            TemplateStep {
                command: "send_email",
                category: CommandCategory::Email,
            },
        ],
    },
    WorkflowTemplate {
        name: "meeting-coordination",
        keywords: &["schedule meeting", "coordinate meeting", "organize meeting"],
        complexity: CommandComplexity::Sequential,
        steps: &[
            TemplateStep {
                command: "chat",
                category: CommandCategory::Calendar,
            },
            TemplateStep {
                command: "compose_email",
                category: CommandCategory::Email,
            },
            TemplateStep {
                command: "send_email",
                category: CommandCategory::Email,
            },
        ],
    },
    WorkflowTemplate {
        name: "research-compilation",
        keywords: &["research", "compile information", "gather data"],
        complexity: CommandComplexity::Sequential,
        steps: &[
            TemplateStep {
                command: "web_search",
                category: CommandCategory::WebSearch,
            },
            TemplateStep {
                command: "knowledge_query",
                category: CommandCategory::WebSearch,
            },
            TemplateStep {
                command: "chat",
                category: CommandCategory::GeneralConversation,
            },
            TemplateStep {
                command: "generate_markdown",
                category: CommandCategory::DocumentGeneration,
            },
        ],
    },
];

/// Keyword match against the template catalog. First match wins.
pub fn match_template(text: &str) -> Option<&'static WorkflowTemplate> {
    let lowered = text.to_lowercase();
    TEMPLATES
        .iter()
        .find(|t| t.keywords.iter().any(|k| lowered.contains(k)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_select_templates() {
        assert_eq!(
            match_template("please research quantum batteries").unwrap().name,
            "research-compilation"
        );
        assert_eq!(
            match_template("start an email campaign for the launch").unwrap().name,
            "email-campaign"
        );
        assert!(match_template("what time is it").is_none());
    }

    #[test]
    fn template_steps_stay_within_budget() {
        for template in TEMPLATES {
            assert!(template.steps.len() <= valet_core::config::MAX_WORKFLOW_STEPS);
            assert!(!template.steps.is_empty());
        }
    }
}
