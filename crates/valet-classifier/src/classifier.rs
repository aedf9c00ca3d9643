use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use valet_core::types::{ClassificationResult, CommandCategory, ContextSnapshot, Utterance};

use crate::normalize::normalize;
use crate::patterns::{extract_parameters, CATEGORY_TABLE};
use crate::similarity::SimilarityScorer;
use crate::suggest::generate_suggestions;

const PATTERN_WEIGHT: f64 = 0.6;
const SIMILARITY_WEIGHT: f64 = 0.4;
const PATTERN_MATCH_SCORE: f64 = 0.8;
const CONTEXT_BOOST: f64 = 0.1;
const UNKNOWN_FLOOR: f64 = 0.3;
const SUGGESTION_THRESHOLD: f64 = 0.5;

/// Classifies one utterance into a `(category, intent, parameters,
/// confidence)` tuple. Pure on its inputs plus the injected context
/// snapshot; deterministic for identical inputs.
pub struct IntentClassifier {
    scorer: Box<dyn SimilarityScorer>,
    total: AtomicU64,
    total_micros: AtomicU64,
}

impl IntentClassifier {
    pub fn new(scorer: Box<dyn SimilarityScorer>) -> Self {
        info!(backend = scorer.name(), "intent classifier ready");
        Self {
            scorer,
            total: AtomicU64::new(0),
            total_micros: AtomicU64::new(0),
        }
    }

    pub fn classify(
        &self,
        utterance: &Utterance,
        snapshot: Option<&ContextSnapshot>,
    ) -> ClassificationResult {
        let started = Instant::now();
        let normalized = normalize(&utterance.text);
        let preprocessing_ms = started.elapsed().as_secs_f64() * 1000.0;

        let scoring_started = Instant::now();
        let mut best_category = CommandCategory::Unknown;
        let mut best_confidence = 0.0_f64;

        for entry in CATEGORY_TABLE.iter() {
            let pattern_score = if entry.triggers.iter().any(|t| t.is_match(&normalized)) {
                PATTERN_MATCH_SCORE
            } else {
                0.0
            };
            let similarity = self.scorer.score(&normalized, entry.category);

            let mut combined =
                pattern_score * PATTERN_WEIGHT + similarity * SIMILARITY_WEIGHT;

            // continuity boost when the conversation was already on this
            // category
            if utterance.use_context {
                if let Some(snapshot) = snapshot {
                    if snapshot.last_category == Some(entry.category) {
                        combined += CONTEXT_BOOST;
                    }
                }
            }

            // strict comparison keeps declaration order as the tie-break
            if combined > best_confidence {
                best_confidence = combined;
                best_category = entry.category;
            }
        }

        if best_confidence < UNKNOWN_FLOOR {
            best_category = CommandCategory::Unknown;
        }

        let parameters = if best_category == CommandCategory::Unknown {
            Default::default()
        } else {
            extract_parameters(&normalized, best_category)
        };

        let suggestions = if best_confidence < SUGGESTION_THRESHOLD {
            generate_suggestions(&normalized)
        } else {
            Vec::new()
        };

        let classification_ms = scoring_started.elapsed().as_secs_f64() * 1000.0;
        self.total.fetch_add(1, Ordering::Relaxed);
        self.total_micros.fetch_add(
            started.elapsed().as_micros() as u64,
            Ordering::Relaxed,
        );

        debug!(
            category = %best_category,
            confidence = best_confidence,
            "classified utterance"
        );

        ClassificationResult {
            category: best_category,
            intent: best_category.intent(),
            confidence: best_confidence,
            parameters,
            raw_text: utterance.text.clone(),
            normalized_text: normalized,
            context_used: utterance.use_context,
            preprocessing_ms,
            classification_ms,
            suggestions,
        }
    }

    pub fn metrics(&self) -> ClassifierMetrics {
        let total = self.total.load(Ordering::Relaxed);
        let micros = self.total_micros.load(Ordering::Relaxed);
        ClassifierMetrics {
            total_classifications: total,
            average_ms: if total > 0 {
                micros as f64 / total as f64 / 1000.0
            } else {
                0.0
            },
            backend: self.scorer.name(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassifierMetrics {
    pub total_classifications: u64,
    pub average_ms: f64,
    pub backend: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::CosineScorer;
    use std::collections::HashMap;

    fn classifier() -> IntentClassifier {
        IntentClassifier::new(Box::new(CosineScorer::fit()))
    }

    fn utterance(text: &str) -> Utterance {
        Utterance {
            text: text.to_string(),
            user_id: "u1".into(),
            session_id: "s1".into(),
            use_context: true,
            parameters: HashMap::new(),
        }
    }

    #[test]
    fn pdf_report_classifies_as_document_generation() {
        let result = classifier().classify(
            &utterance("create a PDF report about machine learning"),
            None,
        );
        assert_eq!(result.category, CommandCategory::DocumentGeneration);
        assert!(result.confidence >= 0.7, "confidence {}", result.confidence);
        assert_eq!(
            result.parameters.get("format").and_then(|v| v.as_str()),
            Some("pdf")
        );
        assert_eq!(
            result.parameters.get("content_topic").and_then(|v| v.as_str()),
            Some("machine learning")
        );
        assert!(result.suggestions.is_empty());
    }

    #[test]
    fn email_with_recipient_classifies_as_email() {
        let result = classifier().classify(
            &utterance("send an email to alice@example.com about the launch"),
            None,
        );
        assert_eq!(result.category, CommandCategory::Email);
        assert!(result.confidence >= 0.7, "confidence {}", result.confidence);
        assert_eq!(
            result.parameters.get("recipient").and_then(|v| v.as_str()),
            Some("alice@example.com")
        );
        assert_eq!(
            result.parameters.get("subject").and_then(|v| v.as_str()),
            Some("the launch")
        );
    }

    #[test]
    fn gibberish_is_unknown_with_three_suggestions() {
        let result = classifier().classify(&utterance("xyz blarg zxc"), None);
        assert_eq!(result.category, CommandCategory::Unknown);
        assert!(result.confidence < 0.3);
        assert!(result.requires_confirmation());
        assert_eq!(result.suggestions.len(), 3);
    }

    #[test]
    fn empty_text_scores_zero_and_suggests() {
        // classification itself never fails: both a literally empty string
        // and one that collapses to nothing score zero everywhere
        for text in ["", "um uh"] {
            let result = classifier().classify(&utterance(text), None);
            assert_eq!(result.category, CommandCategory::Unknown);
            assert_eq!(result.confidence, 0.0);
            assert!(!result.suggestions.is_empty());
        }
    }

    #[test]
    fn context_boost_applies_to_last_category() {
        let c = classifier();
        let snapshot = ContextSnapshot {
            last_category: Some(CommandCategory::Email),
            ..Default::default()
        };
        // ambiguous text: boost should tip it toward the prior category
        let without = c.classify(&utterance("send another one to bob@example.com"), None);
        let with = c.classify(
            &utterance("send another one to bob@example.com"),
            Some(&snapshot),
        );
        assert!(with.confidence >= without.confidence);
        assert_eq!(with.category, CommandCategory::Email);
    }

    #[test]
    fn classification_is_deterministic() {
        let c = classifier();
        let a = c.classify(&utterance("schedule a meeting with the team"), None);
        let b = c.classify(&utterance("schedule a meeting with the team"), None);
        assert_eq!(a.category, b.category);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.parameters, b.parameters);
    }

    #[test]
    fn suggestions_present_iff_low_confidence() {
        let c = classifier();
        let high = c.classify(&utterance("send an email to x@y.com about hi"), None);
        assert!(high.confidence >= 0.5);
        assert!(high.suggestions.is_empty());

        let low = c.classify(&utterance("qwerty asdf"), None);
        assert!(low.confidence < 0.5);
        assert!(!low.suggestions.is_empty());
    }

    #[test]
    fn metrics_accumulate() {
        let c = classifier();
        c.classify(&utterance("hello there"), None);
        c.classify(&utterance("hello there"), None);
        let m = c.metrics();
        assert_eq!(m.total_classifications, 2);
    }
}
