use std::collections::HashMap;

use valet_core::types::CommandCategory;

use crate::normalize::tokenize;
use crate::patterns::CATEGORY_TABLE;

/// Similarity backend seam. The classifier only depends on this contract,
/// so a degraded deployment can swap in [`PatternOnlyScorer`] without
/// changing the classification pipeline.
pub trait SimilarityScorer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Similarity of `text` to `category`, in [0, 1].
    fn score(&self, text: &str, category: CommandCategory) -> f64;
}

/// Bag-of-weights cosine similarity, pre-fit on the category exemplars.
///
/// Each category gets a token-count centroid over its exemplar list; an
/// utterance is scored as the cosine between its binary token vector and
/// that centroid.
pub struct CosineScorer {
    centroids: HashMap<CommandCategory, Centroid>,
}

struct Centroid {
    weights: HashMap<String, f64>,
    norm: f64,
}

impl CosineScorer {
    pub fn fit() -> Self {
        let mut centroids = HashMap::new();
        for entry in CATEGORY_TABLE.iter() {
            let mut weights: HashMap<String, f64> = HashMap::new();
            for exemplar in entry.exemplars {
                for token in tokenize(exemplar) {
                    *weights.entry(token).or_insert(0.0) += 1.0;
                }
            }
            let norm = weights.values().map(|w| w * w).sum::<f64>().sqrt();
            centroids.insert(entry.category, Centroid { weights, norm });
        }
        Self { centroids }
    }
}

impl SimilarityScorer for CosineScorer {
    fn name(&self) -> &'static str {
        "cosine"
    }

    fn score(&self, text: &str, category: CommandCategory) -> f64 {
        let Some(centroid) = self.centroids.get(&category) else {
            return 0.0;
        };
        if centroid.norm == 0.0 {
            return 0.0;
        }

        let tokens = tokenize(text);
        if tokens.is_empty() {
            return 0.0;
        }

        let dot: f64 = tokens
            .iter()
            .map(|t| centroid.weights.get(t).copied().unwrap_or(0.0))
            .sum();
        let text_norm = (tokens.len() as f64).sqrt();

        (dot / (centroid.norm * text_norm)).clamp(0.0, 1.0)
    }
}

/// Degraded-mode backend: contributes nothing, leaving classification to
/// the pattern signal alone. Keeps the classifier contract intact when the
/// similarity model cannot be loaded.
pub struct PatternOnlyScorer;

impl SimilarityScorer for PatternOnlyScorer {
    fn name(&self) -> &'static str {
        "pattern-only"
    }

    fn score(&self, _text: &str, _category: CommandCategory) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exemplar_scores_near_one_for_own_category() {
        let scorer = CosineScorer::fit();
        let s = scorer.score("search for python tutorials", CommandCategory::WebSearch);
        assert!(s > 0.6, "got {s}");
    }

    #[test]
    fn unrelated_text_scores_low() {
        let scorer = CosineScorer::fit();
        let s = scorer.score("xyz blarg zxc", CommandCategory::Email);
        assert!(s < 0.1, "got {s}");
    }

    #[test]
    fn empty_text_scores_zero_everywhere() {
        let scorer = CosineScorer::fit();
        for category in CommandCategory::scorable() {
            assert_eq!(scorer.score("", category), 0.0);
        }
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let scorer = CosineScorer::fit();
        for entry in crate::patterns::CATEGORY_TABLE.iter() {
            for exemplar in entry.exemplars {
                let s = scorer.score(exemplar, entry.category);
                assert!((0.0..=1.0).contains(&s));
            }
        }
    }
}
