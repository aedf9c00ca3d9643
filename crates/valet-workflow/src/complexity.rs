use once_cell::sync::Lazy;
use regex::Regex;

use valet_core::config::MAX_WORKFLOW_STEPS;

use crate::types::CommandComplexity;

fn set(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static complexity pattern"))
        .collect()
}

static SEQUENTIAL: Lazy<Vec<Regex>> = Lazy::new(|| {
    set(&[
        r"\b(then|next|after|followed\s+by|and\s+then)\b",
        r"\b(first|second|third|finally)\b",
        r"\b(step\s+by\s+step|one\s+by\s+one)\b",
    ])
});
static CONDITIONAL: Lazy<Vec<Regex>> = Lazy::new(|| {
    set(&[
        r"\b(if|when|unless|provided\s+that)\b",
        r"\b(depending\s+on|based\s+on|in\s+case)\b",
    ])
});
static ITERATIVE: Lazy<Vec<Regex>> = Lazy::new(|| {
    set(&[
        r"\b(for\s+each|every|repeat)\b",
        r"\b(loop|iterate|multiple\s+times)\b",
    ])
});
static COMPOUND: Lazy<Vec<Regex>> = Lazy::new(|| {
    set(&[
        r"\b(and|also|plus|additionally)\b",
        r"\b(both|all|multiple)\b",
    ])
});

/// Qualitative shape of an utterance. Sequential markers dominate
/// conditional, which dominate iterative, which dominate compound.
pub fn analyze_complexity(text: &str) -> CommandComplexity {
    let lowered = text.to_lowercase();
    let matches = |res: &[Regex]| res.iter().any(|r| r.is_match(&lowered));

    if matches(&SEQUENTIAL) {
        CommandComplexity::Sequential
    } else if matches(&CONDITIONAL) {
        CommandComplexity::Conditional
    } else if matches(&ITERATIVE) {
        CommandComplexity::Iterative
    } else if matches(&COMPOUND) {
        CommandComplexity::Compound
    } else {
        CommandComplexity::Simple
    }
}

/// Estimated step count: a base per complexity class plus the literal
/// connective counts, capped at the workflow step budget.
pub fn estimate_steps(text: &str, complexity: CommandComplexity) -> usize {
    let base = match complexity {
        CommandComplexity::Simple => 1,
        CommandComplexity::Compound => 2,
        CommandComplexity::Sequential => 3,
        CommandComplexity::Conditional => 3,
        CommandComplexity::Iterative => 4,
    };

    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();
    let count_of = |word: &str| words.iter().filter(|w| **w == word).count();

    (base + count_of("and") + count_of("then")).min(MAX_WORKFLOW_STEPS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_markers_detected() {
        let text = "schedule a meeting with Sarah tomorrow then send the invite";
        assert_eq!(analyze_complexity(text), CommandComplexity::Sequential);
        assert!(estimate_steps(text, CommandComplexity::Sequential) >= 2);
    }

    #[test]
    fn conditional_beats_compound() {
        assert_eq!(
            analyze_complexity("if the report is ready and send it"),
            CommandComplexity::Conditional
        );
    }

    #[test]
    fn plain_commands_are_simple() {
        let text = "create a pdf report about otters";
        assert_eq!(analyze_complexity(text), CommandComplexity::Simple);
        assert_eq!(estimate_steps(text, CommandComplexity::Simple), 1);
    }

    #[test]
    fn step_estimate_caps_at_ten() {
        let text = "a and b and c and d and e and f and g and h and i and j and k";
        let complexity = analyze_complexity(text);
        assert_eq!(estimate_steps(text, complexity), 10);
    }
}
