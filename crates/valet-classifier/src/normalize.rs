use once_cell::sync::Lazy;
use regex::Regex;

/// Hesitations and discourse fillers stripped before scoring.
const FILLER_WORDS: &[&str] = &[
    "um",
    "uh",
    "ah",
    "like",
    "you know",
    "well",
    "so",
    "actually",
    "basically",
    "totally",
    "literally",
    "right",
    "okay",
    "alright",
];

/// Contraction expansions, applied in order. The generic suffix rules come
/// after the full-word forms so "won't" does not degrade to "wo not".
const CONTRACTIONS: &[(&str, &str)] = &[
    ("won't", "will not"),
    ("can't", "cannot"),
    ("it's", "it is"),
    ("that's", "that is"),
    ("n't", " not"),
    ("'re", " are"),
    ("'ve", " have"),
    ("'ll", " will"),
    ("'d", " would"),
    ("'m", " am"),
];

static FILLER_RE: Lazy<Vec<Regex>> = Lazy::new(|| {
    FILLER_WORDS
        .iter()
        .map(|w| Regex::new(&format!(r"\b{}\b", regex::escape(w))).expect("static filler pattern"))
        .collect()
});

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static pattern"));

/// Normalize an utterance for scoring: lowercase, strip fillers, expand
/// contractions, collapse whitespace. Never fails; an input of pure filler
/// collapses to the empty string and scores zero everywhere.
pub fn normalize(text: &str) -> String {
    let mut text = text.to_lowercase();

    for re in FILLER_RE.iter() {
        text = re.replace_all(&text, "").into_owned();
    }

    for (contraction, expansion) in CONTRACTIONS {
        text = text.replace(contraction, expansion);
    }

    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

/// Whitespace tokenizer shared by the similarity scorer and suggestions.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|t| {
            t.trim_matches(|c: char| !(c.is_alphanumeric() || c == '@' || c == '.'))
                .to_string()
        })
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fillers_and_collapses_whitespace() {
        assert_eq!(normalize("um well   create a document"), "create a document");
        assert_eq!(normalize("CREATE  A  Document"), "create a document");
    }

    #[test]
    fn expands_contractions() {
        assert_eq!(normalize("I can't do it"), "i cannot do it");
        assert_eq!(normalize("won't work"), "will not work");
        assert_eq!(normalize("don't forget"), "do not forget");
    }

    #[test]
    fn pure_filler_collapses_to_empty() {
        assert_eq!(normalize("um uh well okay"), "");
    }

    #[test]
    fn tokenizer_keeps_emails_whole() {
        let tokens = tokenize("send to alice@example.com now!");
        assert_eq!(tokens, vec!["send", "to", "alice@example.com", "now"]);
    }
}
