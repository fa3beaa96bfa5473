//! Keyword-rule query classification.
//!
//! Every rule is a pure function over the query text and a fixed word list so
//! each can be tested on its own. Translation is handled by the orchestrator
//! before these run.
use serde::Serialize;

use docqa_core::config::RetrievalSettings;

pub const COMPARISON_KEYWORDS: &[&str] = &[
    "vs", "versus", "compare", "compared", "comparing", "comparison", "contrast", "better", "worse",
    "stronger", "weaker",
];

pub const COMPARISON_PHRASES: &[&[&str]] = &[
    &["difference", "between"],
    &["differences", "between"],
    &["who", "has"],
    &["which", "one"],
    &["more", "experienced"],
    &["less", "experienced"],
];

pub const RESUME_KEYWORDS: &[&str] = &[
    "resume", "resumes", "cv", "cvs", "experience", "skills", "background", "qualification",
    "qualifications", "candidate", "candidates", "education",
];

pub const VISUAL_KEYWORDS: &[&str] = &[
    "show", "graph", "graphs", "diagram", "diagrams", "chart", "charts", "figure", "figures", "plot",
    "plots", "image", "images", "picture", "pictures", "photo", "photos", "visual", "visualize",
    "illustration", "screenshot",
];

pub const NEGATION_TOKENS: &[&str] = &[
    "no", "not", "without", "don't", "dont", "never", "none", "exclude", "excluding", "skip",
    "avoid", "stop",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VisualIntent {
    /// No visual keyword in the query.
    None,
    Requested,
    /// A visual keyword was negated. Downstream must not emit images.
    Suppressed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryIntent {
    pub is_comparison: bool,
    pub is_visual: bool,
    pub visual_suppressed: bool,
    pub is_resume_scoped: bool,
    pub needs_translation: bool,
    pub entities: Vec<String>,
}

impl QueryIntent {
    /// Multi-entity retrieval needs a comparison and something to compare.
    pub fn wants_multi_entity(&self) -> bool {
        self.is_comparison && (!self.entities.is_empty() || self.is_resume_scoped)
    }
}

/// Classifies `query` without translation.
pub fn classify(query: &str, settings: &RetrievalSettings) -> QueryIntent {
    let visual = visual_intent(query, settings.negation_window);
    QueryIntent {
        is_comparison: is_comparison(query),
        is_visual: visual == VisualIntent::Requested,
        visual_suppressed: visual == VisualIntent::Suppressed,
        is_resume_scoped: is_resume_scoped(query),
        needs_translation: needs_translation(query),
        entities: extract_entities(query, &settings.entity_stopwords),
    }
}

/// Lowercased words with surrounding punctuation removed; inner apostrophes survive (`don't`).
pub fn normalized_tokens(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn contains_phrase(tokens: &[String], phrase: &[&str]) -> bool {
    !phrase.is_empty() && tokens.windows(phrase.len()).any(|w| w.iter().zip(phrase).all(|(a, b)| a == b))
}

pub fn is_comparison(query: &str) -> bool {
    let tokens = normalized_tokens(query);
    tokens.iter().any(|t| COMPARISON_KEYWORDS.contains(&t.as_str()))
        || COMPARISON_PHRASES.iter().any(|p| contains_phrase(&tokens, p))
}

pub fn is_resume_scoped(query: &str) -> bool {
    normalized_tokens(query).iter().any(|t| RESUME_KEYWORDS.contains(&t.as_str()))
}

pub fn needs_translation(query: &str) -> bool {
    !query.is_ascii()
}

fn is_negation(token: &str) -> bool {
    NEGATION_TOKENS.contains(&token)
}

/// Any visual keyword with a negation among the `window` tokens before it
/// suppresses visual intent for the whole query.
pub fn visual_intent(query: &str, window: usize) -> VisualIntent {
    let tokens = normalized_tokens(query);
    let mut requested = false;
    for (i, token) in tokens.iter().enumerate() {
        if !VISUAL_KEYWORDS.contains(&token.as_str()) {
            continue;
        }
        let start = i.saturating_sub(window);
        if tokens[start..i].iter().any(|t| is_negation(t)) {
            return VisualIntent::Suppressed;
        }
        requested = true;
    }
    if requested { VisualIntent::Requested } else { VisualIntent::None }
}

/// Capitalized words longer than two characters that are not boilerplate, in query order.
pub fn extract_entities(query: &str, stopwords: &[String]) -> Vec<String> {
    query
        .split_whitespace()
        .map(|w| {
            let w = w.trim_matches(|c: char| !c.is_alphanumeric());
            w.strip_suffix("'s").or_else(|| w.strip_suffix("’s")).unwrap_or(w)
        })
        .filter(|w| w.chars().count() > 2)
        .filter(|w| w.chars().next().is_some_and(char::is_uppercase))
        .filter(|w| {
            let lower = w.to_lowercase();
            !stopwords.iter().any(|s| s.eq_ignore_ascii_case(&lower))
        })
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RetrievalSettings { RetrievalSettings::default() }

    #[test]
    fn comparison_keywords_and_phrases() {
        assert!(is_comparison("Compare Alice and Bob"));
        assert!(is_comparison("Alice vs. Bob"));
        assert!(is_comparison("what is the difference between TCP and UDP"));
        assert!(is_comparison("Who has more Python experience?"));
        assert!(!is_comparison("Summarize the canvas report"));
        assert!(!is_comparison("who wrote this"));
    }

    #[test]
    fn resume_scope() {
        assert!(is_resume_scoped("Compare their CV"));
        assert!(is_resume_scoped("list candidate skills"));
        assert!(!is_resume_scoped("quarterly sales figures"));
    }

    #[test]
    fn visual_negation_suppresses() {
        assert_eq!(visual_intent("graph of sales, no image please", 3), VisualIntent::Suppressed);
        assert_eq!(visual_intent("show me the sales graph", 3), VisualIntent::Requested);
        assert_eq!(visual_intent("explain the sales numbers", 3), VisualIntent::None);
        assert_eq!(visual_intent("please do not include a diagram", 3), VisualIntent::Suppressed);
        assert_eq!(visual_intent("without any charts", 3), VisualIntent::Suppressed);
    }

    #[test]
    fn negation_outside_window_is_ignored() {
        assert_eq!(visual_intent("no worries, I would really like a diagram", 3), VisualIntent::Requested);
    }

    #[test]
    fn classify_sets_visual_flags() {
        let i = classify("graph of sales, no image please", &settings());
        assert!(!i.is_visual);
        assert!(i.visual_suppressed);
        let i = classify("show me the sales graph", &settings());
        assert!(i.is_visual);
        assert!(!i.visual_suppressed);
    }

    #[test]
    fn entities_keep_order_and_duplicates() {
        let e = extract_entities("Compare Alice, Bob and Alice's resume", &settings().entity_stopwords);
        assert_eq!(e, vec!["Alice", "Bob", "Alice"]);
    }

    #[test]
    fn entities_skip_short_and_lowercase_words() {
        let e = extract_entities("Is Al better than bob at Rust?", &settings().entity_stopwords);
        assert_eq!(e, vec!["Rust"]);
    }

    #[test]
    fn routing_requires_comparison_and_targets() {
        let i = classify("Compare Alice and Bob experience", &settings());
        assert!(i.wants_multi_entity());
        assert_eq!(i.entities, vec!["Alice", "Bob"]);
        let i = classify("compare the two resumes", &settings());
        assert!(i.entities.is_empty());
        assert!(i.wants_multi_entity());
        let i = classify("compare apples and oranges", &settings());
        assert!(!i.wants_multi_entity());
    }

    #[test]
    fn non_ascii_needs_translation() {
        assert!(needs_translation("¿Quién tiene más experiencia?"));
        assert!(!needs_translation("who has more experience"));
    }
}
