//! Requirement analysis heuristics.
//!
//! Turns free-form requirement text into a fixed-shape [`Requirements`]
//! record. The extraction is keyword based and deterministic.

use serde::{Deserialize, Serialize};

/// Structured requirements
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    /// The original text
    pub text: String,

    /// First sentence of the text
    pub summary: String,

    /// Domain nouns mentioned in the text
    pub entities: Vec<String>,

    /// Functional areas the system needs
    pub components: Vec<String>,

    /// Technologies mentioned in the text
    pub dependencies: Vec<String>,

    /// Hard rules ("must", "never", ...)
    pub constraints: Vec<String>,

    /// Observable outcomes to check against
    pub acceptance_criteria: Vec<String>,
}

/// Component name and the keywords that imply it
const COMPONENT_KEYWORDS: &[(&str, &[&str])] = &[
    ("api", &["api", "endpoint", "http", "rest", "request", "server"]),
    ("storage", &["database", "db", "store", "storage", "persist", "save", "cache"]),
    ("cli", &["cli", "command", "terminal", "shell"]),
    ("ui", &["ui", "interface", "page", "frontend", "screen", "form"]),
    ("auth", &["auth", "login", "password", "user", "users", "permission"]),
    ("core_logic", &["function", "compute", "calculate", "algorithm", "logic", "process"]),
    ("reporting", &["report", "export", "summary", "chart"]),
];

const TECHNOLOGIES: &[&str] = &[
    "python", "rust", "typescript", "javascript", "flask", "django", "fastapi", "react",
    "postgres", "postgresql", "mysql", "sqlite", "redis", "docker", "kafka", "graphql",
];

const CONSTRAINT_MARKERS: &[&str] = &["must", "shall", "never", "cannot", "only", "at most", "at least", "within"];

const ACCEPTANCE_MARKERS: &[&str] = &["should", "returns", "return", "given", "when", "expect", "produces"];

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "that", "this", "which", "new", "simple", "small", "function", "method",
    "class", "module", "program", "script", "system", "tool",
];

/// Extract structured requirements from free-form text
pub fn analyze_requirements(text: &str) -> Requirements {
    let sentences = split_sentences(text);
    let words = tokenize(text);

    let summary = sentences.first().cloned().unwrap_or_default();

    let constraints: Vec<String> = sentences
        .iter()
        .filter(|s| contains_marker(s, CONSTRAINT_MARKERS))
        .cloned()
        .collect();

    let mut acceptance_criteria: Vec<String> = sentences
        .iter()
        .filter(|s| contains_marker(s, ACCEPTANCE_MARKERS))
        .cloned()
        .collect();
    if acceptance_criteria.is_empty() && !summary.is_empty() {
        acceptance_criteria.push(format!("{} works as described", summary));
    }

    let mut components: Vec<String> = COMPONENT_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| words.iter().any(|w| w == k)))
        .map(|(name, _)| name.to_string())
        .collect();
    if components.is_empty() && !words.is_empty() {
        components.push("core_logic".to_string());
    }

    let dependencies: Vec<String> = TECHNOLOGIES
        .iter()
        .filter(|tech| words.iter().any(|w| w == *tech))
        .map(|tech| tech.to_string())
        .collect();

    Requirements {
        text: text.trim().to_string(),
        summary,
        entities: extract_entities(&words),
        components,
        dependencies,
        constraints,
        acceptance_criteria,
    }
}

fn split_sentences(text: &str) -> Vec<String> {
    text.split(['.', '\n', ';', '!', '?'])
        .map(|s| s.trim().trim_start_matches(['-', '*']).trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lowercase alphanumeric words, in order
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn contains_marker(sentence: &str, markers: &[&str]) -> bool {
    let lower = format!(" {} ", sentence.to_lowercase());
    markers.iter().any(|m| lower.contains(&format!(" {} ", m)))
}

/// Nouns introduced by an article ("a factorial function" -> "factorial")
fn extract_entities(words: &[String]) -> Vec<String> {
    let mut entities: Vec<String> = Vec::new();
    for pair in words.windows(2) {
        let (article, candidate) = (&pair[0], &pair[1]);
        if !matches!(article.as_str(), "a" | "an" | "the" | "each" | "every") {
            continue;
        }
        if STOPWORDS.contains(&candidate.as_str()) || candidate.chars().all(|c| c.is_numeric()) {
            continue;
        }
        if !entities.contains(candidate) {
            entities.push(candidate.clone());
        }
    }
    entities
}

/// Whether `text` mentions `word` as a whole word (case-insensitive)
pub fn mentions(text: &str, word: &str) -> bool {
    tokenize(text).iter().any(|w| w == word)
}
