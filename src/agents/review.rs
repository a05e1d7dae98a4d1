//! Line-based static review heuristics.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::Language;

/// Longest line accepted without a warning
pub const MAX_LINE_LENGTH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Where an issue was found (1-based line; 0 for whole-file findings)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewIssue {
    pub severity: Severity,
    pub message: String,
    pub location: Location,
}

/// Outcome of a review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewReport {
    pub language: Language,

    /// Issues ordered by line
    pub issues: Vec<ReviewIssue>,

    /// True when no issue has error severity
    pub passed: bool,
}

impl ReviewReport {
    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    /// One-line summary, e.g. `passed: 0 errors, 1 warning, 2 info`
    pub fn summary(&self) -> String {
        let warnings = self.count(Severity::Warning);
        format!(
            "{}: {} error{}, {} warning{}, {} info",
            if self.passed { "passed" } else { "failed" },
            self.count(Severity::Error),
            if self.count(Severity::Error) == 1 { "" } else { "s" },
            warnings,
            if warnings == 1 { "" } else { "s" },
            self.count(Severity::Info),
        )
    }
}

/// A substring rule applied to every line
struct Rule {
    needle: &'static str,
    severity: Severity,
    message: &'static str,
}

const fn rule(needle: &'static str, severity: Severity, message: &'static str) -> Rule {
    Rule {
        needle,
        severity,
        message,
    }
}

const COMMON_RULES: &[Rule] = &[
    rule("TODO", Severity::Info, "unresolved TODO"),
    rule("FIXME", Severity::Warning, "unresolved FIXME"),
];

const PYTHON_RULES: &[Rule] = &[
    rule("eval(", Severity::Error, "use of eval"),
    rule("exec(", Severity::Error, "use of exec"),
    rule("except:", Severity::Warning, "bare except clause"),
    rule("import *", Severity::Warning, "wildcard import"),
    rule("print(", Severity::Info, "print statement left in code"),
    rule("raise NotImplementedError", Severity::Warning, "unimplemented stub"),
];

const RUST_RULES: &[Rule] = &[
    rule(".unwrap()", Severity::Warning, "unwrap may panic"),
    rule("unsafe ", Severity::Warning, "unsafe block"),
    rule("todo!(", Severity::Warning, "unimplemented stub"),
    rule("unimplemented!(", Severity::Warning, "unimplemented stub"),
    rule("println!(", Severity::Info, "print statement left in code"),
];

const SCRIPT_RULES: &[Rule] = &[
    rule("eval(", Severity::Error, "use of eval"),
    rule("var ", Severity::Warning, "use let or const instead of var"),
    rule("console.log", Severity::Info, "console output left in code"),
];

fn rules_for(language: Language) -> &'static [Rule] {
    match language {
        Language::Python => PYTHON_RULES,
        Language::Rust => RUST_RULES,
        Language::TypeScript | Language::JavaScript => SCRIPT_RULES,
        Language::Markdown | Language::Text => &[],
    }
}

/// Review `code` written in `language`
pub fn review_code(code: &str, language: Language) -> ReviewReport {
    let mut issues = Vec::new();

    if code.trim().is_empty() {
        issues.push(ReviewIssue {
            severity: Severity::Error,
            message: "no code to review".to_string(),
            location: Location { line: 0 },
        });
    }

    let rules = rules_for(language);
    let checks_layout = !matches!(language, Language::Markdown | Language::Text);

    for (index, line) in code.lines().enumerate() {
        let location = Location { line: index + 1 };
        let mut push = |severity, message: String| {
            issues.push(ReviewIssue {
                severity,
                message,
                location,
            })
        };

        for r in COMMON_RULES.iter().chain(rules) {
            if line.contains(r.needle) {
                push(r.severity, r.message.to_string());
            }
        }

        if !checks_layout {
            continue;
        }
        let length = line.chars().count();
        if length > MAX_LINE_LENGTH {
            push(
                Severity::Warning,
                format!("line too long ({} > {})", length, MAX_LINE_LENGTH),
            );
        }
        if line != line.trim_end() {
            push(Severity::Info, "trailing whitespace".to_string());
        }
        if language == Language::Python && line.starts_with('\t') {
            push(Severity::Warning, "tab indentation".to_string());
        }
    }

    let passed = !issues.iter().any(|i| i.severity == Severity::Error);
    ReviewReport {
        language,
        issues,
        passed,
    }
}
