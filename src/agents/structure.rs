//! Project layout scanning for the architect.
//!
//! A structure is a nested JSON object: directories map to objects, files
//! map to `null`. Dot-prefixed entries are skipped and only project files
//! (`.py`, `.md`, `.toml`) are listed.

use std::path::Path;

use glob::{MatchOptions, Pattern};
use serde_json::{Map, Value};
use tracing::warn;

use super::AgentError;

/// File extensions listed in a structure
pub const STRUCTURE_EXTENSIONS: &[&str] = &["py", "md", "toml"];

pub type Structure = Map<String, Value>;

/// Scan `root` recursively. A missing root yields an empty structure.
pub fn scan_structure(root: &Path) -> Result<Structure, AgentError> {
    let mut structure = Structure::new();
    if !root.is_dir() {
        return Ok(structure);
    }

    let pattern = format!("{}/**/*", Pattern::escape(&root.to_string_lossy()));
    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..Default::default()
    };
    let entries = glob::glob_with(&pattern, options)
        .map_err(|e| AgentError::InvalidInput(format!("cannot scan {}: {}", root.display(), e)))?;

    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable project entry");
                continue;
            }
        };
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() || parts.iter().any(|p| p.starts_with('.')) {
            continue;
        }

        let is_dir = path.is_dir();
        let listed = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| STRUCTURE_EXTENSIONS.contains(&e));
        if is_dir || listed {
            insert(&mut structure, &parts, is_dir);
        }
    }

    Ok(structure)
}

fn insert(structure: &mut Structure, parts: &[String], is_dir: bool) {
    let Some((name, rest)) = parts.split_first() else {
        return;
    };

    if rest.is_empty() && !is_dir {
        structure.insert(name.clone(), Value::Null);
        return;
    }

    let entry = structure
        .entry(name.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(children) = entry {
        insert(children, rest, is_dir);
    }
}

/// Number of files in a structure
pub fn count_files(structure: &Structure) -> usize {
    structure
        .values()
        .map(|v| match v {
            Value::Object(children) => count_files(children),
            _ => 1,
        })
        .sum()
}

/// Render a structure as an indented tree; directories end with `/`
pub fn render_tree(structure: &Structure) -> String {
    let mut lines = Vec::new();
    render_level(structure, "", &mut lines);
    lines.join("\n")
}

fn render_level(structure: &Structure, prefix: &str, lines: &mut Vec<String>) {
    let count = structure.len();
    for (i, (name, children)) in structure.iter().enumerate() {
        let last = i + 1 == count;
        let (branch, extension) = if last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };

        match children {
            Value::Object(children) => {
                lines.push(format!("{}{}{}/", prefix, branch, name));
                render_level(children, &format!("{}{}", prefix, extension), lines);
            }
            _ => lines.push(format!("{}{}{}", prefix, branch, name)),
        }
    }
}
