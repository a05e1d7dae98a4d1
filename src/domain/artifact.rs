//! Generated code artifacts.
//!
//! An artifact is a named unit of generated code or documentation. Its
//! content never changes after creation; downstream agents may only add
//! metadata annotations (e.g. review findings).

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::storage::{hash_content, write_atomic, WriteError};

/// Errors raised when placing an artifact on disk
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Invalid artifact name: '{0}'")]
    InvalidName(String),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// A generated unit of code or documentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Artifact name, unique within a run (dots denote nesting)
    pub name: String,

    /// Generated text
    pub content: String,

    /// What kind of unit this is
    pub kind: ArtifactKind,

    /// Language of the content
    pub language: Language,

    /// Free-form annotations (generator info, review findings, ...)
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,

    /// When the artifact was created
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Create a new artifact
    pub fn new(
        name: impl Into<String>,
        content: impl Into<String>,
        kind: ArtifactKind,
        language: Language,
    ) -> Self {
        let content = content.into();
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "content_sha256".to_string(),
            Value::String(hash_content(&content)),
        );
        Self {
            name: name.into(),
            content,
            kind,
            language,
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Add or replace an annotation
    pub fn annotate(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Size of the content in bytes
    pub fn size_bytes(&self) -> u64 {
        self.content.len() as u64
    }

    /// Path relative to an output root: `{kind_subdir}/{name}.{ext}`.
    ///
    /// Dotted names become nested directories (`pkg.util` -> `src/pkg/util.py`).
    pub fn relative_path(&self) -> Result<PathBuf, ArtifactError> {
        let segments: Vec<&str> = self.name.split('.').collect();
        let valid = segments
            .iter()
            .all(|s| !s.is_empty() && !s.contains(['/', '\\']));
        if !valid {
            return Err(ArtifactError::InvalidName(self.name.clone()));
        }

        let mut path = PathBuf::from(self.kind.subdir());
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| ArtifactError::InvalidName(self.name.clone()))?;
        for segment in parents {
            path.push(segment);
        }
        path.push(format!("{}.{}", last, self.language.extension()));
        Ok(path)
    }

    /// Persist the artifact under `base_path` and return the written path.
    ///
    /// Refuses to replace an existing file unless `overwrite` is set.
    pub fn save(&self, base_path: &Path, overwrite: bool) -> Result<PathBuf, ArtifactError> {
        let path = base_path.join(self.relative_path()?);
        write_atomic(&path, &self.content, overwrite)?;
        info!(artifact = %self.name, kind = %self.kind, path = %path.display(), "Saved artifact");
        Ok(path)
    }
}

/// Kinds of generated units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Module,
    Class,
    Function,
    Test,
    Doc,
}

impl ArtifactKind {
    /// Output subdirectory for this kind
    pub fn subdir(&self) -> &'static str {
        match self {
            Self::Module | Self::Class | Self::Function => "src",
            Self::Test => "tests",
            Self::Doc => "docs",
        }
    }

    /// Infer the kind from the last segment of a dotted template name
    /// (`python.class` -> Class). Unknown names map to Module.
    pub fn from_template_name(template_name: &str) -> Self {
        let leaf = template_name.rsplit('.').next().unwrap_or_default();
        match leaf {
            "class" => Self::Class,
            "function" => Self::Function,
            "test" => Self::Test,
            _ if template_name.starts_with("markdown.") => Self::Doc,
            _ => Self::Module,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Module => "module",
            Self::Class => "class",
            Self::Function => "function",
            Self::Test => "test",
            Self::Doc => "doc",
        };
        f.write_str(s)
    }
}

/// Languages the generator knows how to place on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Python,
    Rust,
    #[serde(rename = "typescript")]
    TypeScript,
    #[serde(rename = "javascript")]
    JavaScript,
    Markdown,
    Text,
}

impl Default for Language {
    fn default() -> Self {
        Self::Python
    }
}

impl Language {
    /// File extension (without the dot)
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Python => "py",
            Self::Rust => "rs",
            Self::TypeScript => "ts",
            Self::JavaScript => "js",
            Self::Markdown => "md",
            Self::Text => "txt",
        }
    }

    /// Parse a language from a name or common extension
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Some(Self::Python),
            "rust" | "rs" => Some(Self::Rust),
            "typescript" | "ts" => Some(Self::TypeScript),
            "javascript" | "js" => Some(Self::JavaScript),
            "markdown" | "md" => Some(Self::Markdown),
            "text" | "txt" => Some(Self::Text),
            _ => None,
        }
    }

    /// Infer the language from the first segment of a dotted template name
    pub fn from_template_name(template_name: &str) -> Self {
        template_name
            .split('.')
            .next()
            .and_then(Self::from_name)
            .unwrap_or(Self::Text)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Python => "python",
            Self::Rust => "rust",
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Markdown => "markdown",
            Self::Text => "text",
        };
        f.write_str(s)
    }
}
