//! Template source strategies.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob::Pattern;
use tracing::{debug, warn};

use super::{TemplateError, TemplateSource};

/// File extensions recognised as templates
pub const TEMPLATE_EXTENSIONS: &[&str] = &["j2", "tera", "tmpl"];

/// Templates held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    templates: BTreeMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template (builder style)
    pub fn with_template(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    /// Register or replace a template
    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.insert(name.into(), source.into());
    }
}

impl FromIterator<(String, String)> for MemorySource {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            templates: iter.into_iter().collect(),
        }
    }
}

impl TemplateSource for MemorySource {
    fn load(&self, name: &str) -> Result<String, TemplateError> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }

    fn names(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }
}

/// Templates found by scanning a directory.
///
/// `python/class.j2` and `python.class.j2` are both registered as
/// `python.class`. The directory is indexed eagerly; file contents are read
/// on load.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    index: BTreeMap<String, PathBuf>,
}

impl DirectorySource {
    /// Index every template file under `root`
    pub fn scan(root: impl Into<PathBuf>) -> Result<Self, TemplateError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(TemplateError::Io {
                path: root.display().to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "template directory does not exist",
                ),
            });
        }

        let mut index = BTreeMap::new();
        let escaped_root = Pattern::escape(&root.to_string_lossy());

        for ext in TEMPLATE_EXTENSIONS {
            let pattern = format!("{}/**/*.{}", escaped_root, ext);
            let entries = glob::glob(&pattern).map_err(|e| TemplateError::Io {
                path: pattern.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
            })?;

            for entry in entries {
                let path = match entry {
                    Ok(path) => path,
                    Err(e) => {
                        warn!(error = %e, "Skipping unreadable template entry");
                        continue;
                    }
                };
                if let Some(name) = template_name(&root, &path) {
                    debug!(template = %name, path = %path.display(), "Indexed template");
                    index.insert(name, path);
                }
            }
        }

        Ok(Self { root, index })
    }

    /// Directory this source was scanned from
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Dotted template name for a file below `root`
fn template_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("."))
}

impl TemplateSource for DirectorySource {
    fn load(&self, name: &str) -> Result<String, TemplateError> {
        let path = self
            .index
            .get(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;

        std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    fn names(&self) -> Vec<String> {
        self.index.keys().cloned().collect()
    }
}

/// Several sources searched in order; the first hit wins
#[derive(Clone, Default)]
pub struct LayeredSource {
    layers: Vec<Arc<dyn TemplateSource>>,
}

impl LayeredSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a lower-priority layer
    pub fn with_layer(mut self, layer: Arc<dyn TemplateSource>) -> Self {
        self.layers.push(layer);
        self
    }
}

impl TemplateSource for LayeredSource {
    fn load(&self, name: &str) -> Result<String, TemplateError> {
        for layer in &self.layers {
            match layer.load(name) {
                Err(TemplateError::NotFound(_)) => continue,
                other => return other,
            }
        }
        Err(TemplateError::NotFound(name.to_string()))
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.layers.iter().flat_map(|l| l.names()).collect();
        names.sort();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_source_lookup() {
        let source = MemorySource::new().with_template("txt.hello", "Hello {{ name }}");

        assert_eq!(source.load("txt.hello").unwrap(), "Hello {{ name }}");
        assert!(matches!(
            source.load("txt.missing"),
            Err(TemplateError::NotFound(name)) if name == "txt.missing"
        ));
    }

    #[test]
    fn test_directory_source_dotted_names() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("python")).unwrap();
        std::fs::write(temp.path().join("python/class.j2"), "class {{ class_name }}:").unwrap();
        std::fs::write(temp.path().join("markdown.readme.tera"), "# {{ title }}").unwrap();
        std::fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let source = DirectorySource::scan(temp.path()).unwrap();

        assert_eq!(source.names(), vec!["markdown.readme", "python.class"]);
        assert_eq!(source.load("python.class").unwrap(), "class {{ class_name }}:");
        assert!(source.load("notes").is_err());
    }

    #[test]
    fn test_directory_source_requires_directory() {
        let temp = TempDir::new().unwrap();
        let result = DirectorySource::scan(temp.path().join("missing"));
        assert!(matches!(result, Err(TemplateError::Io { .. })));
    }

    #[test]
    fn test_layered_source_priority() {
        let overrides = MemorySource::new().with_template("python.class", "custom");
        let defaults = MemorySource::new()
            .with_template("python.class", "default")
            .with_template("python.function", "fn");

        let layered = LayeredSource::new()
            .with_layer(Arc::new(overrides))
            .with_layer(Arc::new(defaults));

        assert_eq!(layered.load("python.class").unwrap(), "custom");
        assert_eq!(layered.load("python.function").unwrap(), "fn");
        assert!(layered.load("python.test").is_err());
        assert_eq!(layered.names(), vec!["python.class", "python.function"]);
    }
}
