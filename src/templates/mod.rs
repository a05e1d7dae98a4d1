//! Template engine adapter.
//!
//! Templates are looked up by dotted name (`python.class`) through a
//! [`TemplateSource`] and rendered with [`render`], a pure function of the
//! template text and a JSON context. Rendering uses Tera with undefined
//! variables treated as errors.

pub mod builtin;
pub mod sources;

use serde_json::Value;
use tera::Tera;
use thiserror::Error;

pub use sources::{DirectorySource, LayeredSource, MemorySource};

/// Template lookup and rendering errors
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template not found: '{0}'")]
    NotFound(String),

    #[error("Failed to render template '{name}': {message}")]
    Render { name: String, message: String },

    #[error("Failed to read template {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A place templates can be loaded from
pub trait TemplateSource: Send + Sync {
    /// Template text for `name`
    fn load(&self, name: &str) -> Result<String, TemplateError>;

    /// Every template name this source knows, sorted
    fn names(&self) -> Vec<String>;
}

/// Render template text against a context mapping.
///
/// Identical `(source, context)` pairs always produce identical output.
pub fn render(source: &str, context: &Value) -> Result<String, TemplateError> {
    render_named("<inline>", source, context)
}

/// Same as [`render`], with `name` used in error messages
pub fn render_named(name: &str, source: &str, context: &Value) -> Result<String, TemplateError> {
    let tera_context = match context {
        Value::Object(_) => {
            tera::Context::from_value(context.clone()).map_err(|e| render_error(name, &e))?
        }
        Value::Null => tera::Context::new(),
        other => {
            return Err(TemplateError::Render {
                name: name.to_string(),
                message: format!("context must be a mapping, got {}", json_type(other)),
            })
        }
    };

    Tera::one_off(source, &tera_context, false).map_err(|e| render_error(name, &e))
}

/// Flatten a Tera error chain into one message
fn render_error(name: &str, err: &tera::Error) -> TemplateError {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    TemplateError::Render {
        name: name.to_string(),
        message,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_substitutes_variables() {
        let out = render("Hello {{ name }}!", &json!({"name": "crew"})).unwrap();
        assert_eq!(out, "Hello crew!");
    }

    #[test]
    fn test_render_is_deterministic() {
        let ctx = json!({"items": ["a", "b", "c"], "sep": "-"});
        let template = "{{ items | join(sep=sep) }}";

        let first = render(template, &ctx).unwrap();
        let second = render(template, &ctx).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "a-b-c");
    }

    #[test]
    fn test_missing_variable_is_render_error() {
        let err = render_named("greeting", "Hi {{ who }}", &json!({})).unwrap_err();

        match err {
            TemplateError::Render { name, message } => {
                assert_eq!(name, "greeting");
                assert!(message.contains("who"), "message was: {}", message);
            }
            other => panic!("Expected Render error, got {:?}", other),
        }
    }

    #[test]
    fn test_non_mapping_context_rejected() {
        let err = render("{{ x }}", &json!([1, 2])).unwrap_err();
        assert!(matches!(err, TemplateError::Render { .. }));
    }

    #[test]
    fn test_null_context_renders_static_text() {
        assert_eq!(render("static", &Value::Null).unwrap(), "static");
    }
}
