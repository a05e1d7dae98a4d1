//! Code generator.
//!
//! Two paths produce [`Artifact`]s:
//! - [`CodeGenerator::generate_module`] assembles Python source directly from
//!   function/class descriptors, without the template engine.
//! - [`CodeGenerator::generate_from_template`] renders a named template
//!   through the injected [`TemplateSource`].

pub mod descriptors;
pub mod python;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::domain::{Artifact, ArtifactKind, Language};
use crate::error::ErrorKind;
use crate::templates::{self, builtin::builtin_source, TemplateError, TemplateSource};

pub use descriptors::{ClassDescriptor, FunctionDescriptor, FunctionSummary, ModuleSpec};

/// Code generation errors
#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl CodegenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDescriptor(_) => ErrorKind::InvalidDescriptor,
            Self::Template(TemplateError::NotFound(_)) => ErrorKind::TemplateNotFound,
            Self::Template(TemplateError::Render { .. }) => ErrorKind::TemplateRender,
            Self::Template(TemplateError::Io { .. }) => ErrorKind::Io,
        }
    }
}

/// Builds artifacts from descriptors or templates
#[derive(Clone)]
pub struct CodeGenerator {
    templates: Arc<dyn TemplateSource>,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl CodeGenerator {
    /// Create a generator backed by `templates`
    pub fn new(templates: Arc<dyn TemplateSource>) -> Self {
        Self { templates }
    }

    /// Create a generator with only the built-in templates
    pub fn with_builtins() -> Self {
        Self::new(Arc::new(builtin_source()))
    }

    /// The template source in use
    pub fn templates(&self) -> &Arc<dyn TemplateSource> {
        &self.templates
    }

    /// Every template name the generator can render
    pub fn template_names(&self) -> Vec<String> {
        self.templates.names()
    }

    /// Assemble a Python module from descriptors.
    ///
    /// Declaration order is preserved. Empty, malformed or duplicated names
    /// fail with [`CodegenError::InvalidDescriptor`].
    #[instrument(skip(self, spec), fields(module = %spec.name))]
    pub fn generate_module(&self, spec: &ModuleSpec) -> Result<Artifact, CodegenError> {
        spec.validate()?;

        let content = python::emit_module(spec);
        let function_names: Vec<Value> = spec
            .functions
            .iter()
            .map(|f| Value::String(f.name.clone()))
            .collect();
        let class_names: Vec<Value> = spec
            .classes
            .iter()
            .map(|c| Value::String(c.name.clone()))
            .collect();

        debug!(
            functions = spec.functions.len(),
            classes = spec.classes.len(),
            "Generated module"
        );

        Ok(
            Artifact::new(&spec.name, content, ArtifactKind::Module, Language::Python)
                .with_metadata("generator", "structural")
                .with_metadata("functions", function_names)
                .with_metadata("classes", class_names),
        )
    }

    /// Render template `template_name` against `context` into an artifact
    /// called `name`. Kind and language are inferred from the template name.
    #[instrument(skip(self, context))]
    pub fn generate_from_template(
        &self,
        template_name: &str,
        context: &Value,
        name: &str,
    ) -> Result<Artifact, CodegenError> {
        let source = self.templates.load(template_name)?;
        debug!(bytes = source.len(), "Loaded template");

        let content = templates::render_named(template_name, &source, context)?;

        Ok(Artifact::new(
            name,
            content,
            ArtifactKind::from_template_name(template_name),
            Language::from_template_name(template_name),
        )
        .with_metadata("generator", "template")
        .with_metadata("template", template_name))
    }
}
