//! The technical writer: Markdown documentation for generated code.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::architect::package_name;
use super::{text_of, Agent, AgentConfig, AgentCore, AgentError, Capability, Role, StepOutput};
use crate::codegen::python::scan_functions;
use crate::codegen::CodeGenerator;
use crate::domain::{Language, Message, StepView};

pub struct TechnicalWriter {
    core: AgentCore,
    generator: Arc<CodeGenerator>,
}

impl TechnicalWriter {
    pub fn new(config: AgentConfig, generator: Arc<CodeGenerator>) -> Self {
        Self {
            core: AgentCore::new(Role::TechnicalWriter, config),
            generator,
        }
    }

    /// Project README from the project metadata
    fn readme(&self, view: &StepView) -> Result<StepOutput, AgentError> {
        let project = &view.project;
        if project.name.trim().is_empty() {
            return Err(AgentError::InvalidInput(
                "nothing to document: no 'code' input and no project name".to_string(),
            ));
        }

        let context = json!({
            "project_name": project.name,
            "description": view.str_input("description").unwrap_or(project.description.as_str()),
            "requirements": project.requirements,
        });
        let artifact = self
            .generator
            .generate_from_template("markdown.readme", &context, "readme")?;

        info!(artifact = %artifact.name, "Wrote README");
        let value = json!({"name": artifact.name, "text": artifact.content});
        Ok(StepOutput::new(value).with_artifact(artifact))
    }
}

#[async_trait]
impl Agent for TechnicalWriter {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::ProduceDocumentation]
    }

    async fn produce_documentation(&mut self, view: &StepView) -> Result<StepOutput, AgentError> {
        let Some(input) = view.input("code") else {
            return self.readme(view);
        };
        let code = text_of(input)
            .ok_or_else(|| AgentError::InvalidInput("'code' carries no source text".to_string()))?;

        let subject = input
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| view.str_input("module").map(str::to_string))
            .unwrap_or_else(|| package_name(&view.project.name));
        let language = input
            .get("language")
            .and_then(Value::as_str)
            .and_then(Language::from_name)
            .unwrap_or(self.core.config.language);
        let functions = scan_functions(code);

        let title = view
            .str_input("title")
            .map(str::to_string)
            .unwrap_or_else(|| format!("Module `{}`", subject));
        let summary = view
            .first_str(&["summary", "description"])
            .map(str::to_string)
            .unwrap_or_else(|| format!("Reference for the `{}` module.", subject));

        let context = json!({
            "title": title,
            "summary": summary,
            "language": language,
            "functions": functions,
            "include_source": view.bool_input("include_source", true),
            "code": code.trim_end(),
        });
        let artifact = self
            .generator
            .generate_from_template("markdown.module_doc", &context, &format!("{}_doc", subject))?;

        info!(artifact = %artifact.name, functions = functions.len(), "Documented module");
        self.core
            .memory
            .push("documented", Value::String(subject.clone()));

        let value = json!({
            "name": artifact.name,
            "text": artifact.content,
            "functions": functions.len(),
        });
        Ok(StepOutput::new(value)
            .with_artifact(artifact)
            .with_message(Message::broadcast(
                Role::TechnicalWriter,
                format!("Documentation ready for {}", subject),
            )))
    }
}
