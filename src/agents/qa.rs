//! The QA engineer: code review and test generation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::developer::{Example, GeneratedCode};
use super::review::review_code;
use super::{text_of, Agent, AgentConfig, AgentCore, AgentError, Capability, Role, StepOutput};
use crate::codegen::python::scan_functions;
use crate::codegen::CodeGenerator;
use crate::domain::{Language, Message, StepView};

pub struct QaEngineer {
    core: AgentCore,
    generator: Arc<CodeGenerator>,
}

impl QaEngineer {
    pub fn new(config: AgentConfig, generator: Arc<CodeGenerator>) -> Self {
        Self {
            core: AgentCore::new(Role::Qa, config),
            generator,
        }
    }

    fn code_input(view: &StepView) -> Result<&Value, AgentError> {
        view.input("code")
            .ok_or_else(|| AgentError::InvalidInput("missing 'code' input".to_string()))
    }
}

/// Field of an object input, if the input is an object
fn field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Test context for the `python.test` template
fn test_context(module: &str, code: &str, examples: &[Example]) -> Value {
    let functions: Vec<Value> = scan_functions(code)
        .into_iter()
        .map(|f| {
            let prefix = format!("{}(", f.name);
            let cases: Vec<&Example> = examples
                .iter()
                .filter(|e| e.call.starts_with(&prefix))
                .collect();
            json!({"name": f.name, "cases": cases})
        })
        .collect();

    let leaf = module.rsplit('.').next().unwrap_or(module);
    json!({"module": module, "class_name": pascal_case(leaf), "functions": functions})
}

/// `math_kit` -> `MathKit`
fn pascal_case(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[async_trait]
impl Agent for QaEngineer {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::ReviewCode, Capability::GenerateTests]
    }

    async fn review_code(&mut self, view: &StepView) -> Result<StepOutput, AgentError> {
        let input = Self::code_input(view)?;
        let code = text_of(input)
            .ok_or_else(|| AgentError::InvalidInput("'code' carries no source text".to_string()))?;
        let language = view
            .str_input("language")
            .or_else(|| field(input, "language"))
            .and_then(Language::from_name)
            .unwrap_or(self.core.config.language);

        let report = review_code(code, language);
        let summary = report.summary();
        info!(passed = report.passed, issues = report.issues.len(), "Reviewed code");
        self.core.memory.push("reviews", json!(summary));

        let report_value = serde_json::to_value(&report)
            .map_err(|e| AgentError::Failed(format!("cannot serialize report: {}", e)))?;
        let mut output = StepOutput::new(report_value.clone())
            .with_message(Message::to(Role::Qa, Role::Developer, format!("Review {}", summary)));

        let reviewed = view
            .str_input("artifact")
            .or_else(|| field(input, "name"))
            .map(str::to_string);
        if let Some(name) = reviewed {
            output = output
                .with_annotation(name.clone(), "review", report_value)
                .with_annotation(name, "review_passed", Value::Bool(report.passed));
        }

        Ok(output)
    }

    async fn generate_tests(&mut self, view: &StepView) -> Result<StepOutput, AgentError> {
        let input = Self::code_input(view)?;

        let (module, code, examples) = match serde_json::from_value::<GeneratedCode>(input.clone()) {
            Ok(generated) => (generated.name, generated.code, generated.examples),
            Err(_) => {
                let code = text_of(input).ok_or_else(|| {
                    AgentError::InvalidInput("'code' carries no source text".to_string())
                })?;
                let module = view.str_input("module").unwrap_or("solution");
                (module.to_string(), code.to_string(), Vec::new())
            }
        };

        let context = test_context(&module, &code, &examples);
        let leaf = module.rsplit('.').next().unwrap_or(&module);
        let artifact = self.generator.generate_from_template(
            "python.test",
            &context,
            &format!("test_{}", leaf),
        )?;

        info!(artifact = %artifact.name, cases = examples.len(), "Generated tests");
        let value = json!({
            "name": artifact.name,
            "code": artifact.content,
            "language": artifact.language,
            "cases": examples.len(),
        });
        Ok(StepOutput::new(value).with_artifact(artifact))
    }
}
