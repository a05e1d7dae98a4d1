//! The developer: code generation and persistence.
//!
//! Generation is deterministic. A task either names a template, matches one
//! of the built-in recipes by keyword, or falls back to a documented stub.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::analysis::{analyze_requirements, mentions};
use super::review::review_code;
use super::{
    first_text, text_of, write_code, Agent, AgentConfig, AgentCore, AgentError, Capability, Role,
    StepOutput,
};
use crate::codegen::{CodeGenerator, FunctionDescriptor, FunctionSummary, ModuleSpec};
use crate::domain::{Artifact, Language, Message, StepView};
use crate::storage::hash_content;

/// A unit of code to generate
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeTask {
    /// Task id (the step id when run by the engine)
    pub id: String,

    /// What to build, in prose
    pub description: String,

    /// Module name override
    pub name: Option<String>,

    /// Render this template instead of using a recipe
    pub template: Option<String>,

    /// Context for `template`
    pub template_context: Value,
}

/// A call and its expected result, used to derive tests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub call: String,
    pub expected: String,
}

/// Result of `generate_code`: the code text plus its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedCode {
    /// Artifact name
    pub name: String,
    pub code: String,
    pub language: Language,
    pub metadata: BTreeMap<String, Value>,
    pub functions: Vec<FunctionSummary>,
    pub examples: Vec<Example>,
}

struct Recipe {
    keyword: &'static str,
    module: &'static str,
    function: fn() -> FunctionDescriptor,
    examples: &'static [(&'static str, &'static str)],
}

const RECIPES: &[Recipe] = &[
    Recipe {
        keyword: "factorial",
        module: "factorial",
        function: factorial_recipe,
        examples: &[("factorial(0)", "1"), ("factorial(5)", "120")],
    },
    Recipe {
        keyword: "fibonacci",
        module: "fibonacci",
        function: fibonacci_recipe,
        examples: &[("fibonacci(0)", "0"), ("fibonacci(10)", "55")],
    },
    Recipe {
        keyword: "prime",
        module: "primes",
        function: prime_recipe,
        examples: &[("is_prime(7)", "True"), ("is_prime(9)", "False")],
    },
    Recipe {
        keyword: "reverse",
        module: "strings",
        function: reverse_recipe,
        examples: &[("reverse_string(\"abc\")", "\"cba\"")],
    },
    Recipe {
        keyword: "sum",
        module: "summation",
        function: sum_recipe,
        examples: &[("sum_numbers([1, 2, 3])", "6"), ("sum_numbers([])", "0")],
    },
];

fn factorial_recipe() -> FunctionDescriptor {
    FunctionDescriptor::new("factorial")
        .param("n: int")
        .returns("int")
        .docstring("Return n! for a non-negative integer n.")
        .line("if n < 0:")
        .line("    raise ValueError(\"n must be non-negative\")")
        .line("result = 1")
        .line("for i in range(2, n + 1):")
        .line("    result *= i")
        .line("return result")
}

fn fibonacci_recipe() -> FunctionDescriptor {
    FunctionDescriptor::new("fibonacci")
        .param("n: int")
        .returns("int")
        .docstring("Return the n-th Fibonacci number, starting from 0.")
        .line("if n < 0:")
        .line("    raise ValueError(\"n must be non-negative\")")
        .line("a, b = 0, 1")
        .line("for _ in range(n):")
        .line("    a, b = b, a + b")
        .line("return a")
}

fn prime_recipe() -> FunctionDescriptor {
    FunctionDescriptor::new("is_prime")
        .param("n: int")
        .returns("bool")
        .docstring("Return True when n is a prime number.")
        .line("if n < 2:")
        .line("    return False")
        .line("i = 2")
        .line("while i * i <= n:")
        .line("    if n % i == 0:")
        .line("        return False")
        .line("    i += 1")
        .line("return True")
}

fn reverse_recipe() -> FunctionDescriptor {
    FunctionDescriptor::new("reverse_string")
        .param("text: str")
        .returns("str")
        .docstring("Return text with its characters in reverse order.")
        .line("return text[::-1]")
}

fn sum_recipe() -> FunctionDescriptor {
    FunctionDescriptor::new("sum_numbers")
        .param("values: list")
        .returns("float")
        .docstring("Add up every number in values.")
        .line("total = 0")
        .line("for value in values:")
        .line("    total += value")
        .line("return total")
}

fn find_recipe(description: &str) -> Option<&'static Recipe> {
    RECIPES.iter().find(|r| mentions(description, r.keyword))
}

fn estimated_complexity(lines: usize) -> &'static str {
    match lines {
        0..=4 => "low",
        5..=12 => "medium",
        _ => "high",
    }
}

/// Generate code for `task`.
///
/// Identical tasks and template sets always produce identical code and
/// metadata.
pub fn generate_code(
    generator: &CodeGenerator,
    task: &CodeTask,
) -> Result<(Artifact, GeneratedCode), AgentError> {
    if let Some(template) = &task.template {
        let name = task
            .name
            .clone()
            .unwrap_or_else(|| template.replace('.', "_"));
        let artifact = generator.generate_from_template(template, &task.template_context, &name)?;
        let lines = artifact.content.lines().count();
        return Ok(finish(artifact, task, Vec::new(), Vec::new(), "template", lines));
    }

    let recipe = find_recipe(&task.description);
    let function = match recipe {
        Some(r) => (r.function)(),
        None => FunctionDescriptor::new("solution")
            .param("*args")
            .param("**kwargs")
            .docstring(task.description.trim().replace("\"\"\"", "'''")),
    };
    let module = task
        .name
        .clone()
        .or_else(|| recipe.map(|r| r.module.to_string()))
        .unwrap_or_else(|| "solution".to_string());

    let examples: Vec<Example> = recipe
        .map(|r| {
            r.examples
                .iter()
                .map(|(call, expected)| Example {
                    call: call.to_string(),
                    expected: expected.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let summary = FunctionSummary::of(&function);
    let body_lines = function.body.len();
    let spec = ModuleSpec::new(module).with_function(function);
    let artifact = generator.generate_module(&spec)?;

    let recipe_name = recipe.map(|r| r.keyword).unwrap_or("stub");
    Ok(finish(artifact, task, vec![summary], examples, recipe_name, body_lines))
}

fn finish(
    mut artifact: Artifact,
    task: &CodeTask,
    functions: Vec<FunctionSummary>,
    examples: Vec<Example>,
    recipe: &str,
    lines: usize,
) -> (Artifact, GeneratedCode) {
    let mut metadata = BTreeMap::new();
    metadata.insert("language".to_string(), json!(artifact.language));
    metadata.insert(
        "estimated_complexity".to_string(),
        json!(estimated_complexity(lines)),
    );
    metadata.insert("task_id".to_string(), json!(task.id));
    metadata.insert("recipe".to_string(), json!(recipe));
    if let Some(first) = functions.first() {
        metadata.insert("function_name".to_string(), json!(first.name));
    }

    for (key, value) in &metadata {
        artifact.annotate(key.clone(), value.clone());
    }

    let generated = GeneratedCode {
        name: artifact.name.clone(),
        code: artifact.content.clone(),
        language: artifact.language,
        metadata,
        functions,
        examples,
    };
    (artifact, generated)
}

pub struct Developer {
    core: AgentCore,
    generator: Arc<CodeGenerator>,
}

impl Developer {
    pub fn new(config: AgentConfig, generator: Arc<CodeGenerator>) -> Self {
        Self {
            core: AgentCore::new(Role::Developer, config),
            generator,
        }
    }

    fn task_from_view(view: &StepView) -> Result<CodeTask, AgentError> {
        let description = first_text(view, &["task", "description", "design", "requirements"])
            .map(str::to_string)
            .or_else(|| {
                let project = &view.project.requirements;
                (!project.trim().is_empty()).then(|| project.clone())
            })
            .unwrap_or_default();

        let template = view.str_input("template").map(str::to_string);
        if description.trim().is_empty() && template.is_none() {
            return Err(AgentError::InvalidInput(
                "nothing to generate: no task description or template".to_string(),
            ));
        }

        Ok(CodeTask {
            id: view.step_id.clone(),
            description,
            name: view.first_str(&["name", "module"]).map(str::to_string),
            template,
            template_context: view.input("context").cloned().unwrap_or(Value::Null),
        })
    }
}

#[async_trait]
impl Agent for Developer {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[
            Capability::AnalyzeRequirements,
            Capability::GenerateCode,
            Capability::WriteCode,
            Capability::ReviewCode,
        ]
    }

    async fn analyze_requirements(&mut self, view: &StepView) -> Result<StepOutput, AgentError> {
        let text = first_text(view, &["requirements", "text", "description"])
            .ok_or_else(|| AgentError::InvalidInput("no requirement text to analyze".to_string()))?;
        StepOutput::from_serializable(&analyze_requirements(text))
    }

    async fn generate_code(&mut self, view: &StepView) -> Result<StepOutput, AgentError> {
        for message in &view.inbox {
            self.core
                .memory
                .push("notes", Value::String(message.content.clone()));
        }

        let task = Self::task_from_view(view)?;
        let (artifact, generated) = generate_code(&self.generator, &task)?;
        info!(
            artifact = %generated.name,
            recipe = ?generated.metadata.get("recipe"),
            "Generated code"
        );

        self.core.memory.push(
            "task_log",
            json!({"task_id": task.id, "artifact": generated.name}),
        );

        let note = format!("Code ready for review: {}", generated.name);
        Ok(StepOutput::from_serializable(&generated)?
            .with_artifact(artifact)
            .with_message(Message::to(Role::Developer, Role::Qa, note)))
    }

    async fn write_code(&mut self, view: &StepView) -> Result<StepOutput, AgentError> {
        let path = view
            .str_input("path")
            .ok_or_else(|| AgentError::InvalidInput("write_code needs a 'path'".to_string()))?;
        let code = view
            .input("code")
            .and_then(text_of)
            .ok_or_else(|| AgentError::InvalidInput("write_code needs 'code'".to_string()))?;
        let overwrite = view.bool_input("overwrite", false);

        let written = write_code(&view.output_root, path, code, overwrite, &view.limits)?;
        debug!(path = %written.display(), overwrite, "Wrote code");
        self.core
            .memory
            .push("written", Value::String(written.display().to_string()));

        Ok(StepOutput::new(json!({
            "path": written.display().to_string(),
            "bytes": code.len(),
            "sha256": hash_content(code),
        })))
    }

    async fn review_code(&mut self, view: &StepView) -> Result<StepOutput, AgentError> {
        let code = view
            .input("code")
            .and_then(text_of)
            .ok_or_else(|| AgentError::InvalidInput("review_code needs 'code'".to_string()))?;
        let language = view
            .first_str(&["language"])
            .and_then(Language::from_name)
            .unwrap_or(self.core.config.language);
        StepOutput::from_serializable(&review_code(code, language))
    }
}
