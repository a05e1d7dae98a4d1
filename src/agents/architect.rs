//! The architect: requirement analysis, project structure and system design.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::json;
use tracing::info;

use super::analysis::{analyze_requirements, Requirements};
use super::structure::{count_files, render_tree, scan_structure};
use super::{first_text, Agent, AgentConfig, AgentCore, AgentError, Capability, Role, StepOutput};
use crate::domain::{Message, StepView};

/// A component of the proposed design
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDesign {
    pub name: String,
    pub responsibility: String,
    pub module: String,
}

/// Proposed system layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemDesign {
    pub summary: String,
    pub components: Vec<ComponentDesign>,
    pub modules: Vec<String>,
    pub technologies: Vec<String>,
}

fn responsibility(component: &str) -> &'static str {
    match component {
        "api" => "Expose operations over HTTP",
        "storage" => "Persist and load domain records",
        "cli" => "Parse arguments and drive the application",
        "ui" => "Present data and collect user input",
        "auth" => "Authenticate users and check permissions",
        "reporting" => "Aggregate and export results",
        _ => "Implement the core computations",
    }
}

/// Derive a design from structured requirements
pub fn design_system(requirements: &Requirements, package: &str) -> SystemDesign {
    let components: Vec<ComponentDesign> = requirements
        .components
        .iter()
        .map(|name| ComponentDesign {
            name: name.clone(),
            responsibility: responsibility(name).to_string(),
            module: format!("{}.{}", package, name),
        })
        .collect();

    let mut technologies = requirements.dependencies.clone();
    if technologies.is_empty() {
        technologies.push("python".to_string());
    }

    SystemDesign {
        summary: requirements.summary.clone(),
        modules: components.iter().map(|c| c.module.clone()).collect(),
        components,
        technologies,
    }
}

pub struct Architect {
    core: AgentCore,
}

impl Architect {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            core: AgentCore::new(Role::Architect, config),
        }
    }

    fn requirement_text(view: &StepView) -> Option<String> {
        first_text(view, &["requirements", "text", "description"])
            .map(str::to_string)
            .or_else(|| {
                let project = &view.project.requirements;
                (!project.trim().is_empty()).then(|| project.clone())
            })
    }
}

impl Default for Architect {
    fn default() -> Self {
        Self::new(AgentConfig::default())
    }
}

#[async_trait]
impl Agent for Architect {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[
            Capability::AnalyzeRequirements,
            Capability::AnalyzeStructure,
            Capability::DesignSystem,
        ]
    }

    async fn analyze_requirements(&mut self, view: &StepView) -> Result<StepOutput, AgentError> {
        let text = Self::requirement_text(view).ok_or_else(|| {
            AgentError::InvalidInput("no requirement text to analyze".to_string())
        })?;

        let requirements = analyze_requirements(&text);
        info!(
            components = requirements.components.len(),
            entities = requirements.entities.len(),
            "Analyzed requirements"
        );
        self.core
            .memory
            .remember("last_requirements", Value::String(requirements.summary.clone()));

        let note = format!(
            "Requirements analyzed: {} component(s), {} acceptance criteria",
            requirements.components.len(),
            requirements.acceptance_criteria.len()
        );
        Ok(StepOutput::from_serializable(&requirements)?
            .with_message(Message::broadcast(Role::Architect, note)))
    }

    async fn analyze_structure(&mut self, view: &StepView) -> Result<StepOutput, AgentError> {
        let root = &view.output_root;
        let structure = scan_structure(root)?;
        let files = count_files(&structure);
        let tree = render_tree(&structure);
        info!(root = %root.display(), files, "Analyzed project structure");
        self.core.memory.remember("last_structure", Value::String(tree.clone()));

        let note = if root.is_dir() {
            format!("Project structure of {}: {} file(s)", root.display(), files)
        } else {
            format!("Project directory {} does not exist yet", root.display())
        };
        Ok(StepOutput::new(json!({
            "root": root.display().to_string(),
            "structure": structure,
            "tree": tree,
            "files": files,
        }))
        .with_message(Message::broadcast(Role::Architect, note)))
    }

    async fn design_system(&mut self, view: &StepView) -> Result<StepOutput, AgentError> {
        // Accept either analyzed requirements or raw text
        let requirements = match view.input("requirements") {
            Some(value) if value.is_object() => serde_json::from_value(value.clone())
                .map_err(|e| AgentError::InvalidInput(format!("malformed requirements: {}", e)))?,
            _ => {
                let text = Self::requirement_text(view).ok_or_else(|| {
                    AgentError::InvalidInput("no requirements to design from".to_string())
                })?;
                analyze_requirements(&text)
            }
        };

        let package = view
            .str_input("package")
            .map(str::to_string)
            .unwrap_or_else(|| package_name(&view.project.name));
        let design = design_system(&requirements, &package);
        info!(modules = design.modules.len(), "Designed system");

        let note = format!("Design ready: {}", design.modules.join(", "));
        Ok(StepOutput::from_serializable(&design)?
            .with_message(Message::to(Role::Architect, Role::Developer, note)))
    }
}

/// Python package name for a project name
pub(crate) fn package_name(project: &str) -> String {
    let slug: String = project
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let slug = slug.trim_matches('_');
    if slug.is_empty() || slug.starts_with(|c: char| c.is_ascii_digit()) {
        "app".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SafetyLimits;
    use crate::domain::ProjectMetadata;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn view(inputs: Value) -> StepView {
        let inputs: BTreeMap<String, Value> = serde_json::from_value(inputs).unwrap();
        StepView {
            step_id: "analyze".to_string(),
            project: ProjectMetadata {
                name: "Inventory Service".to_string(),
                ..Default::default()
            },
            inputs,
            inbox: Vec::new(),
            output_root: PathBuf::from("out"),
            limits: SafetyLimits::default(),
        }
    }

    #[tokio::test]
    async fn test_analyze_requirements_output_shape() {
        let mut architect = Architect::default();
        let output = architect
            .analyze_requirements(&view(json!({"requirements": "Create a factorial function"})))
            .await
            .unwrap();

        for key in ["entities", "constraints", "acceptance_criteria", "components"] {
            assert!(output.value.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(output.messages.len(), 1);
        assert!(architect.core().memory.recall("last_requirements").is_some());
    }

    #[tokio::test]
    async fn test_analyze_without_text_is_invalid_input() {
        let mut architect = Architect::default();
        let err = architect.analyze_requirements(&view(json!({}))).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_design_from_structured_requirements() {
        let requirements = analyze_requirements("Build a REST API backed by a database");
        let mut architect = Architect::default();
        let output = architect
            .design_system(&view(json!({"requirements": requirements})))
            .await
            .unwrap();

        assert_eq!(
            output.value["modules"],
            json!(["inventory_service.api", "inventory_service.storage"])
        );
        assert_eq!(output.value["technologies"], json!(["python"]));
    }

    #[tokio::test]
    async fn test_analyze_structure_of_output_root() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("src")).unwrap();
        std::fs::write(temp.path().join("src/factorial.py"), "").unwrap();
        std::fs::write(temp.path().join("README.md"), "").unwrap();
        std::fs::write(temp.path().join("data.csv"), "").unwrap();

        let mut step = view(json!({}));
        step.output_root = temp.path().to_path_buf();
        let mut architect = Architect::default();
        let output = architect.analyze_structure(&step).await.unwrap();

        assert_eq!(
            output.value["structure"],
            json!({"README.md": null, "src": {"factorial.py": null}})
        );
        assert_eq!(output.value["files"], json!(2));
        assert_eq!(
            output.value["tree"],
            json!("├── README.md\n└── src/\n    └── factorial.py")
        );
        assert!(architect.core().memory.recall("last_structure").is_some());
        assert!(architect.supports(Capability::AnalyzeStructure));
    }

    #[tokio::test]
    async fn test_analyze_structure_missing_root() {
        let mut architect = Architect::default();
        let output = architect
            .analyze_structure(&view(json!({})))
            .await
            .unwrap();

        assert_eq!(output.value["files"], json!(0));
        assert_eq!(output.value["tree"], json!(""));
        assert!(output.messages[0].content.contains("does not exist yet"));
    }

    #[test]
    fn test_package_name() {
        assert_eq!(package_name("Inventory Service"), "inventory_service");
        assert_eq!(package_name("42"), "app");
        assert_eq!(package_name(""), "app");
    }
}
