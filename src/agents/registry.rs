//! Role-keyed agent registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::{Agent, AgentConfig, Architect, Developer, QaEngineer, Role, TechnicalWriter};
use crate::codegen::CodeGenerator;

/// An agent shared between the engine and concurrently running steps.
/// The mutex serializes calls to the same agent; different agents run in
/// parallel.
pub type SharedAgent = Arc<Mutex<Box<dyn Agent>>>;

/// One agent per role
#[derive(Default, Clone)]
pub struct AgentRegistry {
    agents: BTreeMap<Role, SharedAgent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard team: architect, developer, QA engineer and technical
    /// writer, all sharing `generator`
    pub fn default_team(generator: Arc<CodeGenerator>) -> Self {
        Self::team_with_config(generator, AgentConfig::default())
    }

    /// The standard team with a shared agent configuration
    pub fn team_with_config(generator: Arc<CodeGenerator>, config: AgentConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(Architect::new(config.clone())));
        registry.register(Box::new(Developer::new(config.clone(), generator.clone())));
        registry.register(Box::new(QaEngineer::new(config.clone(), generator.clone())));
        registry.register(Box::new(TechnicalWriter::new(config, generator)));
        registry
    }

    /// Register an agent under its role, replacing any previous one
    pub fn register(&mut self, agent: Box<dyn Agent>) -> Option<SharedAgent> {
        let role = agent.role();
        self.agents.insert(role, Arc::new(Mutex::new(agent)))
    }

    pub fn get(&self, role: Role) -> Option<SharedAgent> {
        self.agents.get(&role).cloned()
    }

    pub fn contains(&self, role: Role) -> bool {
        self.agents.contains_key(&role)
    }

    /// Registered roles, in role order
    pub fn roles(&self) -> Vec<Role> {
        self.agents.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::Capability;

    #[tokio::test]
    async fn test_default_team_covers_every_role() {
        let registry = AgentRegistry::default_team(Arc::new(CodeGenerator::with_builtins()));
        assert_eq!(registry.roles(), Role::ALL.to_vec());

        for role in Role::ALL {
            let agent = registry.get(role).unwrap();
            let agent = agent.lock().await;
            assert_eq!(agent.role(), role);
            assert!(agent.supports(role.default_capability()));
        }
    }

    #[tokio::test]
    async fn test_register_replaces_role() {
        let mut registry = AgentRegistry::new();
        assert!(registry.register(Box::new(Architect::default())).is_none());
        assert!(registry.register(Box::new(Architect::default())).is_some());
        assert!(!registry.contains(Role::Qa));

        let agent = registry.get(Role::Architect).unwrap();
        assert!(!agent.lock().await.supports(Capability::GenerateCode));
    }
}
