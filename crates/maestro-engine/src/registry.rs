use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use maestro_core::traits::Agent;

/// Name-indexed collection of agent implementations.
///
/// Workflow declarations reference agents by name; the registry binds those
/// names to concrete [`Agent`] implementations for the lifetime of an engine.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an implementation to an agent name. A later registration under
    /// the same name replaces the earlier one.
    pub fn register(&mut self, name: impl Into<String>, agent: Arc<dyn Agent>) {
        let name = name.into();
        debug!(agent = %name, "Agent registered");
        self.agents.insert(name, agent);
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::future::BoxFuture;
    use maestro_core::error::Result;
    use maestro_core::types::{AgentContext, AgentInput, AgentOutput};

    struct Echo;

    impl Agent for Echo {
        fn invoke(
            &self,
            input: AgentInput,
            _ctx: AgentContext,
        ) -> BoxFuture<'_, Result<AgentOutput>> {
            Box::pin(async move { Ok(AgentOutput::success(input.task)) })
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = AgentRegistry::new();
        assert!(registry.is_empty());

        registry.register("echo", Arc::new(Echo));
        assert!(registry.contains("echo"));
        assert!(registry.resolve("echo").is_some());
        assert!(registry.resolve("missing").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reregistration_replaces() {
        let mut registry = AgentRegistry::new();
        registry.register("echo", Arc::new(Echo));
        registry.register("echo", Arc::new(Echo));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_names_sorted() {
        let mut registry = AgentRegistry::new();
        registry.register("writer", Arc::new(Echo));
        registry.register("search", Arc::new(Echo));
        assert_eq!(registry.names(), vec!["search", "writer"]);
    }
}
