//! Agent registry for the orchestration engine.
//!
//! A pure lookup table from agent name to agent handle with
//! duplicate-registration protection. Agents live for the orchestrator's
//! lifetime; there is no unregister.

use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::AnalysisAgent;
use crate::error::RegistryError;

/// Holds named references to registered agent instances.
///
/// Listing preserves registration order; lookup is by name only.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn AnalysisAgent>>,
    order: Vec<String>,
}

impl AgentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an agent under the given name.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateAgent` if the name is already taken and
    /// `UnnamedAgent` if either the registration name or the agent's own
    /// name is empty. No partial state is left on failure.
    pub fn register(
        &mut self,
        name: &str,
        agent: Arc<dyn AnalysisAgent>,
    ) -> Result<(), RegistryError> {
        if name.is_empty() || agent.name().is_empty() {
            return Err(RegistryError::UnnamedAgent);
        }
        if self.agents.contains_key(name) {
            return Err(RegistryError::DuplicateAgent(name.to_string()));
        }

        self.order.push(name.to_string());
        self.agents.insert(name.to_string(), agent);
        Ok(())
    }

    /// Returns the agent registered under `name`, if any.
    pub fn get(&self, name: &str) -> Option<Arc<dyn AnalysisAgent>> {
        self.agents.get(name).cloned()
    }

    /// Fail-fast variant of [`get`](Self::get) for callers that require the
    /// agent to exist.
    pub fn get_required(&self, name: &str) -> Result<Arc<dyn AnalysisAgent>, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::AgentNotFound(name.to_string()))
    }

    /// Whether an agent is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// All registered names, in registration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Number of registered agents.
    pub fn count(&self) -> usize {
        self.agents.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
