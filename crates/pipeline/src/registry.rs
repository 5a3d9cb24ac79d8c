//! The agent registry: known agents, their declared contracts, and the
//! dependency-derived order to run them in.
//!
//! The registry is populated at process start and read-only while runs are in
//! flight. New agents can be registered between runs without touching existing
//! entries; [`AgentRegistry::resolve_order`] picks them up automatically.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Agent, AgentId, FieldName, RegistryError, SchemaSupport, SchemaVersion};

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Declared contract of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Unique agent identifier.
    pub id: AgentId,

    /// Envelope versions the agent accepts on requests.
    pub input_schema: SchemaSupport,

    /// Envelope version the agent answers with.
    pub output_schema: SchemaVersion,

    /// Agents that must have completed before this one runs.
    pub depends_on: Vec<AgentId>,

    /// Shared-state (and memory) fields copied into this agent's request payload.
    pub consumes: Vec<FieldName>,

    /// Fields a successful response must carry; these, and only these, are
    /// merged into the shared state.
    pub produces: Vec<FieldName>,
}

impl RegistryEntry {
    /// Creates an entry speaking the current schema, with no dependencies and
    /// an empty contract.
    pub fn new(id: AgentId) -> Self {
        Self {
            id,
            input_schema: SchemaSupport::current_only(),
            output_schema: SchemaVersion::current(),
            depends_on: Vec::new(),
            consumes: Vec::new(),
            produces: Vec::new(),
        }
    }

    #[must_use]
    pub fn depends_on(mut self, dependency: AgentId) -> Self {
        if !self.depends_on.contains(&dependency) {
            self.depends_on.push(dependency);
        }
        self
    }

    /// Declares input fields. Blank names are skipped.
    #[must_use]
    pub fn consumes(mut self, names: &[&str]) -> Self {
        self.consumes.extend(names.iter().filter_map(|n| FieldName::new(*n)));
        self
    }

    /// Declares output fields. Blank names are skipped.
    #[must_use]
    pub fn produces(mut self, names: &[&str]) -> Self {
        self.produces.extend(names.iter().filter_map(|n| FieldName::new(*n)));
        self
    }

    #[must_use]
    pub fn with_input_schema(mut self, support: SchemaSupport) -> Self {
        self.input_schema = support;
        self
    }

    #[must_use]
    pub fn with_output_schema(mut self, version: SchemaVersion) -> Self {
        self.output_schema = version;
        self
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct RegisteredAgent {
    entry: RegistryEntry,
    agent: Arc<dyn Agent>,
}

/// Catalog of agents in registration order.
#[derive(Default)]
pub struct AgentRegistry {
    agents: Vec<RegisteredAgent>,
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.agents.iter().map(|a| &a.entry.id))
            .finish()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an agent. Fails with [`RegistryError::DuplicateAgent`] if the id
    /// is already registered; the existing entry is left untouched.
    pub fn register(
        &mut self,
        entry: RegistryEntry,
        agent: Arc<dyn Agent>,
    ) -> Result<(), RegistryError> {
        if self.position(&entry.id).is_some() {
            return Err(RegistryError::DuplicateAgent(entry.id));
        }
        tracing::debug!(agent = %entry.id, "registered agent");
        self.agents.push(RegisteredAgent { entry, agent });
        Ok(())
    }

    /// Looks up an agent's declared contract.
    pub fn get(&self, id: &AgentId) -> Result<&RegistryEntry, RegistryError> {
        self.position(id)
            .map(|i| &self.agents[i].entry)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Returns a handle to the agent implementation.
    pub fn agent(&self, id: &AgentId) -> Result<Arc<dyn Agent>, RegistryError> {
        self.position(id)
            .map(|i| Arc::clone(&self.agents[i].agent))
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Entries in registration order.
    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.agents.iter().map(|a| &a.entry)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Deterministic topological order of all registered agents.
    ///
    /// Dependencies come before dependents. Among agents whose dependencies
    /// are all satisfied, the one registered first goes first.
    pub fn resolve_order(&self) -> Result<Vec<AgentId>, RegistryError> {
        let count = self.agents.len();

        // Dependencies per agent as registration indices.
        let mut dependencies: Vec<BTreeSet<usize>> = Vec::with_capacity(count);
        for registered in &self.agents {
            let mut deps = BTreeSet::new();
            for dependency in &registered.entry.depends_on {
                let index = self.position(dependency).ok_or_else(|| {
                    RegistryError::UnknownDependency {
                        agent: registered.entry.id.clone(),
                        dependency: dependency.clone(),
                    }
                })?;
                deps.insert(index);
            }
            dependencies.push(deps);
        }

        let mut remaining: Vec<usize> = dependencies.iter().map(BTreeSet::len).collect();
        let mut ready: BTreeSet<usize> = (0..count).filter(|i| remaining[*i] == 0).collect();
        let mut order = Vec::with_capacity(count);

        while let Some(next) = ready.pop_first() {
            order.push(self.agents[next].entry.id.clone());
            for (dependent, deps) in dependencies.iter().enumerate() {
                if deps.contains(&next) {
                    remaining[dependent] -= 1;
                    if remaining[dependent] == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if order.len() < count {
            let stuck = (0..count)
                .filter(|i| remaining[*i] > 0)
                .map(|i| self.agents[i].entry.id.clone())
                .collect();
            return Err(RegistryError::CyclicDependency(stuck));
        }
        Ok(order)
    }

    fn position(&self, id: &AgentId) -> Option<usize> {
        self.agents.iter().position(|a| a.entry.id == *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RequestEnvelope, ResponseEnvelope};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Agent for Echo {
        async fn process(&self, request: RequestEnvelope) -> ResponseEnvelope {
            let payload = request.payload().clone();
            ResponseEnvelope::success(&request, payload)
        }
    }

    fn id(name: &str) -> AgentId {
        AgentId::new(name).unwrap()
    }

    fn register(registry: &mut AgentRegistry, name: &str, deps: &[&str]) {
        let entry = deps
            .iter()
            .fold(RegistryEntry::new(id(name)), |e, d| e.depends_on(id(d)));
        registry.register(entry, Arc::new(Echo)).unwrap();
    }

    #[test]
    fn chain_resolves_in_dependency_order() {
        let mut registry = AgentRegistry::new();
        // Registered out of order on purpose.
        register(&mut registry, "scheduler", &["adapter"]);
        register(&mut registry, "ideation", &[]);
        register(&mut registry, "adapter", &["writer"]);
        register(&mut registry, "writer", &["ideation"]);

        assert_eq!(
            registry.resolve_order().unwrap(),
            vec![id("ideation"), id("writer"), id("adapter"), id("scheduler")]
        );
    }

    #[test]
    fn ties_break_by_registration_order() {
        let mut registry = AgentRegistry::new();
        register(&mut registry, "b", &[]);
        register(&mut registry, "a", &[]);
        register(&mut registry, "c", &["a", "b"]);

        assert_eq!(
            registry.resolve_order().unwrap(),
            vec![id("b"), id("a"), id("c")]
        );
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = AgentRegistry::new();
        register(&mut registry, "writer", &[]);
        let err = registry
            .register(RegistryEntry::new(id("writer")), Arc::new(Echo))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateAgent(id("writer")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn entries_default_to_the_current_schema() {
        let entry = RegistryEntry::new(id("writer"));
        assert_eq!(entry.output_schema, SchemaVersion::current());
        assert!(entry.input_schema.accepts(&SchemaVersion::current()));

        let v2 = SchemaVersion::new("v2").unwrap();
        let entry = entry.with_output_schema(v2.clone());
        assert_eq!(entry.output_schema, v2);
    }

    #[test]
    fn lookup_of_unknown_agent_fails() {
        let registry = AgentRegistry::new();
        assert_eq!(
            registry.get(&id("ghost")).unwrap_err(),
            RegistryError::NotFound(id("ghost"))
        );
        assert!(registry.agent(&id("ghost")).is_err());
    }

    #[test]
    fn cycles_are_detected() {
        let mut registry = AgentRegistry::new();
        register(&mut registry, "root", &[]);
        register(&mut registry, "a", &["b"]);
        register(&mut registry, "b", &["a"]);

        assert_eq!(
            registry.resolve_order().unwrap_err(),
            RegistryError::CyclicDependency(vec![id("a"), id("b")])
        );
    }

    #[test]
    fn unknown_dependency_is_reported() {
        let mut registry = AgentRegistry::new();
        register(&mut registry, "writer", &["ideation"]);
        assert_eq!(
            registry.resolve_order().unwrap_err(),
            RegistryError::UnknownDependency {
                agent: id("writer"),
                dependency: id("ideation"),
            }
        );
    }

    #[test]
    fn agents_added_later_join_the_order() {
        let mut registry = AgentRegistry::new();
        register(&mut registry, "ideation", &[]);
        register(&mut registry, "writer", &["ideation"]);
        let before = registry.resolve_order().unwrap();

        register(&mut registry, "reviewer", &["writer"]);
        let after = registry.resolve_order().unwrap();

        assert_eq!(&after[..2], before.as_slice());
        assert_eq!(after[2], id("reviewer"));
    }
}
