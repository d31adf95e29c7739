use std::collections::{BTreeMap, BTreeSet};

use crate::{
    component::ComponentDescriptor,
    errors::GraphError,
    injection::{Injection, InjectionKind},
    registry::Registry,
    scheduler::{self, Stages},
    types::ComponentKey,
};

/// Which declarations produce edges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EdgePolicy {
    /// `reference` declarations, plus `external-use` declarations named like another component
    #[default]
    Convention,
    /// Only `reference` declarations
    ExplicitOnly,
}

/// Graph of the entire application
/// Used to order bring-up and to check for circular dependencies
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    map: BTreeMap<ComponentKey, GraphNode>,
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub key: ComponentKey,
    pub descriptor: ComponentDescriptor,
    /// Keys this node needs live before it resolves
    pub dependencies: BTreeSet<ComponentKey>,
    /// Reference property → key of its target
    pub references: BTreeMap<String, ComponentKey>,
    /// External-use properties which are wired to the component of the same key
    pub conventions: BTreeSet<String>,
}

impl DependencyGraph {
    pub fn new(registry: &Registry) -> Result<Self, GraphError> {
        Self::with_policy(registry, EdgePolicy::default())
    }

    pub fn with_policy(registry: &Registry, policy: EdgePolicy) -> Result<Self, GraphError> {
        let mut map = BTreeMap::new();

        for (key, descriptor) in registry.iter() {
            let mut node = GraphNode {
                key: key.clone(),
                descriptor: descriptor.clone(),
                dependencies: BTreeSet::new(),
                references: BTreeMap::new(),
                conventions: BTreeSet::new(),
            };

            for (property, injection) in descriptor.injections().iter() {
                if let Some(target) = injection.target() {
                    let target_key = registry.resolve_target(key, property, target)?;
                    node.dependencies.insert(target_key.clone());
                    node.references.insert(property.clone(), target_key.clone());
                    continue;
                }

                if policy == EdgePolicy::Convention {
                    if let Some(target_key) = convention_edge(key, property, injection, registry) {
                        node.dependencies.insert(target_key.clone());
                        node.conventions.insert(property.clone());
                    }
                }
            }

            map.insert(key.clone(), node);
        }

        tracing::debug!(
            "Built dependency graph with {} nodes and {} edges",
            map.len(),
            map.values().map(|node| node.dependencies.len()).sum::<usize>()
        );

        Ok(DependencyGraph { map })
    }

    pub fn get(&self, key: &str) -> Option<&GraphNode> {
        self.map.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.map.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ComponentKey> {
        self.map.keys()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Does `from` depend directly on `to`
    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.map
            .get(from)
            .is_some_and(|node| node.dependencies.contains(to))
    }

    /// Partitions the graph into stages, see [`scheduler::schedule`]
    pub fn stages(&self) -> Result<Stages, GraphError> {
        scheduler::schedule(self)
    }
}

/// The convention rule: an `external-use` property named exactly like another
/// registered component depends on that component.
///
/// This is the only place the rule lives, [`EdgePolicy::ExplicitOnly`] switches it off.
pub fn convention_edge<'r>(
    consumer: &str,
    property: &str,
    injection: &Injection,
    registry: &'r Registry,
) -> Option<&'r ComponentKey> {
    if !matches!(injection.kind(), InjectionKind::ExternalUse) || property == consumer {
        return None;
    }
    registry.get_key_value(property).map(|(key, _)| key)
}
