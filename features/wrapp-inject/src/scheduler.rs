use std::collections::{BTreeMap, BTreeSet};

use crate::{cycle, dependency_graph::DependencyGraph, errors::GraphError, types::ComponentKey};

/// Components without dependencies among each other, safe to bring up concurrently
///
/// The order of keys inside a stage carries no meaning.
pub type Stage = BTreeSet<ComponentKey>;

/// Stages in the order they have to be brought up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stages(Vec<Stage>);

impl Stages {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Stage> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Stage> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Stage] {
        &self.0
    }

    /// Index of the stage `key` is brought up in
    pub fn stage_of(&self, key: &str) -> Option<usize> {
        self.0.iter().position(|stage| stage.contains(key))
    }

    /// Number of scheduled components
    pub fn component_count(&self) -> usize {
        self.0.iter().map(BTreeSet::len).sum()
    }
}

impl IntoIterator for Stages {
    type Item = Stage;
    type IntoIter = std::vec::IntoIter<Stage>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Stages {
    type Item = &'a Stage;
    type IntoIter = std::slice::Iter<'a, Stage>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Partitions `graph` into the fewest sequential stages
///
/// Kahn's algorithm, emitting every frontier of satisfied components as one stage.
/// If not every component could be scheduled, the remainder is searched for a cycle.
pub fn schedule(graph: &DependencyGraph) -> Result<Stages, GraphError> {
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for node in graph.nodes() {
        in_degree.insert(&node.key, node.dependencies.len());
        for dependency in &node.dependencies {
            dependents.entry(dependency).or_default().push(&node.key);
        }
    }

    let mut frontier: Vec<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(key, _)| *key)
        .collect();

    let mut stages = Vec::new();
    let mut processed = 0;
    while !frontier.is_empty() {
        let mut next = Vec::new();
        for key in &frontier {
            for dependent in dependents.get(key).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(*dependent);
                    }
                }
            }
        }

        processed += frontier.len();
        stages.push(frontier.iter().map(|key| key.to_string()).collect::<Stage>());
        frontier = next;
    }

    if processed < graph.len() {
        let unresolved: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree > 0)
            .map(|(key, _)| *key)
            .collect();
        tracing::debug!("{} components could not be scheduled", unresolved.len());

        let chain = cycle::find_cycle(graph, &unresolved);
        return Err(GraphError::CircularDependency { chain });
    }

    tracing::debug!(
        "Scheduled {} components in {} stages",
        processed,
        stages.len()
    );
    Ok(Stages(stages))
}
