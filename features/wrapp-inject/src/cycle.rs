use std::collections::BTreeSet;

use crate::{dependency_graph::DependencyGraph, types::ComponentKey};

/// Finds a dependency cycle among the `unresolved` keys of `graph`
///
/// Depth first search restricted to `unresolved`. The first edge back onto the current
/// path closes the cycle, which is returned starting and ending with the same key:
/// `["a", "b", "a"]`.
///
/// Falls back to the sorted unresolved keys if no cycle is found.
pub fn find_cycle<'g>(
    graph: &'g DependencyGraph,
    unresolved: &BTreeSet<&'g str>,
) -> Vec<ComponentKey> {
    let mut path: Vec<&str> = Vec::new();
    let mut done: BTreeSet<&str> = BTreeSet::new();

    for start in unresolved {
        if done.contains(*start) {
            continue;
        }
        if let Some(chain) = search(graph, unresolved, &mut path, &mut done, *start) {
            return chain;
        }
    }

    tracing::warn!("No cycle found among the unresolved components");
    return unresolved.iter().map(|key| key.to_string()).collect();

    fn search<'g>(
        graph: &'g DependencyGraph,
        unresolved: &BTreeSet<&str>,
        path: &mut Vec<&'g str>,
        done: &mut BTreeSet<&'g str>,
        key: &'g str,
    ) -> Option<Vec<ComponentKey>> {
        let node = graph.get(key)?;
        path.push(&node.key);

        for dependency in &node.dependencies {
            if !unresolved.contains(dependency.as_str()) {
                continue;
            }

            // Back onto the path: everything since its first occurrence is the cycle
            if let Some(position) = path.iter().position(|on_path| *on_path == dependency) {
                let mut chain: Vec<ComponentKey> =
                    path[position..].iter().map(|key| key.to_string()).collect();
                chain.push(dependency.clone());
                return Some(chain);
            }

            if done.contains(dependency.as_str()) {
                continue;
            }
            if let Some(chain) = search(graph, unresolved, path, done, dependency) {
                return Some(chain);
            }
        }

        path.pop();
        done.insert(&node.key);
        None
    }
}
