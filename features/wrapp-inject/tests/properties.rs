use std::{collections::BTreeSet, convert::Infallible};

use proptest::{collection::vec, prelude::*};
use wrapp_inject::{
    ComponentDescriptor, DependencyGraph, GraphError, Injection, Injections, Registry, Stages,
};

fn key(index: usize) -> String {
    format!("c{index:02}")
}

/// `dependencies[i]` lists the indices component `i` references
fn registry(dependencies: &[Vec<usize>]) -> Registry {
    dependencies
        .iter()
        .enumerate()
        .map(|(index, targets)| {
            let injections: Injections = targets
                .iter()
                .map(|target| (key(*target), Injection::reference_key(key(*target))))
                .collect();
            ComponentDescriptor::from_fn(key(index), injections, |_| async {
                Ok::<_, Infallible>(())
            })
        })
        .collect()
}

/// Acyclic graphs: components only reference components with a lower index
fn acyclic() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..14).prop_flat_map(|count| {
        vec(vec(any::<bool>(), count), count).prop_map(|matrix| {
            matrix
                .iter()
                .enumerate()
                .map(|(index, row)| (0..index).filter(|target| row[*target]).collect::<Vec<_>>())
                .collect::<Vec<_>>()
        })
    })
}

/// Length of the longest reference chain starting at each component
fn depths(dependencies: &[Vec<usize>]) -> Vec<usize> {
    let mut depths = vec![0; dependencies.len()];
    for (index, targets) in dependencies.iter().enumerate() {
        depths[index] = 1 + targets.iter().map(|target| depths[*target]).max().unwrap_or(0);
    }
    depths
}

fn partition(stages: &Stages) -> BTreeSet<BTreeSet<String>> {
    stages.iter().cloned().collect()
}

proptest! {
    #[test]
    fn components_come_after_all_their_dependencies(dependencies in acyclic()) {
        let graph = DependencyGraph::new(&registry(&dependencies)).unwrap();
        let stages = graph.stages().unwrap();

        for (index, targets) in dependencies.iter().enumerate() {
            let own = stages.stage_of(&key(index)).unwrap();
            for target in targets {
                prop_assert!(stages.stage_of(&key(*target)).unwrap() < own);
            }
        }
    }

    #[test]
    fn stage_count_is_the_longest_chain(dependencies in acyclic()) {
        let graph = DependencyGraph::new(&registry(&dependencies)).unwrap();
        let stages = graph.stages().unwrap();

        let depth = depths(&dependencies).into_iter().max().unwrap_or(0);
        prop_assert_eq!(stages.len(), depth);
    }

    #[test]
    fn every_component_is_scheduled_exactly_once(dependencies in acyclic()) {
        let graph = DependencyGraph::new(&registry(&dependencies)).unwrap();
        let stages = graph.stages().unwrap();

        prop_assert_eq!(stages.component_count(), dependencies.len());
        for index in 0..dependencies.len() {
            let hits = stages.iter().filter(|stage| stage.contains(&key(index))).count();
            prop_assert_eq!(hits, 1);
        }
    }

    #[test]
    fn stages_have_no_internal_edges(dependencies in acyclic()) {
        let graph = DependencyGraph::new(&registry(&dependencies)).unwrap();
        let stages = graph.stages().unwrap();

        for stage in &stages {
            for from in stage {
                for to in stage {
                    prop_assert!(!graph.has_edge(from, to));
                }
            }
        }
    }

    #[test]
    fn scheduling_twice_gives_the_same_partition(dependencies in acyclic()) {
        let first = DependencyGraph::new(&registry(&dependencies)).unwrap().stages().unwrap();
        let second = DependencyGraph::new(&registry(&dependencies)).unwrap().stages().unwrap();
        prop_assert_eq!(partition(&first), partition(&second));
    }

    #[test]
    fn reported_cycles_are_closed_and_simple(
        (mut dependencies, length) in acyclic().prop_flat_map(|dependencies| {
            let count = dependencies.len();
            (Just(dependencies), 0..count)
        })
    ) {
        // Chain `length -> length - 1 -> ... -> 0`, closed by `0 -> length`
        for index in 1..=length {
            if !dependencies[index].contains(&(index - 1)) {
                dependencies[index].push(index - 1);
            }
        }
        dependencies[0].push(length);

        let graph = DependencyGraph::new(&registry(&dependencies)).unwrap();
        let chain = match graph.stages() {
            Err(GraphError::CircularDependency { chain }) => chain,
            other => return Err(TestCaseError::fail(format!("expected a cycle, got {other:?}"))),
        };

        prop_assert!(chain.len() >= 2);
        prop_assert_eq!(chain.first(), chain.last());
        for pair in chain.windows(2) {
            prop_assert!(graph.has_edge(&pair[0], &pair[1]));
        }
        let distinct: BTreeSet<_> = chain[..chain.len() - 1].iter().collect();
        prop_assert_eq!(distinct.len(), chain.len() - 1);
    }
}
