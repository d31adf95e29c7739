use std::collections::BTreeSet;

use crate::{
    component::{Component, ComponentDescriptor},
    errors::GraphError,
    injection::Injections,
    registry::Registry,
    types::ComponentKey,
};

/// A consumer whose references decide which components an application needs
///
/// Roots are only walked, never scheduled themselves.
#[derive(Debug, Clone)]
pub struct RootConsumer {
    name: String,
    injections: Injections,
}

impl RootConsumer {
    pub fn new(name: impl Into<String>, injections: Injections) -> Self {
        RootConsumer {
            name: name.into(),
            injections,
        }
    }

    /// A root with the declarations of `T`
    pub fn of<T: Component>() -> Self {
        Self::new(T::KEY, T::injections())
    }

    pub fn from_descriptor(descriptor: &ComponentDescriptor) -> Self {
        Self::new(descriptor.key().clone(), descriptor.injections().clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn injections(&self) -> &Injections {
        &self.injections
    }
}

/// Every registered key the roots reach through `reference` declarations
///
/// Visited keys are not walked twice, so diamonds and cycles both terminate here.
pub fn collect_closure<'a>(
    registry: &Registry,
    roots: impl IntoIterator<Item = &'a RootConsumer>,
) -> Result<BTreeSet<ComponentKey>, GraphError> {
    let mut visited = BTreeSet::new();
    for root in roots {
        walk(registry, root.name(), root.injections(), &mut visited)?;
    }

    tracing::debug!("Roots require {} components", visited.len());
    Ok(visited)
}

fn walk(
    registry: &Registry,
    consumer: &str,
    injections: &Injections,
    visited: &mut BTreeSet<ComponentKey>,
) -> Result<(), GraphError> {
    for (property, target) in injections.references() {
        let key = registry.resolve_target(consumer, property, target)?;
        if !visited.insert(key.clone()) {
            continue;
        }

        // Resolved keys are always registered
        if let Some(descriptor) = registry.get(key) {
            walk(registry, key, descriptor.injections(), visited)?;
        }
    }
    Ok(())
}
