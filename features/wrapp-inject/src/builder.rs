use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
    time::Duration,
};

use wrapp_config::ConfigProvider;

use crate::{
    closure::{collect_closure, RootConsumer},
    component::{Component, ComponentDescriptor},
    container::Container,
    dependency_graph::{DependencyGraph, EdgePolicy},
    errors::{BringUpError, GraphError},
    initiator::BringUpInitiator,
    registry::Registry,
    resolver::{ExternalValues, ResolveContext},
    scheduler::Stages,
    slots::{MemoryValueStore, ValueStore},
    types::{ComponentKey, Injectable},
};

/// The checked dependency graph of an application and the stages to bring it up in
#[derive(Debug, Clone)]
pub struct Plan {
    graph: DependencyGraph,
    stages: Stages,
}

impl Plan {
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn stages(&self) -> &Stages {
        &self.stages
    }

    pub fn into_stages(self) -> Stages {
        self.stages
    }
}

/// Collects everything a bring-up run needs
///
/// 1. Register candidate components, framework defaults and optionally root consumers
/// 2. Supply the configuration, external values and a value store
/// 3. [`BringUpBuilder::build`] brings everything up and returns the live [`Container`]
///
/// ```
/// use wrapp_inject::{BringUpBuilder, ComponentDescriptor, Injections};
///
/// let container = futures::executor::block_on(
///     BringUpBuilder::new()
///         .descriptor(ComponentDescriptor::from_fn("greeting", Injections::new(), |_| async {
///             Ok::<_, std::convert::Infallible>("hello".to_string())
///         }))
///         .build(),
/// )
/// .unwrap();
///
/// assert_eq!(container.require::<String>("greeting").unwrap().as_str(), "hello");
/// ```
pub struct BringUpBuilder {
    candidates: Registry,
    defaults: Vec<ComponentDescriptor>,
    roots: Vec<RootConsumer>,
    externals: ExternalValues,
    config: ConfigProvider,
    value_store: Arc<dyn ValueStore>,
    roles: BTreeMap<String, ComponentKey>,
    edge_policy: EdgePolicy,
    stage_timeout: Option<Duration>,
}
impl Default for BringUpBuilder {
    fn default() -> Self {
        Self::new()
    }
}
impl fmt::Debug for BringUpBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BringUpBuilder")
            .field("candidates", &self.candidates)
            .field("defaults", &self.defaults.len())
            .field("roots", &self.roots.len())
            .field("roles", &self.roles)
            .field("edge_policy", &self.edge_policy)
            .field("stage_timeout", &self.stage_timeout)
            .finish_non_exhaustive()
    }
}

impl BringUpBuilder {
    pub fn new() -> Self {
        BringUpBuilder {
            candidates: Registry::new(),
            defaults: Vec::new(),
            roots: Vec::new(),
            externals: ExternalValues::new(),
            config: ConfigProvider::new(),
            value_store: Arc::new(MemoryValueStore::new()),
            roles: BTreeMap::new(),
            edge_policy: EdgePolicy::default(),
            stage_timeout: None,
        }
    }
}
impl BringUpBuilder {
    /// Registers `T` under its default key
    pub fn component<T: Component>(self) -> Self {
        self.descriptor(ComponentDescriptor::of::<T>())
    }

    pub fn descriptor(mut self, descriptor: ComponentDescriptor) -> Self {
        self.candidates.register(descriptor);
        self
    }

    /// Registers all candidates and role assignments of `registry`
    pub fn registry(mut self, registry: Registry) -> Self {
        for (_, descriptor) in registry.iter() {
            self.candidates.register(descriptor.clone());
        }
        for (role, key) in registry.roles() {
            self.roles.insert(role.clone(), key.clone());
        }
        self
    }

    /// Registers a framework default, overridden by any candidate with the same key
    ///
    /// Defaults are always brought up, even if no root needs them.
    pub fn default_component(mut self, descriptor: ComponentDescriptor) -> Self {
        self.defaults.push(descriptor);
        self
    }

    /// Adds a root consumer. Once there are roots, only what they need is brought up
    pub fn root(mut self, root: RootConsumer) -> Self {
        self.roots.push(root);
        self
    }

    /// Supplies `value` to `external-use` injections of the property `name`
    pub fn external<T: Injectable>(mut self, name: impl Into<String>, value: T) -> Self {
        self.externals.insert(name, value);
        self
    }

    pub fn externals(mut self, externals: ExternalValues) -> Self {
        self.externals = externals;
        self
    }

    pub fn config(mut self, config: ConfigProvider) -> Self {
        self.config = config;
        self
    }

    /// Backing store of shared slots, a fresh [`MemoryValueStore`] by default
    pub fn value_store(mut self, store: Arc<dyn ValueStore>) -> Self {
        self.value_store = store;
        self
    }

    /// Assigns the component under `key` to `role`
    ///
    /// Components depend on it through [`Injection::reference_role`](crate::Injection::reference_role),
    /// the host looks it up with [`Container::role`].
    pub fn role(mut self, role: impl Into<String>, key: impl Into<ComponentKey>) -> Self {
        self.roles.insert(role.into(), key.into());
        self
    }

    pub fn edge_policy(mut self, policy: EdgePolicy) -> Self {
        self.edge_policy = policy;
        self
    }

    /// Fails the bring-up if a single stage takes longer than `timeout`
    pub fn stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = Some(timeout);
        self
    }

    /// The registry which will be brought up
    ///
    /// Defaults go first so candidates can override them. With roots, the registry is
    /// restricted to the components the roots and defaults reach.
    pub fn resolve_registry(&self) -> Result<Registry, GraphError> {
        let mut merged = self
            .candidates
            .clone()
            .with_defaults(self.defaults.iter().cloned());
        for (role, key) in &self.roles {
            merged.assign_role(role.clone(), key.clone());
        }
        if self.roots.is_empty() {
            return Ok(merged);
        }

        let default_keys: BTreeSet<ComponentKey> = self
            .defaults
            .iter()
            .map(|descriptor| descriptor.key().clone())
            .collect();
        let default_roots: Vec<RootConsumer> = default_keys
            .iter()
            .filter_map(|key| merged.get(key))
            .map(RootConsumer::from_descriptor)
            .collect();

        let mut keys = collect_closure(&merged, self.roots.iter().chain(&default_roots))?;
        keys.extend(default_keys);

        let restricted = merged.restrict(&keys);
        tracing::debug!(
            "Roots need {} of {} registered components",
            restricted.len(),
            merged.len()
        );
        Ok(restricted)
    }

    /// Builds and checks the dependency graph and computes the stages without bringing
    /// anything up
    pub fn plan(&self) -> Result<Plan, BringUpError> {
        let registry = self.resolve_registry()?;
        let graph = DependencyGraph::with_policy(&registry, self.edge_policy)?;
        let stages = graph.stages()?;

        for (role, key) in &self.roles {
            if !graph.contains(key) {
                return Err(BringUpError::UnknownRole {
                    role: role.clone(),
                    key: key.clone(),
                });
            }
        }

        tracing::debug!(
            "Planned {} components in {} stages",
            stages.component_count(),
            stages.len()
        );
        Ok(Plan { graph, stages })
    }

    /// Brings up every planned component, stage by stage
    pub async fn build(self) -> Result<Container, BringUpError> {
        let plan = self.plan()?;
        let ctx = ResolveContext {
            config: Arc::new(self.config),
            externals: self.externals,
            value_store: self.value_store,
            roles: self.roles,
        };
        BringUpInitiator::new(plan, ctx, self.stage_timeout)
            .initiate()
            .await
    }
}
