//! Turns the declared injections of one component into concrete values.
//!
//! Every property resolves concurrently against the live registry of the earlier stages,
//! the host's external values and the configuration. The result is a plain [`Resolved`]
//! map which the component takes its values from in [`Component::wire`](crate::Component::wire).

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

use futures::{
    future::{self, BoxFuture},
    stream::FuturesUnordered,
    FutureExt, StreamExt,
};
use wrapp_config::ConfigProvider;

use crate::{
    container::LiveRegistry,
    dependency_graph::GraphNode,
    errors::{ComponentError, InjectError, ResolveError},
    injection::{EnvRead, Injection, InjectionKind},
    slots::{MemoryValueStore, ValueStore},
    types::{ComponentKey, Injectable, Instance},
};

/// Values supplied by the host, looked up by property name
#[derive(Clone, Default, Debug)]
pub struct ExternalValues {
    values: HashMap<String, Instance>,
}

impl ExternalValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Injectable>(mut self, name: impl Into<String>, value: T) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert<T: Injectable>(&mut self, name: impl Into<String>, value: T) -> Option<Instance> {
        self.insert_instance(name, Instance::new(value))
    }

    pub fn insert_instance(&mut self, name: impl Into<String>, instance: Instance) -> Option<Instance> {
        self.values.insert(name.into(), instance)
    }

    pub fn get(&self, name: &str) -> Option<&Instance> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Everything besides live components an injection may be resolved from
#[derive(Clone)]
pub struct ResolveContext {
    pub config: Arc<ConfigProvider>,
    pub externals: ExternalValues,
    pub value_store: Arc<dyn ValueStore>,
    /// Role → key of the component assigned to it
    pub roles: BTreeMap<String, ComponentKey>,
}

impl ResolveContext {
    /// Key of the component assigned to `role`
    pub fn role_key(&self, role: &str) -> Option<&ComponentKey> {
        self.roles.get(role)
    }

    /// The already live component assigned to `role`
    pub fn live_role<'l>(&self, role: &str, live: &'l LiveRegistry) -> Option<&'l Instance> {
        self.role_key(role).and_then(|key| live.get(key))
    }
}

impl Default for ResolveContext {
    fn default() -> Self {
        ResolveContext {
            config: Arc::new(ConfigProvider::default()),
            externals: ExternalValues::default(),
            value_store: Arc::new(MemoryValueStore::new()),
            roles: BTreeMap::new(),
        }
    }
}

impl fmt::Debug for ResolveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveContext")
            .field("config", &self.config)
            .field("externals", &self.externals)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

/// Resolved values of one component, by property name
#[derive(Debug)]
pub struct Resolved {
    component: ComponentKey,
    values: BTreeMap<String, Instance>,
}

impl Resolved {
    pub fn new(component: impl Into<ComponentKey>) -> Self {
        Resolved {
            component: component.into(),
            values: BTreeMap::new(),
        }
    }

    /// Key of the component these values belong to
    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn insert(&mut self, property: impl Into<String>, value: Instance) -> Option<Instance> {
        self.values.insert(property.into(), value)
    }

    /// Takes a value which must have been resolved
    pub fn take<T: Injectable>(&mut self, property: &str) -> Result<Arc<T>, InjectError> {
        self.take_optional(property)?.ok_or_else(|| InjectError::Missing {
            property: property.to_string(),
        })
    }

    /// Takes a value which may be absent, like an unset optional environment key
    pub fn take_optional<T: Injectable>(
        &mut self,
        property: &str,
    ) -> Result<Option<Arc<T>>, InjectError> {
        let Some(instance) = self.values.remove(property) else {
            return Ok(None);
        };
        instance
            .downcast()
            .map(Some)
            .map_err(|actual| InjectError::DowncastFailed {
                property: property.to_string(),
                required: std::any::type_name::<T>(),
                actual,
            })
    }

    /// Takes a clone of the value, handy for handles like slots and signals
    pub fn take_cloned<T: Injectable + Clone>(&mut self, property: &str) -> Result<T, InjectError> {
        self.take::<T>(property).map(|value| T::clone(&value))
    }

    pub fn get(&self, property: &str) -> Option<&Instance> {
        self.values.get(property)
    }

    pub fn contains(&self, property: &str) -> bool {
        self.values.contains_key(property)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Resolves all injections of `node` concurrently
///
/// Fails with the first property which could not be resolved, tagged with the component
/// key and the property name.
pub async fn resolve_injections(
    node: &GraphNode,
    live: &LiveRegistry,
    ctx: &ResolveContext,
) -> Result<Resolved, ComponentError> {
    let mut pending: FuturesUnordered<_> = node
        .descriptor
        .injections()
        .iter()
        .map(|(property, injection)| {
            resolve_property(node, property, injection, live, ctx)
                .map(move |result| (property, injection, result))
        })
        .collect();

    let mut resolved = Resolved::new(node.key.clone());
    while let Some((property, injection, result)) = pending.next().await {
        let value = result.map_err(|source| ComponentError::Resolution {
            component: node.key.clone(),
            property: property.clone(),
            source,
        })?;

        // Absent optional values leave the property unset
        let Some(value) = value else {
            continue;
        };
        for alias in injection.aliases() {
            resolved.insert(alias.clone(), value.clone());
        }
        resolved.insert(property.clone(), value);
    }

    tracing::debug!("Resolved {} values for '{}'", resolved.len(), node.key);
    Ok(resolved)
}

fn resolve_property(
    node: &GraphNode,
    property: &str,
    injection: &Injection,
    live: &LiveRegistry,
    ctx: &ResolveContext,
) -> BoxFuture<'static, Result<Option<Instance>, ResolveError>> {
    match injection.kind() {
        InjectionKind::Reference { transform, .. } => {
            let dependency = node
                .references
                .get(property)
                .and_then(|key| live.get(key).cloned())
                .ok_or_else(|| ResolveError::MissingReference {
                    target: node
                        .references
                        .get(property)
                        .cloned()
                        .unwrap_or_else(|| property.to_string()),
                });
            let value = dependency.and_then(|dependency| match transform {
                Some(transform) => {
                    transform(dependency).map_err(|error| ResolveError::Transform(Arc::new(error)))
                }
                None => Ok(dependency),
            });
            ready(value.map(Some))
        }
        InjectionKind::ExternalUse => {
            let value = ctx.externals.get(property).cloned().or_else(|| {
                node.conventions
                    .contains(property)
                    .then(|| live.get(property).cloned())
                    .flatten()
            });
            ready(Ok(value))
        }
        InjectionKind::Environment { key, read } => {
            let raw = ctx.config.value(key).map(str::to_string);
            match read {
                EnvRead::Strict(factory) => {
                    let Some(raw) = raw else {
                        return ready(Err(ResolveError::MissingEnvironment { key: key.clone() }));
                    };
                    match factory {
                        Some(factory) => factory(raw, ctx.config.clone())
                            .map(factory_result)
                            .boxed(),
                        None => ready(Ok(Some(Instance::new(raw)))),
                    }
                }
                EnvRead::Optional(factory) => match factory {
                    Some(factory) => factory(raw, ctx.config.clone())
                        .map(factory_result)
                        .boxed(),
                    None => ready(Ok(raw.map(Instance::new))),
                },
            }
        }
        InjectionKind::Computed { factory } => {
            factory(ctx.config.clone()).map(factory_result).boxed()
        }
        InjectionKind::LocalSlot { initial } | InjectionKind::Signal { initial } => {
            ready(Ok(Some(initial())))
        }
        InjectionKind::SharedSlot { default } => {
            let name = format!("{}.{property}", node.key);
            ready(Ok(Some(default(name, ctx.value_store.clone()))))
        }
    }
}

fn ready(
    result: Result<Option<Instance>, ResolveError>,
) -> BoxFuture<'static, Result<Option<Instance>, ResolveError>> {
    future::ready(result).boxed()
}

fn factory_result(
    result: Result<Instance, crate::types::DynError>,
) -> Result<Option<Instance>, ResolveError> {
    result
        .map(Some)
        .map_err(|error| ResolveError::Factory(Arc::new(error)))
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, convert::Infallible};

    use futures::executor::block_on;
    use wrapp_config::GetConfigError;

    use super::*;
    use crate::{
        component::ComponentDescriptor,
        injection::Injections,
        slots::{SharedSlot, Signal, Slot},
    };

    fn graph_node(key: &str, injections: Injections) -> GraphNode {
        let references = injections
            .references()
            .map(|(property, target)| (property.clone(), target.to_string()))
            .collect::<BTreeMap<_, _>>();
        GraphNode {
            key: key.to_string(),
            dependencies: references.values().cloned().collect(),
            references,
            conventions: BTreeSet::new(),
            descriptor: ComponentDescriptor::from_fn(key, injections, |_| async {
                Ok::<_, Infallible>(())
            }),
        }
    }

    #[test]
    fn references_are_transformed_and_aliased() {
        let node = graph_node(
            "queue",
            Injections::new()
                .with("cache", Injection::reference_key("cache").also("store"))
                .with(
                    "cache_size",
                    Injection::reference_key_with("cache", |cache: Arc<Vec<u8>>| cache.len()),
                ),
        );
        let mut live = LiveRegistry::new();
        live.insert("cache".into(), Instance::new(vec![1u8, 2, 3]));

        let mut resolved = block_on(resolve_injections(&node, &live, &ResolveContext::default())).unwrap();

        assert_eq!(*resolved.take::<usize>("cache_size").unwrap(), 3);
        assert_eq!(resolved.take::<Vec<u8>>("store").unwrap().len(), 3);
        assert!(resolved.contains("cache"));
    }

    #[test]
    fn missing_strict_environment_names_the_key() {
        let node = graph_node(
            "client",
            Injections::new().with("token", Injection::env("API_TOKEN")),
        );

        let error = block_on(resolve_injections(
            &node,
            &LiveRegistry::new(),
            &ResolveContext::default(),
        ))
        .unwrap_err();

        assert!(matches!(
            error,
            ComponentError::Resolution {
                ref component,
                ref property,
                source: ResolveError::MissingEnvironment { ref key },
            } if component == "client" && property == "token" && key == "API_TOKEN"
        ));
    }

    #[test]
    fn environment_factories_see_raw_value_and_config() {
        let node = graph_node(
            "client",
            Injections::new()
                .with(
                    "port",
                    Injection::env_with("PORT", |raw, _| async move { raw.parse::<u16>() }),
                )
                .with(
                    "region",
                    Injection::env_optional_with("REGION", |raw, config| async move {
                        let fallback = config.value("DEFAULT_REGION").unwrap_or("local").to_string();
                        Ok::<_, Infallible>(raw.unwrap_or(fallback))
                    }),
                )
                .with("proxy", Injection::env_optional("PROXY"))
                .with(
                    "base_url",
                    Injection::computed(|config| async move {
                        let host = config.require_value("HOST")?.to_string();
                        Ok::<_, GetConfigError>(format!("https://{host}"))
                    }),
                ),
        );
        let ctx = ResolveContext {
            config: Arc::new(
                ConfigProvider::new()
                    .with_value("PORT", "8080")
                    .with_value("DEFAULT_REGION", "eu")
                    .with_value("HOST", "example.org"),
            ),
            ..ResolveContext::default()
        };

        let mut resolved = block_on(resolve_injections(&node, &LiveRegistry::new(), &ctx)).unwrap();

        assert_eq!(*resolved.take::<u16>("port").unwrap(), 8080);
        assert_eq!(resolved.take::<String>("region").unwrap().as_str(), "eu");
        assert!(resolved.take_optional::<String>("proxy").unwrap().is_none());
        assert_eq!(
            resolved.take::<String>("base_url").unwrap().as_str(),
            "https://example.org"
        );
    }

    #[test]
    fn failing_factory_is_tagged_with_the_property() {
        let node = graph_node(
            "client",
            Injections::new().with(
                "port",
                Injection::env_with("PORT", |raw, _| async move { raw.parse::<u16>() }),
            ),
        );
        let ctx = ResolveContext {
            config: Arc::new(ConfigProvider::new().with_value("PORT", "eighty")),
            ..ResolveContext::default()
        };

        let error = block_on(resolve_injections(&node, &LiveRegistry::new(), &ctx)).unwrap_err();
        assert!(matches!(
            error,
            ComponentError::Resolution { ref property, source: ResolveError::Factory(_), .. }
                if property == "port"
        ));
    }

    #[test]
    fn external_use_prefers_host_values_and_tolerates_absence() {
        let mut node = graph_node(
            "consumer",
            Injections::new()
                .with("logging", Injection::external_use())
                .with("clock", Injection::external_use())
                .with("secret", Injection::external_use()),
        );
        node.conventions.insert("logging".into());
        node.dependencies.insert("logging".into());

        let mut live = LiveRegistry::new();
        live.insert("logging".into(), Instance::new("live logger"));
        let ctx = ResolveContext {
            externals: ExternalValues::new().with("clock", 1_700_000_000u64),
            ..ResolveContext::default()
        };

        let mut resolved = block_on(resolve_injections(&node, &live, &ctx)).unwrap();
        assert_eq!(*resolved.take::<&str>("logging").unwrap(), "live logger");
        assert_eq!(*resolved.take::<u64>("clock").unwrap(), 1_700_000_000);
        assert!(!resolved.contains("secret"));
    }

    #[test]
    fn slots_and_signals_get_their_initial_values() {
        let node = graph_node(
            "cache",
            Injections::new()
                .with("hits", Injection::local_slot(0u64))
                .with("size", Injection::shared_slot(64usize))
                .with("status", Injection::signal("cold")),
        );
        let ctx = ResolveContext::default();

        let mut resolved = block_on(resolve_injections(&node, &LiveRegistry::new(), &ctx)).unwrap();

        assert_eq!(resolved.take_cloned::<Slot<u64>>("hits").unwrap().get(), 0);
        let size = resolved.take_cloned::<SharedSlot<usize>>("size").unwrap();
        assert_eq!(size.name(), "cache.size");
        assert_eq!(
            ctx.value_store
                .load("cache.size")
                .and_then(|value| value.downcast::<usize>().ok())
                .map(|value| *value),
            Some(64)
        );
        assert_eq!(resolved.take_cloned::<Signal<&str>>("status").unwrap().get(), "cold");
    }

    #[test]
    fn take_reports_wrong_types() {
        let mut resolved = Resolved::new("cache");
        resolved.insert("size", Instance::new(3u8));

        let error = resolved.take::<u64>("size").unwrap_err();
        assert!(matches!(
            error,
            InjectError::DowncastFailed { required: "u64", actual: "u8", .. }
        ));
        assert!(matches!(
            resolved.take::<u8>("size"),
            Err(InjectError::Missing { .. })
        ));
    }

    #[test]
    fn roles_look_up_live_components() {
        let mut live = LiveRegistry::new();
        live.insert("redis".into(), Instance::new(64usize));
        let ctx = ResolveContext {
            roles: BTreeMap::from([
                ("cache".to_string(), "redis".to_string()),
                ("queue".to_string(), "kafka".to_string()),
            ]),
            ..ResolveContext::default()
        };

        assert_eq!(ctx.role_key("cache").map(String::as_str), Some("redis"));
        let cache = ctx.live_role("cache", &live).unwrap();
        assert_eq!(*cache.downcast::<usize>().unwrap(), 64);
        assert!(ctx.live_role("queue", &live).is_none());
        assert!(ctx.live_role("search", &live).is_none());
    }
}
