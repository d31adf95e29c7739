use std::collections::{BTreeMap, BTreeSet};

use crate::{
    component::{Component, ComponentDescriptor},
    errors::GraphError,
    injection::Target,
    types::ComponentKey,
};

/// The candidate components of one application, addressed by key
///
/// Registries are plain values: every bring-up run gets its own, there is no process wide state.
#[derive(Clone, Default, Debug)]
pub struct Registry {
    components: BTreeMap<ComponentKey, ComponentDescriptor>,
    roles: BTreeMap<String, ComponentKey>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor, returning the one it replaced under the same key
    pub fn register(&mut self, descriptor: ComponentDescriptor) -> Option<ComponentDescriptor> {
        let replaced = self
            .components
            .insert(descriptor.key().clone(), descriptor);
        if let Some(replaced) = &replaced {
            tracing::debug!("Replaced registered component '{}'", replaced.key());
        }
        replaced
    }

    pub fn with(mut self, descriptor: ComponentDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    /// Registers `T` under its default key
    pub fn component<T: Component>(self) -> Self {
        self.with(ComponentDescriptor::of::<T>())
    }

    /// Assigns the component under `key` to `role`, returning the previous assignment
    pub fn assign_role(
        &mut self,
        role: impl Into<String>,
        key: impl Into<ComponentKey>,
    ) -> Option<ComponentKey> {
        self.roles.insert(role.into(), key.into())
    }

    pub fn with_role(mut self, role: impl Into<String>, key: impl Into<ComponentKey>) -> Self {
        self.assign_role(role, key);
        self
    }

    /// Key assigned to `role`, which need not be registered
    pub fn role(&self, role: &str) -> Option<&ComponentKey> {
        self.roles.get(role)
    }

    pub fn roles(&self) -> &BTreeMap<String, ComponentKey> {
        &self.roles
    }

    /// Prepends framework defaults: a default is only kept if no candidate uses its key
    pub fn with_defaults(self, defaults: impl IntoIterator<Item = ComponentDescriptor>) -> Self {
        let Registry { components, roles } = self;
        let mut merged = Registry {
            components: BTreeMap::new(),
            roles,
        };
        for default in defaults {
            merged.components.insert(default.key().clone(), default);
        }
        for (key, descriptor) in components {
            if merged.components.insert(key, descriptor).is_some() {
                tracing::debug!("Candidate overrides the default component");
            }
        }
        merged
    }

    /// Only the components whose keys are in `keys`, role assignments are kept
    pub fn restrict(&self, keys: &BTreeSet<ComponentKey>) -> Registry {
        Registry {
            components: self
                .components
                .iter()
                .filter(|(key, _)| keys.contains(*key))
                .map(|(key, descriptor)| (key.clone(), descriptor.clone()))
                .collect(),
            roles: self.roles.clone(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ComponentDescriptor> {
        self.components.get(key)
    }

    /// The registered key equal to `key` together with its descriptor
    pub fn get_key_value(&self, key: &str) -> Option<(&ComponentKey, &ComponentDescriptor)> {
        self.components.get_key_value(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.components.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ComponentKey> {
        self.components.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ComponentKey, &ComponentDescriptor)> {
        self.components.iter()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Resolves the target of `consumer`'s reference `property` to a registered key
    pub fn resolve_target(
        &self,
        consumer: &str,
        property: &str,
        target: &Target,
    ) -> Result<&ComponentKey, GraphError> {
        let missing = || GraphError::MissingDependency {
            consumer: consumer.to_string(),
            property: property.to_string(),
            target: target.to_string(),
        };

        match target {
            Target::Key(key) => self.get_key_value(key).map(|(key, _)| key).ok_or_else(missing),
            Target::Role(role) => self
                .role(role)
                .and_then(|key| self.get_key_value(key))
                .map(|(key, _)| key)
                .ok_or_else(missing),
            Target::Type(info) => {
                let mut matches = self.components.iter().filter(|(_, descriptor)| {
                    descriptor
                        .type_info()
                        .is_some_and(|registered| registered.satisfies(info))
                });

                let (key, _) = matches.next().ok_or_else(missing)?;
                let others: Vec<_> = matches.map(|(key, _)| key.clone()).collect();
                if !others.is_empty() {
                    let mut candidates = vec![key.clone()];
                    candidates.extend(others);
                    return Err(GraphError::AmbiguousReference {
                        consumer: consumer.to_string(),
                        property: property.to_string(),
                        target: target.to_string(),
                        candidates,
                    });
                }
                Ok(key)
            }
        }
    }
}

impl FromIterator<ComponentDescriptor> for Registry {
    fn from_iter<I: IntoIterator<Item = ComponentDescriptor>>(iter: I) -> Self {
        let mut registry = Registry::new();
        for descriptor in iter {
            registry.register(descriptor);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        errors::InjectError,
        injection::{Injection, Injections},
        resolver::Resolved,
        types::{DynError, TypeInfo},
    };

    struct Cache;
    impl Component for Cache {
        const KEY: &'static str = "cache";

        fn injections() -> Injections {
            Injections::new()
        }

        fn construct() -> Result<Self, DynError> {
            Ok(Cache)
        }

        fn wire(&mut self, _: &mut Resolved) -> Result<(), InjectError> {
            Ok(())
        }
    }

    fn stub(key: &str) -> ComponentDescriptor {
        ComponentDescriptor::from_fn(key, Injections::new(), |_| async { Ok::<_, Infallible>(()) })
    }

    #[test]
    fn candidates_override_defaults() {
        let default_cache = stub("cache");
        let registry = Registry::new()
            .component::<Cache>()
            .with_defaults([default_cache, stub("logging")]);

        assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["cache", "logging"]);
        assert_eq!(
            registry.get("cache").unwrap().type_info(),
            Some(TypeInfo::of::<Cache>())
        );
    }

    #[test]
    fn resolves_targets_by_type_and_key() {
        let registry = Registry::new().component::<Cache>().with(stub("queue"));

        let by_type = registry
            .resolve_target("queue", "cache", &Target::Type(TypeInfo::of::<Cache>()))
            .unwrap();
        assert_eq!(by_type, "cache");

        let by_key = registry
            .resolve_target("cache", "queue", &Target::Key("queue".into()))
            .unwrap();
        assert_eq!(by_key, "queue");
    }

    #[test]
    fn missing_target_names_consumer_property_and_target() {
        let registry = Registry::new().with(stub("queue"));
        let error = registry
            .resolve_target("queue", "store", Injection::reference::<Cache>().target().unwrap())
            .unwrap_err();

        assert_eq!(
            error,
            GraphError::MissingDependency {
                consumer: "queue".into(),
                property: "store".into(),
                target: std::any::type_name::<Cache>().into(),
            }
        );
    }

    #[test]
    fn type_registered_twice_is_ambiguous() {
        let registry = Registry::new()
            .with(ComponentDescriptor::keyed::<Cache>("primary"))
            .with(ComponentDescriptor::keyed::<Cache>("replica"));

        let error = registry
            .resolve_target("queue", "cache", &Target::Type(TypeInfo::of::<Cache>()))
            .unwrap_err();
        assert!(matches!(
            error,
            GraphError::AmbiguousReference { candidates, .. } if candidates == ["primary", "replica"]
        ));
    }

    #[test]
    fn restrict_keeps_only_listed_keys() {
        let registry: Registry = ["a", "b", "c"].into_iter().map(stub).collect();
        let keys = BTreeSet::from(["a".to_string(), "c".to_string(), "z".to_string()]);

        let restricted = registry.restrict(&keys);
        assert_eq!(restricted.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn role_targets_follow_the_assignment() {
        let registry = Registry::new()
            .with(stub("redis"))
            .with_role("cache", "redis")
            .with_role("search", "elastic")
            .with_defaults([stub("logging")]);

        let target = Target::Role("cache".into());
        assert_eq!(registry.resolve_target("queue", "store", &target).unwrap(), "redis");

        let unassigned = registry
            .resolve_target("queue", "index", &Target::Role("search".into()))
            .unwrap_err();
        assert_eq!(
            unassigned,
            GraphError::MissingDependency {
                consumer: "queue".into(),
                property: "index".into(),
                target: "role 'search'".into(),
            }
        );

        let restricted = registry.restrict(&BTreeSet::from(["redis".to_string()]));
        assert_eq!(restricted.role("cache").map(String::as_str), Some("redis"));
    }
}
