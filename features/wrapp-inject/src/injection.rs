//! Declarations of what a component needs injected.
//!
//! A component maps each of its properties to one [`Injection`]. Declarations are plain
//! data built with the constructors on [`Injection`]; nothing is validated or resolved
//! until a bring-up run picks them up.

use std::{collections::BTreeMap, fmt, future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};
use wrapp_config::ConfigProvider;

use crate::{
    slots::{SharedSlot, Signal, Slot, ValueStore},
    types::{ComponentKey, DynError, Injectable, Instance, TypeInfo},
};

/// Maps a live dependency to the value actually injected
pub type Transform = Arc<dyn Fn(Instance) -> Result<Instance, DynError> + Send + Sync>;
/// Produces a value from a present configuration value
pub type StrictFactory = Arc<
    dyn Fn(String, Arc<ConfigProvider>) -> BoxFuture<'static, Result<Instance, DynError>>
        + Send
        + Sync,
>;
/// Produces a value from a possibly absent configuration value
pub type OptionalFactory = Arc<
    dyn Fn(Option<String>, Arc<ConfigProvider>) -> BoxFuture<'static, Result<Instance, DynError>>
        + Send
        + Sync,
>;
/// Produces a value from the configuration alone
pub type ComputedFactory =
    Arc<dyn Fn(Arc<ConfigProvider>) -> BoxFuture<'static, Result<Instance, DynError>> + Send + Sync>;
/// Produces a fresh process-local value
pub type ValueInit = Arc<dyn Fn() -> Instance + Send + Sync>;
/// Binds a shared slot to its name inside a value store
pub type SharedSlotInit = Arc<dyn Fn(String, Arc<dyn ValueStore>) -> Instance + Send + Sync>;

/// The component a reference points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The component registered with this type
    Type(TypeInfo),
    /// The component registered under this key
    Key(ComponentKey),
    /// The component assigned to this role
    Role(String),
}
impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Type(info) => f.write_str(info.type_name),
            Target::Key(key) => f.write_str(key),
            Target::Role(role) => write!(f, "role '{role}'"),
        }
    }
}

/// How an environment value is read
#[derive(Clone)]
pub enum EnvRead {
    /// Fails the bring-up if the key is not set
    Strict(Option<StrictFactory>),
    /// Tolerates the key being absent
    Optional(Option<OptionalFactory>),
}

#[derive(Clone)]
pub enum InjectionKind {
    Reference {
        target: Target,
        transform: Option<Transform>,
    },
    ExternalUse,
    Environment {
        key: String,
        read: EnvRead,
    },
    Computed {
        factory: ComputedFactory,
    },
    LocalSlot {
        initial: ValueInit,
    },
    SharedSlot {
        default: SharedSlotInit,
    },
    Signal {
        initial: ValueInit,
    },
}
impl InjectionKind {
    pub fn name(&self) -> &'static str {
        match self {
            InjectionKind::Reference { .. } => "reference",
            InjectionKind::ExternalUse => "external-use",
            InjectionKind::Environment { .. } => "environment",
            InjectionKind::Computed { .. } => "computed",
            InjectionKind::LocalSlot { .. } => "local-slot",
            InjectionKind::SharedSlot { .. } => "shared-slot",
            InjectionKind::Signal { .. } => "signal",
        }
    }
}

/// Declares how one property of a component is resolved
#[derive(Clone)]
pub struct Injection {
    kind: InjectionKind,
    aliases: Vec<String>,
}

impl fmt::Debug for Injection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Injection");
        debug.field("kind", &self.kind.name());
        match &self.kind {
            InjectionKind::Reference { target, transform } => {
                debug
                    .field("target", &target.to_string())
                    .field("transformed", &transform.is_some());
            }
            InjectionKind::Environment { key, read } => {
                debug
                    .field("key", key)
                    .field("strict", &matches!(read, EnvRead::Strict(_)));
            }
            _ => {}
        }
        if !self.aliases.is_empty() {
            debug.field("aliases", &self.aliases);
        }
        debug.finish()
    }
}

impl Injection {
    fn of(kind: InjectionKind) -> Self {
        Injection {
            kind,
            aliases: Vec::new(),
        }
    }

    /// Hard dependency on the component registered with type `T`
    pub fn reference<T: Injectable>() -> Self {
        Self::of(InjectionKind::Reference {
            target: Target::Type(TypeInfo::of::<T>()),
            transform: None,
        })
    }

    /// Hard dependency on the component registered under `key`
    pub fn reference_key(key: impl Into<ComponentKey>) -> Self {
        Self::of(InjectionKind::Reference {
            target: Target::Key(key.into()),
            transform: None,
        })
    }

    /// Hard dependency on `T`, injecting `transform(dependency)` instead of the dependency itself
    pub fn reference_with<T, U, F>(transform: F) -> Self
    where
        T: Injectable,
        U: Injectable,
        F: Fn(Arc<T>) -> U + Send + Sync + 'static,
    {
        Self::of(InjectionKind::Reference {
            target: Target::Type(TypeInfo::of::<T>()),
            transform: Some(typed_transform(transform)),
        })
    }

    /// Hard dependency on the component under `key`, injecting `transform(dependency)`
    pub fn reference_key_with<T, U, F>(key: impl Into<ComponentKey>, transform: F) -> Self
    where
        T: Injectable,
        U: Injectable,
        F: Fn(Arc<T>) -> U + Send + Sync + 'static,
    {
        Self::of(InjectionKind::Reference {
            target: Target::Key(key.into()),
            transform: Some(typed_transform(transform)),
        })
    }

    /// Hard dependency on the component assigned to `role`
    pub fn reference_role(role: impl Into<String>) -> Self {
        Self::of(InjectionKind::Reference {
            target: Target::Role(role.into()),
            transform: None,
        })
    }

    /// Hard dependency on the component assigned to `role`, injecting `transform(dependency)`
    pub fn reference_role_with<T, U, F>(role: impl Into<String>, transform: F) -> Self
    where
        T: Injectable,
        U: Injectable,
        F: Fn(Arc<T>) -> U + Send + Sync + 'static,
    {
        Self::of(InjectionKind::Reference {
            target: Target::Role(role.into()),
            transform: Some(typed_transform(transform)),
        })
    }

    /// Value supplied by the host under the property name
    pub fn external_use() -> Self {
        Self::of(InjectionKind::ExternalUse)
    }

    /// The raw configuration value of `key` as a `String`; fails if not set
    pub fn env(key: impl Into<String>) -> Self {
        Self::of(InjectionKind::Environment {
            key: key.into(),
            read: EnvRead::Strict(None),
        })
    }

    /// `factory(raw, config)` for the configuration value of `key`; fails if not set
    pub fn env_with<U, E, Fut, F>(key: impl Into<String>, factory: F) -> Self
    where
        U: Injectable,
        E: Into<DynError>,
        Fut: Future<Output = Result<U, E>> + Send + 'static,
        F: Fn(String, Arc<ConfigProvider>) -> Fut + Send + Sync + 'static,
    {
        let factory: StrictFactory =
            Arc::new(move |raw, config| erase_output(factory(raw, config)));
        Self::of(InjectionKind::Environment {
            key: key.into(),
            read: EnvRead::Strict(Some(factory)),
        })
    }

    /// The raw configuration value of `key` as a `String`, left unset when absent
    pub fn env_optional(key: impl Into<String>) -> Self {
        Self::of(InjectionKind::Environment {
            key: key.into(),
            read: EnvRead::Optional(None),
        })
    }

    /// `factory(raw, config)` for the possibly absent configuration value of `key`
    pub fn env_optional_with<U, E, Fut, F>(key: impl Into<String>, factory: F) -> Self
    where
        U: Injectable,
        E: Into<DynError>,
        Fut: Future<Output = Result<U, E>> + Send + 'static,
        F: Fn(Option<String>, Arc<ConfigProvider>) -> Fut + Send + Sync + 'static,
    {
        let factory: OptionalFactory =
            Arc::new(move |raw, config| erase_output(factory(raw, config)));
        Self::of(InjectionKind::Environment {
            key: key.into(),
            read: EnvRead::Optional(Some(factory)),
        })
    }

    /// Value produced purely from the configuration
    pub fn computed<U, E, Fut, F>(factory: F) -> Self
    where
        U: Injectable,
        E: Into<DynError>,
        Fut: Future<Output = Result<U, E>> + Send + 'static,
        F: Fn(Arc<ConfigProvider>) -> Fut + Send + Sync + 'static,
    {
        let factory: ComputedFactory = Arc::new(move |config| erase_output(factory(config)));
        Self::of(InjectionKind::Computed { factory })
    }

    /// A process-local [`Slot`] starting at `initial`
    pub fn local_slot<T: Injectable + Clone>(initial: T) -> Self {
        Self::of(InjectionKind::LocalSlot {
            initial: Arc::new(move || Instance::new(Slot::new(initial.clone()))),
        })
    }

    /// A [`SharedSlot`] backed by the run's value store, seeded with `default`
    pub fn shared_slot<T: Injectable + Clone>(default: T) -> Self {
        Self::of(InjectionKind::SharedSlot {
            default: Arc::new(move |name, store| {
                Instance::new(SharedSlot::bind(name, store, default.clone()))
            }),
        })
    }

    /// A process-local [`Signal`] starting at `initial`
    pub fn signal<T: Injectable + Clone>(initial: T) -> Self {
        Self::of(InjectionKind::Signal {
            initial: Arc::new(move || Instance::new(Signal::new(initial.clone()))),
        })
    }

    /// Also populate `alias` with the resolved value
    pub fn also(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn kind(&self) -> &InjectionKind {
        &self.kind
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// The reference target, if this is a reference
    pub fn target(&self) -> Option<&Target> {
        match &self.kind {
            InjectionKind::Reference { target, .. } => Some(target),
            _ => None,
        }
    }
}

fn typed_transform<T, U, F>(transform: F) -> Transform
where
    T: Injectable,
    U: Injectable,
    F: Fn(Arc<T>) -> U + Send + Sync + 'static,
{
    Arc::new(move |instance: Instance| -> Result<Instance, DynError> {
        let dependency = instance.downcast::<T>().map_err(|actual| -> DynError {
            format!(
                "transform expects '{}' but the dependency is '{actual}'",
                std::any::type_name::<T>()
            )
            .into()
        })?;
        Ok(Instance::new(transform(dependency)))
    })
}

fn erase_output<U, E, Fut>(future: Fut) -> BoxFuture<'static, Result<Instance, DynError>>
where
    U: Injectable,
    E: Into<DynError>,
    Fut: Future<Output = Result<U, E>> + Send + 'static,
{
    future
        .map(|result| result.map(Instance::new).map_err(Into::<DynError>::into))
        .boxed()
}

/// Property name → [`Injection`] for one component
#[derive(Clone, Default, Debug)]
pub struct Injections {
    map: BTreeMap<String, Injection>,
}

impl Injections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `property`, replacing any earlier declaration of it
    pub fn with(mut self, property: impl Into<String>, injection: Injection) -> Self {
        self.insert(property, injection);
        self
    }

    pub fn insert(&mut self, property: impl Into<String>, injection: Injection) -> Option<Injection> {
        self.map.insert(property.into(), injection)
    }

    pub fn get(&self, property: &str) -> Option<&Injection> {
        self.map.get(property)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Injection)> {
        self.map.iter()
    }

    /// All `reference` declarations as (property, target)
    pub fn references(&self) -> impl Iterator<Item = (&String, &Target)> {
        self.map
            .iter()
            .filter_map(|(property, injection)| injection.target().map(|target| (property, target)))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<P: Into<String>> FromIterator<(P, Injection)> for Injections {
    fn from_iter<I: IntoIterator<Item = (P, Injection)>>(iter: I) -> Self {
        let mut injections = Injections::new();
        for (property, injection) in iter {
            injections.insert(property, injection);
        }
        injections
    }
}
