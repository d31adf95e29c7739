use std::{future::Future, marker::PhantomData, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    errors::{ComponentError, InjectError},
    injection::Injections,
    resolver::Resolved,
    types::{ComponentKey, DynError, Injectable, Instance, TypeInfo},
};

/// A component which can be brought up by the orchestrator
///
/// The lifecycle of every component is:
/// 1. [`Component::construct`] builds the unwired instance
/// 2. the declared [`Component::injections`] are resolved
/// 3. [`Component::wire`] takes the resolved values
/// 4. [`Component::init`] runs once all of the above succeeded
/// 5. the instance is published and later [`Component::teardown`] runs on shutdown
pub trait Component: Injectable + Sized {
    /// Key the component is registered under by default
    const KEY: &'static str;

    /// Property name → how it is resolved
    fn injections() -> Injections;

    /// Constructs the unwired instance
    fn construct() -> Result<Self, DynError>;

    /// Takes the resolved values of the declared injections
    fn wire(&mut self, resolved: &mut Resolved) -> Result<(), InjectError>;

    /// Post-construction hook, called after wiring and before publishing
    fn init(&mut self) -> impl Future<Output = Result<(), DynError>> + Send + '_ {
        async { Ok(()) }
    }

    /// Called in reverse stage order on shutdown or when a bring-up is rolled back
    fn teardown(&self) -> impl Future<Output = Result<(), DynError>> + Send + '_ {
        async { Ok(()) }
    }
}

pub type Teardown = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), DynError>> + Send>;

/// A component after its post-construction hook completed
pub struct Published {
    pub instance: Instance,
    pub teardown: Option<Teardown>,
}

/// Failure of an unwired component after resolution
pub enum StartError {
    Wire(InjectError),
    Init(DynError),
}
impl StartError {
    pub(crate) fn for_component(self, component: &str) -> ComponentError {
        let component = component.to_string();
        match self {
            StartError::Wire(source) => ComponentError::Wire { component, source },
            StartError::Init(error) => ComponentError::Init {
                component,
                error: Arc::new(error),
            },
        }
    }
}

/// Wrapper Trait for components, erasing the concrete type
pub trait DynComponent: Send + Sync {
    /// The registered type, if the component has one
    fn type_info(&self) -> Option<TypeInfo>;

    /// Constructs a new unwired instance
    fn construct(&self) -> Result<Box<dyn Unwired>, DynError>;
}

/// A constructed instance waiting for its injections
pub trait Unwired: Send {
    /// Wires the resolved values and runs the post-construction hook
    fn start(self: Box<Self>, resolved: Resolved) -> BoxFuture<'static, Result<Published, StartError>>;
}

struct Typed<T>(PhantomData<fn() -> T>);

// Impl DynComponent for any Component
impl<T: Component> DynComponent for Typed<T> {
    fn type_info(&self) -> Option<TypeInfo> {
        Some(TypeInfo::of::<T>())
    }

    fn construct(&self) -> Result<Box<dyn Unwired>, DynError> {
        Ok(Box::new(Pending(T::construct()?)))
    }
}

struct Pending<T>(T);

impl<T: Component> Unwired for Pending<T> {
    fn start(self: Box<Self>, mut resolved: Resolved) -> BoxFuture<'static, Result<Published, StartError>> {
        let mut component = self.0;
        async move {
            component.wire(&mut resolved).map_err(StartError::Wire)?;
            component.init().await.map_err(StartError::Init)?;

            let component = Arc::new(component);
            let for_teardown = component.clone();
            let teardown: Teardown =
                Box::new(move || async move { for_teardown.teardown().await }.boxed());

            Ok(Published {
                instance: Instance::from_arc(component),
                teardown: Some(teardown),
            })
        }
        .boxed()
    }
}

type BuildFn = Arc<dyn Fn(Resolved) -> BoxFuture<'static, Result<Instance, DynError>> + Send + Sync>;

/// A component produced by a closure from its resolved values
struct FnComponent(BuildFn);

impl DynComponent for FnComponent {
    fn type_info(&self) -> Option<TypeInfo> {
        None
    }

    fn construct(&self) -> Result<Box<dyn Unwired>, DynError> {
        Ok(Box::new(FnPending(self.0.clone())))
    }
}

struct FnPending(BuildFn);

impl Unwired for FnPending {
    fn start(self: Box<Self>, resolved: Resolved) -> BoxFuture<'static, Result<Published, StartError>> {
        (self.0)(resolved)
            .map(|result| {
                result
                    .map(|instance| Published {
                        instance,
                        teardown: None,
                    })
                    .map_err(StartError::Init)
            })
            .boxed()
    }
}

/// A component as known to a registry: its key, its declarations and its lifecycle
///
/// Descriptors are immutable and cheap to clone.
#[derive(Clone)]
pub struct ComponentDescriptor(Arc<DescriptorInner>);

struct DescriptorInner {
    key: ComponentKey,
    injections: Injections,
    component: Box<dyn DynComponent>,
}

impl std::fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("key", &self.0.key)
            .field("type", &self.type_info().map(|info| info.type_name))
            .field("injections", &self.0.injections)
            .finish()
    }
}

impl ComponentDescriptor {
    /// Describes `T` under its default key
    pub fn of<T: Component>() -> Self {
        Self::keyed::<T>(T::KEY)
    }

    /// Describes `T` under a custom key
    pub fn keyed<T: Component>(key: impl Into<ComponentKey>) -> Self {
        Self::from_dyn(key, T::injections(), Typed::<T>(PhantomData))
    }

    /// Describes a component built by `build` from its resolved values
    ///
    /// `build` doubles as the post-construction hook: the value it returns is published.
    pub fn from_fn<U, E, Fut, F>(key: impl Into<ComponentKey>, injections: Injections, build: F) -> Self
    where
        U: Injectable,
        E: Into<DynError>,
        Fut: Future<Output = Result<U, E>> + Send + 'static,
        F: Fn(Resolved) -> Fut + Send + Sync + 'static,
    {
        let build: BuildFn = Arc::new(move |resolved| {
            build(resolved)
                .map(|result| result.map(Instance::new).map_err(Into::<DynError>::into))
                .boxed()
        });
        Self::from_dyn(key, injections, FnComponent(build))
    }

    /// Describes a custom [`DynComponent`] implementation
    pub fn from_dyn(
        key: impl Into<ComponentKey>,
        injections: Injections,
        component: impl DynComponent + 'static,
    ) -> Self {
        ComponentDescriptor(Arc::new(DescriptorInner {
            key: key.into(),
            injections,
            component: Box::new(component),
        }))
    }

    pub fn key(&self) -> &ComponentKey {
        &self.0.key
    }

    pub fn injections(&self) -> &Injections {
        &self.0.injections
    }

    pub fn type_info(&self) -> Option<TypeInfo> {
        self.0.component.type_info()
    }

    pub(crate) fn component(&self) -> &dyn DynComponent {
        self.0.component.as_ref()
    }
}
