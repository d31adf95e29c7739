//! Staged dependency injection and bring-up of application components.
//!
//! Components declare what they need per property as [`Injection`]s. A bring-up run
//! 1. builds the [`DependencyGraph`] of the registered components,
//! 2. partitions it into [`Stages`] of components without dependencies among each other
//!    (reporting the exact chain of a circular dependency),
//! 3. brings every stage up concurrently, resolving injections from components of earlier
//!    stages, host supplied values and the configuration,
//! 4. hands out the live components in a [`Container`].
//!
//! ```
//! use std::sync::Arc;
//!
//! use wrapp_inject::{
//!     BringUpBuilder, Component, DynError, InjectError, Injection, Injections, Resolved,
//! };
//!
//! struct Cache;
//! impl Component for Cache {
//!     const KEY: &'static str = "cache";
//!
//!     fn injections() -> Injections {
//!         Injections::new()
//!     }
//!
//!     fn construct() -> Result<Self, DynError> {
//!         Ok(Cache)
//!     }
//!
//!     fn wire(&mut self, _: &mut Resolved) -> Result<(), InjectError> {
//!         Ok(())
//!     }
//! }
//!
//! struct Queue {
//!     cache: Option<Arc<Cache>>,
//! }
//! impl Component for Queue {
//!     const KEY: &'static str = "queue";
//!
//!     fn injections() -> Injections {
//!         Injections::new().with("cache", Injection::reference::<Cache>())
//!     }
//!
//!     fn construct() -> Result<Self, DynError> {
//!         Ok(Queue { cache: None })
//!     }
//!
//!     fn wire(&mut self, resolved: &mut Resolved) -> Result<(), InjectError> {
//!         self.cache = Some(resolved.take("cache")?);
//!         Ok(())
//!     }
//! }
//!
//! let builder = BringUpBuilder::new().component::<Queue>().component::<Cache>();
//! let container = futures::executor::block_on(builder.build()).unwrap();
//!
//! assert_eq!(container.stages().stage_of("queue"), Some(1));
//! assert!(container.require::<Queue>("queue").unwrap().cache.is_some());
//! ```

pub mod builder;
pub mod closure;
pub mod component;
pub mod container;
pub mod cycle;
pub mod dependency_graph;
pub mod errors;
mod initiator;
pub mod injection;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod slots;
pub mod types;

pub use builder::{BringUpBuilder, Plan};
pub use closure::{collect_closure, RootConsumer};
pub use component::{Component, ComponentDescriptor, DynComponent, Published, StartError, Unwired};
pub use container::{Container, LiveRegistry};
pub use dependency_graph::{convention_edge, DependencyGraph, EdgePolicy, GraphNode};
pub use errors::{
    BringUpError, ComponentError, GraphError, InjectError, RequireError, ResolveError,
    ShutdownError,
};
pub use injection::{Injection, InjectionKind, Injections, Target};
pub use registry::Registry;
pub use resolver::{resolve_injections, ExternalValues, ResolveContext, Resolved};
pub use scheduler::{schedule, Stage, Stages};
pub use slots::{MemoryValueStore, SharedSlot, Signal, Slot, ValueStore};
pub use types::{ComponentKey, DynError, Injectable, Instance, TypeInfo};
pub use wrapp_config::ConfigProvider;
