//! Values owned by a component rather than derived from another one.
//!
//! - [`Slot`]: process-local mutable value
//! - [`SharedSlot`]: named value held in a [`ValueStore`], so a backend other than
//!   [`MemoryValueStore`] can make it visible beyond the process
//! - [`Signal`]: process-local value whose updates are streamed to subscribers

use std::{
    collections::HashMap,
    fmt,
    marker::PhantomData,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use futures_channel::mpsc;

use crate::types::{Injectable, Instance};

/// A process-local mutable value, cheap to clone
pub struct Slot<T>(Arc<RwLock<T>>);

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Slot(self.0.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.0.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_tuple("Slot").field(&*value).finish()
    }
}

impl<T: Clone> Slot<T> {
    pub fn new(initial: T) -> Self {
        Slot(Arc::new(RwLock::new(initial)))
    }

    pub fn get(&self) -> T {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set(&self, value: T) -> T {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, value)
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

/// Storage behind shared slots
///
/// The default [`MemoryValueStore`] keeps values in the process; hosts plug in their
/// own implementation to synchronize slots across processes.
pub trait ValueStore: Send + Sync {
    fn load(&self, name: &str) -> Option<Instance>;

    fn store(&self, name: &str, value: Instance);

    /// Stores `value` unless `name` already holds one, returning the held value
    fn store_if_absent(&self, name: &str, value: Instance) -> Instance {
        match self.load(name) {
            Some(existing) => existing,
            None => {
                self.store(name, value.clone());
                value
            }
        }
    }
}

/// Process-local [`ValueStore`]
#[derive(Default)]
pub struct MemoryValueStore {
    values: Mutex<HashMap<String, Instance>>,
}

impl MemoryValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ValueStore for MemoryValueStore {
    fn load(&self, name: &str) -> Option<Instance> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn store(&self, name: &str, value: Instance) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value);
    }

    fn store_if_absent(&self, name: &str, value: Instance) -> Instance {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_insert(value)
            .clone()
    }
}

/// A named value held in a [`ValueStore`]
pub struct SharedSlot<T> {
    name: String,
    store: Arc<dyn ValueStore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for SharedSlot<T> {
    fn clone(&self) -> Self {
        SharedSlot {
            name: self.name.clone(),
            store: self.store.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for SharedSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedSlot").field(&self.name).finish()
    }
}

impl<T: Injectable> SharedSlot<T> {
    /// Binds to `name`, seeding the store with `default` if it holds nothing yet
    pub fn bind(name: String, store: Arc<dyn ValueStore>, default: T) -> Self {
        store.store_if_absent(&name, Instance::new(default));
        SharedSlot {
            name,
            store,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current value, `None` if the store lost it or holds another type
    pub fn get(&self) -> Option<Arc<T>> {
        self.store
            .load(&self.name)
            .and_then(|instance| instance.downcast().ok())
    }

    pub fn set(&self, value: T) {
        self.store.store(&self.name, Instance::new(value));
    }
}

/// A process-local value whose updates are sent to every subscriber
pub struct Signal<T>(Arc<SignalInner<T>>);

struct SignalInner<T> {
    value: RwLock<T>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<T>>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Signal(self.0.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.0.value.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_tuple("Signal").field(&*value).finish()
    }
}

impl<T: Clone> Signal<T> {
    pub fn new(initial: T) -> Self {
        Signal(Arc::new(SignalInner {
            value: RwLock::new(initial),
            subscribers: Mutex::new(Vec::new()),
        }))
    }

    pub fn get(&self) -> T {
        self.0
            .value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the value and notifies subscribers, dropping the ones which went away
    pub fn set(&self, value: T) {
        *self.0.value.write().unwrap_or_else(PoisonError::into_inner) = value.clone();
        self.0
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|subscriber| subscriber.unbounded_send(value.clone()).is_ok());
    }

    /// Stream of every value set after subscribing
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded();
        self.0
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.0
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
