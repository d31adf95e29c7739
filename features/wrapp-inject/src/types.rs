use std::{
    any::{Any, TypeId},
    sync::Arc,
};

/// Boxed error produced by factories and lifecycle hooks
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Key of a component inside a registry ("ref name")
pub type ComponentKey = String;

/// Anything stored in the live registry or a resolved value map.
/// Stages run concurrently, so values must be shareable across threads.
pub trait Injectable: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> Injectable for T {}

/// A type-erased value: a live component, a transformed handle or a resolved injection
#[derive(Clone)]
pub struct Instance {
    pub info: TypeInfo,
    pub instance: Arc<dyn Any + Send + Sync + 'static>,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Instance").field(&self.info.type_name).finish()
    }
}

impl Instance {
    pub fn new<T: Injectable>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<T: Injectable>(value: Arc<T>) -> Self {
        Instance {
            info: TypeInfo::of::<T>(),
            instance: value,
        }
    }

    /// Downcasts to the concrete type, returning the actual type name on mismatch
    pub fn downcast<T: Injectable>(&self) -> Result<Arc<T>, &'static str> {
        match Arc::downcast::<T>(self.instance.clone()) {
            Ok(downcasted) => Ok(downcasted),
            Err(_) => Err(self.info.type_name),
        }
    }

    pub fn is<T: Injectable>(&self) -> bool {
        self.info.satisfies(&TypeInfo::of::<T>())
    }
}

/// Identifies the concrete type behind an [`Instance`] or a typed reference
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct TypeInfo {
    pub type_name: &'static str,
    pub type_id: TypeId,
}
impl std::fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name)
    }
}
impl TypeInfo {
    pub fn of<T: 'static + ?Sized>() -> TypeInfo {
        TypeInfo {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }

    /// Whether a value of this type satisfies a reference to `target`
    pub fn satisfies(&self, target: &TypeInfo) -> bool {
        self.type_id == target.type_id
    }
}
