//! Type-indexed container.

use std::any::{type_name, Any, TypeId};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tracing::debug;

use crate::error::ContainerError;

type Shared = Arc<dyn Any + Send + Sync>;
type Factory = Box<dyn Fn() -> Shared + Send + Sync>;

/// A factory whose product is computed at most once.
struct Lazy {
    cell: OnceLock<Shared>,
    factory: Factory,
}

impl Lazy {
    fn get(&self) -> Shared {
        self.cell.get_or_init(|| (self.factory)()).clone()
    }
}

#[derive(Clone)]
enum Entry {
    Value(Shared),
    Lazy(Arc<Lazy>),
}

/// Thread-safe dependency container keyed by type.
///
/// Registering a type that is already present replaces the previous entry.
/// Factories run outside of any map lock, so a factory may itself resolve
/// other types from the same container. A factory must not resolve its own
/// type.
#[derive(Default)]
pub struct Container {
    entries: DashMap<TypeId, Entry>,
}

impl Container {
    /// Create a new empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ready value.
    pub fn register<T: Send + Sync + 'static>(&self, value: T) {
        self.register_arc(Arc::new(value));
    }

    /// Register an already shared value.
    pub fn register_arc<T: Send + Sync + 'static>(&self, value: Arc<T>) {
        debug!(dependency = type_name::<T>(), "Registering dependency");
        self.entries.insert(TypeId::of::<T>(), Entry::Value(value));
    }

    /// Register a factory that runs once, on the first [`resolve`](Self::resolve) of `T`.
    pub fn register_factory<T, F>(&self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        debug!(dependency = type_name::<T>(), "Registering lazy dependency");
        let lazy = Lazy {
            cell: OnceLock::new(),
            factory: Box::new(move || Arc::new(factory()) as Shared),
        };
        self.entries
            .insert(TypeId::of::<T>(), Entry::Lazy(Arc::new(lazy)));
    }

    /// Resolve a dependency by type.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        // Clone the entry out so the shard lock is released before a factory runs.
        let entry = self
            .entries
            .get(&TypeId::of::<T>())
            .map(|e| e.value().clone())
            .ok_or(ContainerError::NotFound(type_name::<T>()))?;

        let shared = match entry {
            Entry::Value(value) => value,
            Entry::Lazy(lazy) => lazy.get(),
        };

        shared
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch(type_name::<T>()))
    }

    /// Check whether a type is registered.
    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Get the number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the container is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("len", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;
