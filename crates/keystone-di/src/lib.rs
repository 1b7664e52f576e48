//! # Keystone DI
//!
//! A type-indexed dependency container. Values are registered either
//! eagerly or as lazy factories that run on first lookup, and are resolved
//! by type as `Arc<T>`.

mod container;
mod error;

pub use container::Container;
pub use error::ContainerError;
