//! # Keystone Config
//!
//! Base configuration for Keystone processes, read from the process
//! environment and an optional `.env` file.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::{ConfigLoader, EnvSource};
pub use schema::{keys, BaseConfig, DEFAULT_SHUTDOWN_TIMEOUT_SECS};
pub use validator::{ConfigValidator, ValidationIssue, ValidationResult};
