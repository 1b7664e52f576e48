//! Kernel and supervisor errors.

use std::sync::Arc;

use keystone_config::ConfigError;
use thiserror::Error;

/// Errors reported by kernel implementations.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("Kernel initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Kernel start failed: {0}")]
    StartFailed(String),

    #[error("Kernel shutdown failed: {0}")]
    ShutdownFailed(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Kernel panicked: {0}")]
    Panicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Custom(String),
}

impl KernelError {
    /// Build a [`KernelError::Panicked`] from a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        KernelError::Panicked(message)
    }
}

/// Errors returned by supervisor and kernel manager operations.
///
/// Cached outcomes are shared between callers, so the wrapped sources are
/// reference counted and the whole error is cheap to clone.
#[derive(Debug, Clone, Error)]
pub enum SupervisorError {
    #[error("Kernel name is empty")]
    EmptyName,

    #[error("Kernel already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Kernel not registered: {0}")]
    NotRegistered(String),

    #[error("Kernel not initialized: {0}")]
    NotInitialized(String),

    #[error("init {name}: {source}")]
    Init {
        name: String,
        #[source]
        source: Arc<KernelError>,
    },

    #[error("start {name}: {source}")]
    Start {
        name: String,
        #[source]
        source: Arc<KernelError>,
    },

    #[error("Bootstrap failed: {0}")]
    Bootstrap(#[source] Arc<ConfigError>),
}

impl SupervisorError {
    /// Whether this error rejected a kernel registration.
    pub fn is_registration(&self) -> bool {
        matches!(self, Self::EmptyName | Self::AlreadyRegistered(_))
    }

    /// The kernel this error refers to, if any.
    pub fn kernel(&self) -> Option<&str> {
        match self {
            Self::AlreadyRegistered(name)
            | Self::NotRegistered(name)
            | Self::NotInitialized(name)
            | Self::Init { name, .. }
            | Self::Start { name, .. } => Some(name),
            Self::EmptyName | Self::Bootstrap(_) => None,
        }
    }
}
