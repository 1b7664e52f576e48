//! # Keystone Core
//!
//! Lifecycle supervisor for long-running processes built from pluggable
//! kernels.
//!
//! ## Components
//!
//! - [`Kernel`] - The init/start/stop contract every subsystem implements
//! - [`Supervisor`] - Bootstrap, kernel lifecycle and graceful shutdown
//! - [`KernelManager`] - Exactly-once init and start per kernel
//! - [`StopContext`] - Shared deadline handed to stop operations
//!
//! ## Shutdown
//!
//! [`Supervisor::wait_for_shutdown`] waits for SIGINT/SIGTERM, a failure
//! reported with [`Supervisor::fail`], or [`Supervisor::cancel`], then runs
//! every stop hook last-in, first-out within one budget.

pub mod context;
pub mod error;
pub mod kernel;
pub mod lifecycle;
pub mod manager;
mod once;
pub mod signal;
pub mod supervisor;

pub use context::StopContext;
pub use error::{KernelError, SupervisorError};
pub use kernel::Kernel;
pub use lifecycle::{KernelPhase, ShutdownReason, SupervisorState};
pub use manager::KernelManager;
pub use signal::TerminationSignal;
pub use supervisor::{Supervisor, SupervisorBuilder};

pub use keystone_config::{BaseConfig, ConfigError, EnvSource};
pub use keystone_di::{Container, ContainerError};
