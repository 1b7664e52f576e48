//! The kernel capability contract.

use async_trait::async_trait;

use crate::context::StopContext;
use crate::error::KernelError;
use crate::supervisor::Supervisor;

#[cfg(test)]
#[path = "kernel_tests.rs"]
mod tests;

/// A pluggable subsystem driven through init, start and stop by a [`Supervisor`].
///
/// The supervisor guarantees that `init` and `start` each run at most once,
/// that `start` only runs after a successful `init`, and that `stop` runs
/// once at shutdown for every kernel whose `start` succeeded. A kernel whose
/// `start` fails is stopped once immediately for cleanup and never again.
///
/// `start` should return once the kernel is running. Long-lived work belongs
/// on spawned tasks observing [`Supervisor::cancellation_token`]; fatal
/// conditions discovered later are reported with [`Supervisor::fail`].
#[async_trait]
pub trait Kernel: Send + Sync + 'static {
    /// Unique, non-empty identity of this kernel.
    fn name(&self) -> &str;

    /// Prepare resources. May also be invoked eagerly, ahead of `start`.
    async fn init(&self, supervisor: &Supervisor) -> Result<(), KernelError>;

    /// Begin serving.
    async fn start(&self, supervisor: &Supervisor) -> Result<(), KernelError>;

    /// Release everything acquired by `init` and `start` within `ctx`.
    async fn stop(&self, ctx: StopContext) -> Result<(), KernelError>;
}
