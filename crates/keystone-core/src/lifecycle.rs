//! Lifecycle states and the teardown stack.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::context::StopContext;
use crate::error::KernelError;

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;

/// Coarse supervisor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SupervisorState {
    /// Constructed, bootstrap not attempted yet.
    Created = 0,
    /// Bootstrap in progress.
    Bootstrapping = 1,
    /// Bootstrap succeeded.
    Ready = 2,
    /// Bootstrap failed; every lifecycle call returns the cached error.
    Failed = 3,
    /// A shutdown trigger fired and teardown is running.
    ShuttingDown = 4,
    /// Teardown finished.
    Stopped = 5,
}

impl From<u8> for SupervisorState {
    fn from(v: u8) -> Self {
        match v {
            0 => SupervisorState::Created,
            1 => SupervisorState::Bootstrapping,
            2 => SupervisorState::Ready,
            3 => SupervisorState::Failed,
            4 => SupervisorState::ShuttingDown,
            5 => SupervisorState::Stopped,
            _ => SupervisorState::Created,
        }
    }
}

/// Where a registered kernel is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelPhase {
    /// Registered, init never requested.
    Registered,
    /// Init requested and running.
    Initializing,
    /// Init succeeded, start not requested.
    Initialized,
    /// Init failed. Terminal.
    InitFailed,
    /// Start requested and running.
    Starting,
    /// Start succeeded; the kernel will be stopped at shutdown.
    Running,
    /// Start failed and the kernel was cleaned up. Terminal.
    StartFailed,
}

impl KernelPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            KernelPhase::InitFailed | KernelPhase::Running | KernelPhase::StartFailed
        )
    }
}

/// What ended the wait for shutdown.
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    /// An OS termination signal.
    Signal,
    /// A fatal error reported through [`Supervisor::fail`](crate::Supervisor::fail).
    Failure(Arc<KernelError>),
    /// The root cancellation token was cancelled.
    Cancelled,
}

impl ShutdownReason {
    /// The reported failure, if shutdown was caused by one.
    pub fn failure(&self) -> Option<&KernelError> {
        match self {
            ShutdownReason::Failure(err) => Some(err),
            _ => None,
        }
    }
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::Signal => write!(f, "signal"),
            ShutdownReason::Failure(err) => write!(f, "fatal error: {}", err),
            ShutdownReason::Cancelled => write!(f, "context canceled"),
        }
    }
}

type StopAction = dyn Fn(StopContext) -> BoxFuture<'static, Result<(), KernelError>> + Send + Sync;

/// A labelled teardown action.
#[derive(Clone)]
pub(crate) struct StopHook {
    label: String,
    action: Arc<StopAction>,
}

impl StopHook {
    pub(crate) fn new<F, Fut>(label: impl Into<String>, action: F) -> Self
    where
        F: Fn(StopContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), KernelError>> + Send + 'static,
    {
        Self {
            label: label.into(),
            action: Arc::new(move |ctx: StopContext| action(ctx).boxed()),
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }
}

/// Append-only stack of teardown actions.
#[derive(Default)]
pub(crate) struct StopHooks {
    hooks: Mutex<Vec<StopHook>>,
}

impl StopHooks {
    pub(crate) fn push(&self, hook: StopHook) {
        self.hooks.lock().push(hook);
    }

    /// Copy of the hooks registered so far, in registration order.
    pub(crate) fn snapshot(&self) -> Vec<StopHook> {
        self.hooks.lock().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.hooks.lock().len()
    }
}

/// Run `hooks` last-to-first under the shared `ctx`.
///
/// Errors, panics and budget overruns are logged and never stop the
/// sequence. Returns the number of hooks that did not finish cleanly.
pub(crate) async fn run_in_reverse(hooks: &[StopHook], ctx: &StopContext) -> usize {
    let mut failures = 0;

    for hook in hooks.iter().rev() {
        let action = AssertUnwindSafe((hook.action)(ctx.clone())).catch_unwind();
        match ctx.run(action).await {
            Ok(Ok(Ok(()))) => debug!(hook = %hook.label, "Stop hook finished"),
            Ok(Ok(Err(e))) => {
                error!(hook = %hook.label, error = %e, "Shutdown hook error");
                failures += 1;
            }
            Ok(Err(panic)) => {
                let e = KernelError::from_panic(panic);
                error!(hook = %hook.label, error = %e, "Shutdown hook panicked");
                failures += 1;
            }
            Err(_) => {
                warn!(hook = %hook.label, "Shutdown hook exceeded the shutdown budget");
                failures += 1;
            }
        }
    }

    failures
}
