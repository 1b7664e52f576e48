//! Per-kernel lifecycle state machine.
//!
//! Structural changes (insert, lookup) happen under one coarse lock. Kernel
//! code never runs under that lock: init and start are each gated by a
//! [`OneShot`] whose winner executes the kernel call on a spawned task while
//! every caller, the winner included, awaits the broadcast outcome.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::context::StopContext;
use crate::error::{KernelError, SupervisorError};
use crate::kernel::Kernel;
use crate::lifecycle::KernelPhase;
use crate::once::OneShot;
use crate::supervisor::Supervisor;

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;

type Outcome = Result<(), Arc<KernelError>>;

struct KernelState {
    /// Set under the registry lock the first time init is requested.
    init_requested: AtomicBool,
    init: OneShot<Outcome>,
    start: OneShot<Outcome>,
    stop_hook_registered: AtomicBool,
}

impl KernelState {
    fn new() -> Self {
        Self {
            init_requested: AtomicBool::new(false),
            init: OneShot::new(),
            start: OneShot::new(),
            stop_hook_registered: AtomicBool::new(false),
        }
    }

    fn phase(&self) -> KernelPhase {
        if let Some(outcome) = self.start.get() {
            return match outcome {
                Ok(()) => KernelPhase::Running,
                Err(_) => KernelPhase::StartFailed,
            };
        }
        if self.start.is_claimed() {
            return KernelPhase::Starting;
        }
        match self.init.get() {
            Some(Ok(())) => KernelPhase::Initialized,
            Some(Err(_)) => KernelPhase::InitFailed,
            None if self.init_requested.load(Ordering::Acquire) => KernelPhase::Initializing,
            None => KernelPhase::Registered,
        }
    }
}

#[derive(Clone)]
struct Slot {
    kernel: Arc<dyn Kernel>,
    state: Arc<KernelState>,
}

#[derive(Default)]
struct Registry {
    slots: HashMap<String, Slot>,
    order: Vec<String>,
}

/// Registry of kernels and their lifecycle state.
#[derive(Default)]
pub struct KernelManager {
    registry: Mutex<Registry>,
}

impl KernelManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kernel under its name.
    ///
    /// Fails without touching existing state if the name is empty or taken.
    pub fn register(&self, kernel: Arc<dyn Kernel>) -> Result<(), SupervisorError> {
        let name = kernel.name().to_string();
        if name.is_empty() {
            return Err(SupervisorError::EmptyName);
        }

        let mut registry = self.registry.lock();
        if registry.slots.contains_key(&name) {
            return Err(SupervisorError::AlreadyRegistered(name));
        }

        registry.slots.insert(
            name.clone(),
            Slot {
                kernel,
                state: Arc::new(KernelState::new()),
            },
        );
        registry.order.push(name.clone());
        debug!(kernel = %name, "Kernel registered");
        Ok(())
    }

    /// Run the kernel's init exactly once and return the shared outcome.
    ///
    /// A failed init is permanent: later calls return the same error and
    /// the kernel can never be started.
    pub async fn init(&self, supervisor: &Supervisor, name: &str) -> Result<(), SupervisorError> {
        let slot = {
            let registry = self.registry.lock();
            let slot = registry
                .slots
                .get(name)
                .cloned()
                .ok_or_else(|| SupervisorError::NotRegistered(name.to_string()))?;
            slot.state.init_requested.store(true, Ordering::Release);
            slot
        };

        if slot.state.init.try_claim() {
            debug!(kernel = %name, "Initializing kernel");
            let kernel = slot.kernel.clone();
            let state = slot.state.clone();
            let supervisor = supervisor.clone();
            let name = name.to_string();
            tokio::spawn(async move {
                let outcome = guarded(kernel.init(&supervisor)).await;
                match &outcome {
                    Ok(()) => info!(kernel = %name, "Kernel initialized"),
                    Err(e) => error!(kernel = %name, error = %e, "Kernel init failed"),
                }
                state.init.complete(outcome.map_err(Arc::new));
            });
        }

        slot.state
            .init
            .wait()
            .await
            .map_err(|source| SupervisorError::Init {
                name: name.to_string(),
                source,
            })
    }

    /// Start a kernel whose init was requested, exactly once.
    ///
    /// Never initializes implicitly. On success a stop hook is pushed onto
    /// the supervisor's teardown stack; on failure the kernel is stopped once
    /// for cleanup and stays off the stack.
    pub async fn run(&self, supervisor: &Supervisor, name: &str) -> Result<(), SupervisorError> {
        let slot = self.slot(name)?;

        if !slot.state.init_requested.load(Ordering::Acquire) {
            return Err(SupervisorError::NotInitialized(name.to_string()));
        }

        slot.state
            .init
            .wait()
            .await
            .map_err(|source| SupervisorError::Init {
                name: name.to_string(),
                source,
            })?;

        if slot.state.start.try_claim() {
            debug!(kernel = %name, "Starting kernel");
            tokio::spawn(start_kernel(
                supervisor.clone(),
                name.to_string(),
                slot.kernel.clone(),
                slot.state.clone(),
            ));
        }

        slot.state
            .start
            .wait()
            .await
            .map_err(|source| SupervisorError::Start {
                name: name.to_string(),
                source,
            })
    }

    /// Current lifecycle phase of a kernel.
    pub fn phase(&self, name: &str) -> Option<KernelPhase> {
        self.registry
            .lock()
            .slots
            .get(name)
            .map(|slot| slot.state.phase())
    }

    /// Registered kernel names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.registry.lock().order.clone()
    }

    /// Check if a kernel with the given name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.registry.lock().slots.contains_key(name)
    }

    /// Get the number of registered kernels.
    pub fn len(&self) -> usize {
        self.registry.lock().slots.len()
    }

    /// Check if no kernel is registered.
    pub fn is_empty(&self) -> bool {
        self.registry.lock().slots.is_empty()
    }

    fn slot(&self, name: &str) -> Result<Slot, SupervisorError> {
        self.registry
            .lock()
            .slots
            .get(name)
            .cloned()
            .ok_or_else(|| SupervisorError::NotRegistered(name.to_string()))
    }
}

async fn start_kernel(
    supervisor: Supervisor,
    name: String,
    kernel: Arc<dyn Kernel>,
    state: Arc<KernelState>,
) {
    let outcome = match guarded(kernel.start(&supervisor)).await {
        Ok(()) => {
            if !state.stop_hook_registered.swap(true, Ordering::AcqRel) {
                let hook_kernel = kernel.clone();
                supervisor.add_stop_hook(name.clone(), move |ctx| {
                    let kernel = hook_kernel.clone();
                    async move { kernel.stop(ctx).await }
                });
            }
            info!(kernel = %name, "Kernel started");
            Ok(())
        }
        Err(e) => {
            error!(kernel = %name, error = %e, "Kernel start failed, stopping it");
            // Not tied to the root token: a shutdown racing the failed start
            // must not cut the cleanup short. The stop observes the deadline.
            let ctx = StopContext::with_timeout(supervisor.shutdown_timeout());
            // Cleanup only; the start error is what gets reported.
            if let Err(stop_err) = guarded(kernel.stop(ctx)).await {
                warn!(kernel = %name, error = %stop_err, "Cleanup stop after failed start failed");
            }
            Err(Arc::new(e))
        }
    };

    state.start.complete(outcome);
}

/// Await a kernel call, turning a panic into [`KernelError::Panicked`].
async fn guarded<F>(fut: F) -> Result<(), KernelError>
where
    F: Future<Output = Result<(), KernelError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(KernelError::from_panic(panic)),
    }
}
