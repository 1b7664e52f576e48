//! Process-level lifecycle supervisor.
//!
//! The supervisor bootstraps itself lazily on the first register, init or
//! run call, delegates kernel transitions to its [`KernelManager`], and owns
//! the shutdown sequence: one wait for a trigger (OS signal, reported
//! failure, or cancellation), then every stop hook in reverse order under a
//! single shared budget.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono_tz::Tz;
use keystone_config::{BaseConfig, ConfigError, ConfigLoader, EnvSource, DEFAULT_SHUTDOWN_TIMEOUT_SECS};
use keystone_di::Container;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::context::StopContext;
use crate::error::{KernelError, SupervisorError};
use crate::kernel::Kernel;
use crate::lifecycle::{run_in_reverse, KernelPhase, ShutdownReason, StopHook, StopHooks, SupervisorState};
use crate::manager::KernelManager;
use crate::once::OneShot;
use crate::signal::{next_signal, TerminationSignals};

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;

/// Result of a successful bootstrap.
struct Bootstrap {
    config: Arc<BaseConfig>,
    location: Option<Tz>,
    shutdown_timeout: Duration,
}

struct Options {
    source: EnvSource,
    shutdown_timeout: Option<Duration>,
}

struct Inner {
    id: Uuid,
    options: Options,
    bootstrap: OnceLock<Result<Arc<Bootstrap>, SupervisorError>>,
    state: AtomicU8,
    container: Arc<Container>,
    kernels: KernelManager,
    token: CancellationToken,
    failure_tx: mpsc::Sender<KernelError>,
    failure_rx: Mutex<Option<mpsc::Receiver<KernelError>>>,
    stop_hooks: StopHooks,
    shutdown: OneShot<ShutdownReason>,
}

/// Builder for [`Supervisor`].
pub struct SupervisorBuilder {
    source: EnvSource,
    shutdown_timeout: Option<Duration>,
    container: Option<Arc<Container>>,
}

impl SupervisorBuilder {
    fn new() -> Self {
        Self {
            source: EnvSource::default(),
            shutdown_timeout: None,
            container: None,
        }
    }

    /// Read configuration from `source`.
    pub fn env_source(mut self, source: EnvSource) -> Self {
        self.source = source;
        self
    }

    /// Layer the process environment over this env file instead of `./.env`.
    pub fn env_file(mut self, path: impl Into<PathBuf>, required: bool) -> Self {
        self.source = EnvSource::Process {
            env_file: Some(path.into()),
            require_env_file: required,
        };
        self
    }

    /// Read configuration from a fixed set of variables only.
    pub fn vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.source = EnvSource::vars(vars);
        self
    }

    /// Override the configured shutdown budget.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Share an existing dependency container.
    pub fn container(mut self, container: Arc<Container>) -> Self {
        self.container = Some(container);
        self
    }

    pub fn build(self) -> Supervisor {
        let (failure_tx, failure_rx) = mpsc::channel(1);
        Supervisor {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                options: Options {
                    source: self.source,
                    shutdown_timeout: self.shutdown_timeout,
                },
                bootstrap: OnceLock::new(),
                state: AtomicU8::new(SupervisorState::Created as u8),
                container: self.container.unwrap_or_default(),
                kernels: KernelManager::new(),
                token: CancellationToken::new(),
                failure_tx,
                failure_rx: Mutex::new(Some(failure_rx)),
                stop_hooks: StopHooks::default(),
                shutdown: OneShot::new(),
            }),
        }
    }
}

/// Lifecycle supervisor for a set of kernels.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    /// Supervisor reading the process environment and `./.env`.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    /// Instance id, attached to this supervisor's log lines.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn state(&self) -> SupervisorState {
        SupervisorState::from(self.inner.state.load(Ordering::SeqCst))
    }

    fn bootstrap(&self) -> Result<Arc<Bootstrap>, SupervisorError> {
        self.inner
            .bootstrap
            .get_or_init(|| {
                self.transition(SupervisorState::Created, SupervisorState::Bootstrapping);
                let result = self.run_bootstrap();
                match &result {
                    Ok(_) => {
                        self.transition(SupervisorState::Bootstrapping, SupervisorState::Ready);
                    }
                    Err(e) => {
                        error!(supervisor = %self.inner.id, error = %e, "Bootstrap failed");
                        self.transition(SupervisorState::Bootstrapping, SupervisorState::Failed);
                    }
                }
                result
            })
            .clone()
    }

    fn run_bootstrap(&self) -> Result<Arc<Bootstrap>, SupervisorError> {
        let fail = |e: ConfigError| SupervisorError::Bootstrap(Arc::new(e));

        let config = ConfigLoader::load(&self.inner.options.source).map_err(fail)?;
        let location = config.location().map_err(fail)?;
        let shutdown_timeout = self
            .inner
            .options
            .shutdown_timeout
            .unwrap_or_else(|| config.shutdown_timeout());

        let config = Arc::new(config);
        self.inner.container.register_arc(config.clone());
        if let Some(tz) = location {
            self.inner.container.register(tz);
        }

        info!(
            supervisor = %self.inner.id,
            app = %config.app_name,
            env = %config.app_env,
            timezone = ?location,
            shutdown_timeout = ?shutdown_timeout,
            "Supervisor bootstrapped"
        );

        Ok(Arc::new(Bootstrap {
            config,
            location,
            shutdown_timeout,
        }))
    }

    fn transition(&self, from: SupervisorState, to: SupervisorState) -> bool {
        self.inner
            .state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn set_state(&self, state: SupervisorState) {
        self.inner.state.store(state as u8, Ordering::SeqCst);
    }

    /// Base configuration, resolved through the dependency container.
    pub fn base_config(&self) -> Result<Arc<BaseConfig>, SupervisorError> {
        let boot = self.bootstrap()?;
        Ok(self
            .inner
            .container
            .resolve::<BaseConfig>()
            .unwrap_or_else(|_| boot.config.clone()))
    }

    /// Configured timezone, if any.
    pub fn location(&self) -> Result<Option<Tz>, SupervisorError> {
        Ok(self.bootstrap()?.location)
    }

    /// Shutdown budget: the bootstrapped value, else the builder override,
    /// else the default.
    pub fn shutdown_timeout(&self) -> Duration {
        match self.inner.bootstrap.get() {
            Some(Ok(boot)) => boot.shutdown_timeout,
            _ => self
                .inner
                .options
                .shutdown_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS)),
        }
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.inner.container
    }

    pub fn kernels(&self) -> &KernelManager {
        &self.inner.kernels
    }

    /// Register a kernel.
    pub fn register_kernel(&self, kernel: Arc<dyn Kernel>) -> Result<(), SupervisorError> {
        self.bootstrap()?;
        self.inner.kernels.register(kernel)
    }

    /// Register kernels in order, stopping at the first error.
    pub fn register_kernels<I>(&self, kernels: I) -> Result<(), SupervisorError>
    where
        I: IntoIterator<Item = Arc<dyn Kernel>>,
    {
        for kernel in kernels {
            self.register_kernel(kernel)?;
        }
        Ok(())
    }

    /// Initialize a registered kernel. Idempotent; see [`KernelManager::init`].
    pub async fn init_kernel(&self, name: &str) -> Result<(), SupervisorError> {
        self.bootstrap()?;
        self.inner.kernels.init(self, name).await
    }

    /// Start an initialized kernel. Idempotent; see [`KernelManager::run`].
    pub async fn run_kernel(&self, name: &str) -> Result<(), SupervisorError> {
        self.bootstrap()?;
        self.inner.kernels.run(self, name).await
    }

    /// Initialize every registered kernel in registration order.
    pub async fn init_all(&self) -> Result<(), SupervisorError> {
        self.bootstrap()?;
        for name in self.inner.kernels.names() {
            self.inner.kernels.init(self, &name).await?;
        }
        Ok(())
    }

    /// Start every registered kernel in registration order.
    ///
    /// Each kernel must have been initialized first.
    pub async fn run_all(&self) -> Result<(), SupervisorError> {
        self.bootstrap()?;
        for name in self.inner.kernels.names() {
            self.inner.kernels.run(self, &name).await?;
        }
        Ok(())
    }

    pub fn kernel_phase(&self, name: &str) -> Option<KernelPhase> {
        self.inner.kernels.phase(name)
    }

    pub fn kernel_names(&self) -> Vec<String> {
        self.inner.kernels.names()
    }

    /// Push a teardown action. Actions run last-in, first-out at shutdown.
    pub fn add_stop_hook<F, Fut>(&self, label: impl Into<String>, hook: F)
    where
        F: Fn(StopContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), KernelError>> + Send + 'static,
    {
        let hook = StopHook::new(label, hook);
        debug!(supervisor = %self.inner.id, hook = %hook.label(), "Stop hook registered");
        self.inner.stop_hooks.push(hook);
    }

    pub fn stop_hook_count(&self) -> usize {
        self.inner.stop_hooks.len()
    }

    /// Report a fatal error and begin shutdown.
    ///
    /// Only the first unreported error is kept; later ones are dropped
    /// without blocking. The root token is cancelled either way.
    pub fn fail(&self, err: KernelError) {
        let message = err.to_string();
        match self.inner.failure_tx.try_send(err) {
            Ok(()) => error!(supervisor = %self.inner.id, error = %message, "Fatal error reported"),
            Err(_) => debug!(
                supervisor = %self.inner.id,
                error = %message,
                "Fatal error dropped, an earlier one is pending"
            ),
        }
        self.inner.token.cancel();
    }

    /// Cancel the root token, triggering shutdown.
    pub fn cancel(&self) {
        self.inner.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Root cancellation token. Kernels hand child tokens to their tasks.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    /// Block until a shutdown trigger fires, then tear everything down.
    ///
    /// The sequence runs once. Concurrent and later callers wait for it and
    /// receive the same reason.
    pub async fn wait_for_shutdown(&self) -> ShutdownReason {
        if self.inner.shutdown.try_claim() {
            let supervisor = self.clone();
            tokio::spawn(async move {
                let reason = supervisor.shutdown().await;
                supervisor.inner.shutdown.complete(reason);
            });
        }
        self.inner.shutdown.wait().await
    }

    async fn shutdown(&self) -> ShutdownReason {
        let id = self.inner.id;
        let mut signals = match TerminationSignals::install() {
            Ok(signals) => Some(signals),
            Err(e) => {
                warn!(supervisor = %id, error = %e, "Failed to install OS signal handlers");
                None
            }
        };
        let mut failures = self.inner.failure_rx.lock().take();

        let reason = tokio::select! {
            biased;
            Some(err) = recv_failure(&mut failures) => {
                error!(supervisor = %id, error = %err, "Shutting down application (fatal error)");
                ShutdownReason::Failure(Arc::new(err))
            }
            signal = next_signal(&mut signals) => {
                info!(supervisor = %id, %signal, "Shutting down application (signal)");
                ShutdownReason::Signal
            }
            _ = self.inner.token.cancelled() => {
                info!(supervisor = %id, "Shutting down application (context canceled)");
                ShutdownReason::Cancelled
            }
        };

        self.set_state(SupervisorState::ShuttingDown);
        self.inner.token.cancel();

        // A second termination request skips the graceful path.
        let forced = signals.map(|signals| tokio::spawn(exit_on_second_signal(signals, id)));

        let ctx = StopContext::with_timeout(self.shutdown_timeout());
        let mut ran = 0;
        let mut failed = 0;
        loop {
            let hooks = self.inner.stop_hooks.snapshot();
            if hooks.len() == ran {
                break;
            }
            if ran > 0 {
                warn!(supervisor = %id, late = hooks.len() - ran, "Stop hooks registered during shutdown");
            }
            info!(
                supervisor = %id,
                hooks = hooks.len() - ran,
                budget = ?ctx.remaining(),
                "Running shutdown hooks"
            );
            failed += run_in_reverse(&hooks[ran..], &ctx).await;
            ran = hooks.len();
        }

        if let Some(forced) = forced {
            forced.abort();
        }
        self.set_state(SupervisorState::Stopped);

        if failed == 0 {
            info!(supervisor = %id, "Application stopped gracefully");
        } else {
            warn!(supervisor = %id, failed, "Application stopped, some shutdown hooks failed");
        }
        reason
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("kernels", &self.inner.kernels.len())
            .field("stop_hooks", &self.inner.stop_hooks.len())
            .finish()
    }
}

async fn exit_on_second_signal(mut signals: TerminationSignals, id: Uuid) {
    let signal = signals.recv().await;
    error!(supervisor = %id, %signal, "Forced shutdown");
    std::process::exit(1);
}

async fn recv_failure(rx: &mut Option<mpsc::Receiver<KernelError>>) -> Option<KernelError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
