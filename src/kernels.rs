//! Demo kernels driven by `keystone run`.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono_tz::Tz;
use keystone_core::{Kernel, KernelError, StopContext, Supervisor};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Background task owned by a kernel, joined on stop.
#[derive(Default)]
struct Worker {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    fn spawn<F>(&self, token: CancellationToken, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = task => {}
            }
        });
        *self.handle.lock() = Some(handle);
    }

    async fn join(&self, ctx: &StopContext) -> Result<(), KernelError> {
        let handle = self.handle.lock().take();
        match handle {
            Some(handle) => ctx
                .run(handle)
                .await?
                .map_err(|e| KernelError::ShutdownFailed(e.to_string())),
            None => Ok(()),
        }
    }
}

/// Logs a beat at a fixed interval.
pub struct HeartbeatKernel {
    interval: Duration,
    beats: Arc<AtomicU64>,
    worker: Worker,
}

impl HeartbeatKernel {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            beats: Arc::new(AtomicU64::new(0)),
            worker: Worker::default(),
        }
    }

    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Kernel for HeartbeatKernel {
    fn name(&self) -> &str {
        "heartbeat"
    }

    async fn init(&self, _supervisor: &Supervisor) -> Result<(), KernelError> {
        if self.interval.is_zero() {
            return Err(KernelError::InitializationFailed(
                "heartbeat interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    async fn start(&self, supervisor: &Supervisor) -> Result<(), KernelError> {
        let interval = self.interval;
        let beats = self.beats.clone();
        self.worker.spawn(supervisor.cancellation_token(), async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let beat = beats.fetch_add(1, Ordering::Relaxed) + 1;
                info!(beat, "Heartbeat");
            }
        });
        Ok(())
    }

    async fn stop(&self, ctx: StopContext) -> Result<(), KernelError> {
        self.worker.join(&ctx).await?;
        info!(beats = self.beats(), "Heartbeat stopped");
        Ok(())
    }
}

/// Logs the wall-clock time in the configured timezone.
pub struct ClockKernel {
    interval: Duration,
    location: Mutex<Option<Tz>>,
    worker: Worker,
}

impl ClockKernel {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            location: Mutex::new(None),
            worker: Worker::default(),
        }
    }

    /// Current time, rendered in the configured timezone or local time.
    fn now(location: Option<Tz>) -> String {
        match location {
            Some(tz) => chrono::Utc::now()
                .with_timezone(&tz)
                .format("%Y-%m-%d %H:%M:%S %Z")
                .to_string(),
            None => chrono::Local::now()
                .format("%Y-%m-%d %H:%M:%S %:z")
                .to_string(),
        }
    }
}

#[async_trait]
impl Kernel for ClockKernel {
    fn name(&self) -> &str {
        "clock"
    }

    async fn init(&self, supervisor: &Supervisor) -> Result<(), KernelError> {
        let location = supervisor
            .location()
            .map_err(|e| KernelError::InitializationFailed(e.to_string()))?;
        *self.location.lock() = location;
        Ok(())
    }

    async fn start(&self, supervisor: &Supervisor) -> Result<(), KernelError> {
        let location = *self.location.lock();
        let interval = self.interval;
        info!(time = %Self::now(location), "Clock started");
        self.worker.spawn(supervisor.cancellation_token(), async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                info!(time = %Self::now(location), "Clock");
            }
        });
        Ok(())
    }

    async fn stop(&self, ctx: StopContext) -> Result<(), KernelError> {
        self.worker.join(&ctx).await
    }
}

/// Reports a fatal error after a delay, exercising the failure path.
pub struct TripwireKernel {
    delay: Duration,
    worker: Worker,
}

impl TripwireKernel {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            worker: Worker::default(),
        }
    }
}

#[async_trait]
impl Kernel for TripwireKernel {
    fn name(&self) -> &str {
        "tripwire"
    }

    async fn init(&self, _supervisor: &Supervisor) -> Result<(), KernelError> {
        Ok(())
    }

    async fn start(&self, supervisor: &Supervisor) -> Result<(), KernelError> {
        let delay = self.delay;
        let reporter = supervisor.clone();
        warn!(delay = ?delay, "Tripwire armed");
        self.worker.spawn(supervisor.cancellation_token(), async move {
            tokio::time::sleep(delay).await;
            reporter.fail(KernelError::Custom(format!(
                "tripwire fired after {}s",
                delay.as_secs()
            )));
        });
        Ok(())
    }

    async fn stop(&self, ctx: StopContext) -> Result<(), KernelError> {
        debug!("Disarming tripwire");
        self.worker.join(&ctx).await
    }
}
