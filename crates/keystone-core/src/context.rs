//! Bounded context passed to kernel stop operations.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::KernelError;

/// A deadline plus a cancellation token.
///
/// During shutdown every stop hook receives a clone of the same context, so
/// the deadline is a budget shared by the whole teardown sequence.
#[derive(Debug, Clone)]
pub struct StopContext {
    deadline: Instant,
    token: CancellationToken,
}

impl StopContext {
    /// A context expiring after `timeout`, independent of any other token.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            token: CancellationToken::new(),
        }
    }

    /// A context expiring after `timeout` or when `parent` is cancelled.
    pub fn child_of(parent: &CancellationToken, timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            token: parent.child_token(),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline passed or the context was cancelled.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.deadline
    }

    /// Cancel this context (and nothing above it).
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Completes once the deadline passes or the context is cancelled.
    pub async fn done(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = tokio::time::sleep_until(self.deadline) => {}
        }
    }

    /// Run `fut` within this context.
    ///
    /// Returns [`KernelError::Timeout`] if the context ends first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, KernelError> {
        tokio::select! {
            biased;
            out = fut => Ok(out),
            _ = self.done() => Err(KernelError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remaining_within_budget() {
        let ctx = StopContext::with_timeout(Duration::from_secs(5));
        assert!(ctx.remaining() <= Duration::from_secs(5));
        assert!(ctx.remaining() > Duration::from_secs(4));
        assert!(!ctx.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let ctx = StopContext::with_timeout(Duration::from_millis(100));
        ctx.done().await;
        assert!(ctx.is_done());
        assert_eq!(ctx.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_parent_cancellation_propagates() {
        let parent = CancellationToken::new();
        let ctx = StopContext::child_of(&parent, Duration::from_secs(60));
        assert!(!ctx.is_done());

        parent.cancel();
        ctx.done().await;
        assert!(ctx.is_done());
    }

    #[tokio::test]
    async fn test_cancel_does_not_touch_parent() {
        let parent = CancellationToken::new();
        let ctx = StopContext::child_of(&parent, Duration::from_secs(60));
        ctx.cancel();
        assert!(ctx.is_done());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_times_out() {
        let ctx = StopContext::with_timeout(Duration::from_millis(50));
        let result = ctx
            .run(tokio::time::sleep(Duration::from_secs(10)))
            .await;
        assert!(matches!(result, Err(KernelError::Timeout)));
    }

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = StopContext::with_timeout(Duration::from_secs(1));
        let result = ctx.run(async { 7 }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
