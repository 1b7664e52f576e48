//! One-shot guard with a broadcast outcome.
//!
//! Exactly one caller wins [`OneShot::try_claim`] and is responsible for
//! calling [`OneShot::complete`]. Every other caller, before or after
//! completion, awaits [`OneShot::wait`] and receives a clone of the same
//! outcome.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

pub(crate) struct OneShot<T> {
    claimed: AtomicBool,
    outcome: watch::Sender<Option<T>>,
}

impl<T: Clone> OneShot<T> {
    pub(crate) fn new() -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            claimed: AtomicBool::new(false),
            outcome,
        }
    }

    /// Returns `true` for exactly one caller over the guard's lifetime.
    pub(crate) fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    /// Publish the outcome and wake every waiter. Later calls are ignored.
    pub(crate) fn complete(&self, value: T) {
        self.outcome.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
            true
        });
    }

    /// The outcome, if already published.
    pub(crate) fn get(&self) -> Option<T> {
        self.outcome.borrow().clone()
    }

    /// Wait for the outcome.
    ///
    /// # Panics
    ///
    /// Panics if the sender is gone while a waiter still borrows the guard.
    /// The sender is owned by `self`, so this is an internal invariant
    /// violation rather than a recoverable condition.
    pub(crate) async fn wait(&self) -> T {
        let mut rx = self.outcome.subscribe();
        let value = rx
            .wait_for(Option::is_some)
            .await
            .expect("one-shot sender outlives its waiters");
        (*value)
            .clone()
            .expect("wait_for only returns once the outcome is set")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_single_claim() {
        let guard: OneShot<u8> = OneShot::new();
        assert!(!guard.is_claimed());
        assert!(guard.try_claim());
        assert!(!guard.try_claim());
        assert!(guard.is_claimed());
    }

    #[test]
    fn test_complete_is_sticky() {
        let guard = OneShot::new();
        assert_eq!(guard.get(), None);
        guard.complete(1);
        guard.complete(2);
        assert_eq!(guard.get(), Some(1));
    }

    #[tokio::test]
    async fn test_wait_after_complete() {
        let guard = OneShot::new();
        guard.complete("done");
        assert_eq!(guard.wait().await, "done");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_waiters_share_outcome() {
        let guard = Arc::new(OneShot::new());

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                tokio::spawn(async move { guard.wait().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        guard.complete(Err::<(), _>("failed".to_string()));

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), Err("failed".to_string()));
        }
    }
}
