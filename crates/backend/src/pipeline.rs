//! Bounded-concurrency write pipeline.
//!
//! Writes within a ledger are issued asynchronously and unordered; the only
//! ordering guarantee is the sync barrier at `finish_writes`. This module
//! provides the admission control shared by those writes:
//!
//! - an atomic count of in-flight requests,
//! - a configurable cap (with a distinct, lower cap applied while the
//!   retention procedure runs),
//! - admission that waits while the cap is reached,
//! - a barrier that waits for the count to drain to zero,
//! - a poison flag recording a fail-fast write error for the barrier to
//!   surface.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::Notify;
use tracing::trace;

/// Admission control for in-flight driver requests.
#[derive(Debug)]
pub struct WriteThrottle {
    /// Current number of in-flight requests.
    outstanding: AtomicUsize,
    /// Active cap; switches between `max_cap` and `indexer_cap`.
    cap: AtomicUsize,
    max_cap: usize,
    indexer_cap: usize,
    /// Wakes one admission waiter per released slot.
    admit: Notify,
    /// Wakes barrier waiters when the pipeline drains.
    drained: Notify,
    /// Set when an async write failed fast; cleared by the barrier reader.
    poisoned: AtomicBool,
}

impl WriteThrottle {
    /// Creates a throttle with the given caps. `indexer_cap` applies while
    /// indexer mode is on (retention running).
    pub fn new(max_cap: usize, indexer_cap: usize) -> Self {
        Self {
            outstanding: AtomicUsize::new(0),
            cap: AtomicUsize::new(max_cap),
            max_cap,
            indexer_cap,
            admit: Notify::new(),
            drained: Notify::new(),
            poisoned: AtomicBool::new(false),
        }
    }

    /// Acquires a slot, waiting while the cap is reached.
    pub async fn acquire(&self) {
        loop {
            let notified = self.admit.notified();
            if self.try_acquire() {
                return;
            }
            trace!("write pipeline full, waiting for a slot");
            notified.await;
        }
    }

    fn try_acquire(&self) -> bool {
        let cap = self.cap.load(Ordering::Acquire);
        self.outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current < cap {
                    Some(current + 1)
                } else {
                    None
                }
            })
            .is_ok()
    }

    /// Releases a slot acquired by [`WriteThrottle::acquire`].
    pub fn release(&self) {
        let previous = self.outstanding.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "released more slots than acquired");
        self.admit.notify_one();
        if previous == 1 {
            self.drained.notify_waiters();
        }
    }

    /// Sync barrier: waits until no requests are in flight.
    pub async fn sync(&self) {
        loop {
            let notified = self.drained.notified();
            if self.outstanding.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Current number of in-flight requests.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Switches between the main and indexer caps. Lowering the cap does not
    /// cancel requests already in flight; admission simply waits until the
    /// count falls below the new cap.
    pub fn set_indexer_mode(&self, indexing: bool) {
        let cap = if indexing { self.indexer_cap } else { self.max_cap };
        self.cap.store(cap, Ordering::Release);
        // A raised cap may unblock waiters.
        self.admit.notify_waiters();
    }

    /// Records a fail-fast write error.
    pub fn poison(&self) {
        self.poisoned.store(true, Ordering::Release);
    }

    /// Reads and clears the poison flag. Called by the barrier owner once
    /// per ledger commit attempt.
    pub fn take_poisoned(&self) -> bool {
        self.poisoned.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_cap_blocks_third_admission() {
        let throttle = Arc::new(WriteThrottle::new(2, 1));
        throttle.acquire().await;
        throttle.acquire().await;
        assert_eq!(throttle.outstanding(), 2);

        let admitted = Arc::new(AtomicBool::new(false));
        let waiter = {
            let throttle = Arc::clone(&throttle);
            let admitted = Arc::clone(&admitted);
            tokio::spawn(async move {
                throttle.acquire().await;
                admitted.store(true, Ordering::SeqCst);
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!admitted.load(Ordering::SeqCst), "third admission must block at the cap");
        assert_eq!(throttle.outstanding(), 2);

        throttle.release();
        waiter.await.unwrap();
        assert!(admitted.load(Ordering::SeqCst));
        assert_eq!(throttle.outstanding(), 2);
    }

    #[tokio::test]
    async fn test_sync_waits_for_drain() {
        let throttle = Arc::new(WriteThrottle::new(4, 1));
        throttle.acquire().await;
        throttle.acquire().await;

        let drained = Arc::new(AtomicBool::new(false));
        let barrier = {
            let throttle = Arc::clone(&throttle);
            let drained = Arc::clone(&drained);
            tokio::spawn(async move {
                throttle.sync().await;
                drained.store(true, Ordering::SeqCst);
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!drained.load(Ordering::SeqCst));

        throttle.release();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!drained.load(Ordering::SeqCst), "one request still in flight");

        throttle.release();
        barrier.await.unwrap();
        assert!(drained.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_sync_returns_immediately_when_idle() {
        let throttle = WriteThrottle::new(1, 1);
        throttle.sync().await;
    }

    #[tokio::test]
    async fn test_indexer_mode_lowers_cap() {
        let throttle = Arc::new(WriteThrottle::new(8, 1));
        throttle.set_indexer_mode(true);
        throttle.acquire().await;

        let admitted = Arc::new(AtomicBool::new(false));
        let waiter = {
            let throttle = Arc::clone(&throttle);
            let admitted = Arc::clone(&admitted);
            tokio::spawn(async move {
                throttle.acquire().await;
                admitted.store(true, Ordering::SeqCst);
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!admitted.load(Ordering::SeqCst), "indexer cap of 1 must block");

        // Restoring the main cap unblocks the waiter without a release.
        throttle.set_indexer_mode(false);
        waiter.await.unwrap();
        assert!(admitted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_poison_is_cleared_on_read() {
        let throttle = WriteThrottle::new(1, 1);
        assert!(!throttle.take_poisoned());
        throttle.poison();
        assert!(throttle.take_poisoned());
        assert!(!throttle.take_poisoned());
    }

    #[tokio::test]
    async fn test_many_writers_never_exceed_cap() {
        let throttle = Arc::new(WriteThrottle::new(3, 1));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for _ in 0..20 {
            let throttle = Arc::clone(&throttle);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                throttle.acquire().await;
                peak.fetch_max(throttle.outstanding(), Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                throttle.release();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        throttle.sync().await;
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(throttle.outstanding(), 0);
    }
}
