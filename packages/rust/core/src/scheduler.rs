//! Engine-wide admission control for provider calls.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;

/// Bounds the number of provider calls in flight across the engine.
///
/// Waiters are admitted in FIFO order. A permit is held for the whole
/// lifetime of the scheduled future and released even if it fails.
#[derive(Debug, Clone)]
pub struct ConcurrencyScheduler {
    semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    limit: usize,
}

impl ConcurrencyScheduler {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            limit,
        }
    }

    /// Run `task` once a slot is free.
    pub async fn schedule<F, T>(&self, task: F) -> T
    where
        F: Future<Output = T>,
    {
        // Never closed.
        let _permit = self.semaphore.acquire().await.ok();
        let _guard = InFlightGuard::enter(&self.in_flight);
        task.await
    }

    /// Calls currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl<'a> InFlightGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_limit() {
        let scheduler = ConcurrencyScheduler::new(3);
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..12).map(|_| {
            let scheduler = scheduler.clone();
            let peak = Arc::clone(&peak);
            async move {
                scheduler
                    .schedule(async {
                        peak.fetch_max(scheduler.in_flight(), Ordering::AcqRel);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    })
                    .await
            }
        });
        futures::future::join_all(tasks).await;

        assert_eq!(peak.load(Ordering::Acquire), 3);
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[tokio::test]
    async fn failed_task_releases_its_slot() {
        let scheduler = ConcurrencyScheduler::new(1);

        let failed: Result<(), &str> = scheduler.schedule(async { Err("boom") }).await;
        assert!(failed.is_err());

        let ok = scheduler.schedule(async { 42 }).await;
        assert_eq!(ok, 42);
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[test]
    fn zero_limit_is_clamped() {
        assert_eq!(ConcurrencyScheduler::new(0).limit(), 1);
    }
}
