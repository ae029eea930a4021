//! Bounded push worker pool.
//!
//! Every push runs as its own task, but at most `workers` of them talk to
//! subscribers at once; the rest wait on the semaphore. Pushes for the same
//! subscription are not ordered relative to each other.

use crate::metrics;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};
use tracing::trace;

/// Default number of concurrent pushes.
pub const DEFAULT_WORKERS: usize = 50;

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of pushes in progress at once.
    pub workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
        }
    }
}

/// A shared, bounded pool of push workers.
#[derive(Debug, Clone)]
pub struct PushPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    permits: Semaphore,
    workers: usize,
    active: AtomicUsize,
    queued: AtomicUsize,
    idle: Notify,
}

impl PushPool {
    /// Create a pool.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        let workers = config.workers.max(1);
        Self {
            inner: Arc::new(PoolInner {
                permits: Semaphore::new(workers),
                workers,
                active: AtomicUsize::new(0),
                queued: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Queue a push. Returns immediately; the push runs once a worker is free.
    pub fn spawn<F>(&self, push: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        inner.queued.fetch_add(1, Ordering::SeqCst);
        inner.report();

        tokio::spawn(async move {
            // The semaphore is never closed
            let Ok(_permit) = inner.permits.acquire().await else {
                inner.queued.fetch_sub(1, Ordering::SeqCst);
                inner.notify_if_idle();
                return;
            };
            let _guard = WorkerGuard::start(&inner);
            push.await;
        });
    }

    /// Configured worker count.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.inner.workers
    }

    /// Pushes currently in progress.
    #[must_use]
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Pushes waiting for a worker.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.queued.load(Ordering::SeqCst)
    }

    /// Pushes either waiting or in progress.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.active() + self.queued()
    }

    /// Wait until every queued push has finished.
    pub async fn drained(&self) {
        loop {
            let idle = self.inner.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            idle.await;
        }
    }
}

impl Default for PushPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl PoolInner {
    fn report(&self) {
        metrics::set_pool_depth(
            self.active.load(Ordering::SeqCst),
            self.queued.load(Ordering::SeqCst),
        );
    }

    fn notify_if_idle(&self) {
        self.report();
        if self.active.load(Ordering::SeqCst) == 0 && self.queued.load(Ordering::SeqCst) == 0 {
            trace!("Push pool idle");
            self.idle.notify_waiters();
        }
    }
}

/// Moves a push from queued to active, and back out when dropped.
struct WorkerGuard<'a> {
    inner: &'a PoolInner,
}

impl<'a> WorkerGuard<'a> {
    fn start(inner: &'a PoolInner) -> Self {
        // Active goes up before queued goes down so the pool never looks idle
        inner.active.fetch_add(1, Ordering::SeqCst);
        inner.queued.fetch_sub(1, Ordering::SeqCst);
        inner.report();
        Self { inner }
    }
}

impl Drop for WorkerGuard<'_> {
    fn drop(&mut self) {
        self.inner.active.fetch_sub(1, Ordering::SeqCst);
        self.inner.notify_if_idle();
    }
}
