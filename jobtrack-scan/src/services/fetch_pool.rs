//! Bounded worker pool for blocking provider calls
//!
//! The pool is created on first use and recreated on the next use after a
//! shutdown. `shutdown` waits for in-flight work to finish.

use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

/// Default number of concurrent blocking fetches
pub const DEFAULT_FETCH_WORKERS: usize = 4;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Fetch pool is shut down")]
    ShutDown,

    #[error("Fetch worker failed: {0}")]
    Worker(String),
}

struct PoolInner {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

pub struct FetchPool {
    workers: usize,
    inner: Mutex<Option<Arc<PoolInner>>>,
}

impl FetchPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            inner: Mutex::new(None),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// True while a pool exists
    pub fn is_active(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn get_or_create(&self) -> Arc<PoolInner> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let inner = guard.get_or_insert_with(|| {
            tracing::debug!(workers = self.workers, "Creating fetch pool");
            Arc::new(PoolInner {
                permits: Arc::new(Semaphore::new(self.workers)),
                tracker: TaskTracker::new(),
            })
        });
        Arc::clone(inner)
    }

    /// Run `f` on a blocking worker once a slot is free
    pub async fn run<F, T>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.get_or_create();
        let permit = Arc::clone(&inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::ShutDown)?;

        let handle = inner.tracker.spawn_blocking(move || {
            let _permit = permit;
            f()
        });

        handle.await.map_err(|e| PoolError::Worker(e.to_string()))
    }

    /// Close the pool and wait for in-flight work
    ///
    /// Callers still waiting for a slot get `PoolError::ShutDown`.
    pub async fn shutdown(&self) {
        let inner = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(inner) = inner else {
            return;
        };

        inner.permits.close();
        inner.tracker.close();
        tracing::info!(in_flight = inner.tracker.len(), "Draining fetch pool");
        inner.tracker.wait().await;
        tracing::info!("Fetch pool drained");
    }
}

impl Default for FetchPool {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_WORKERS)
    }
}
