//! Background pool for delayed commits.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

const THREAD_NAME: &str = "parcel-commit";
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Fire-and-forget executor for commits waiting on a package write lock.
///
/// Jobs block (they wait on the lock), so they run on the runtime's blocking
/// pool, capped at the configured number of workers.
pub struct CommitQueue {
    runtime: Option<Runtime>,
    pending: Arc<AtomicUsize>,
}

impl CommitQueue {
    pub fn new(workers: usize) -> anyhow::Result<Self> {
        let workers = workers.max(1);
        let thread_id = AtomicUsize::new(0);
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers)
            .thread_name_fn(move || {
                let id = thread_id.fetch_add(1, Ordering::SeqCst);
                format!("{}-{}", THREAD_NAME, id)
            })
            .enable_all()
            .build()
            .context("Failed to start commit workers")?;
        Ok(Self {
            runtime: Some(runtime),
            pending: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(runtime) = self.runtime.as_ref() else {
            return;
        };
        let pending = Arc::clone(&self.pending);
        pending.fetch_add(1, Ordering::SeqCst);
        runtime.spawn_blocking(move || {
            job();
            let left = pending.fetch_sub(1, Ordering::SeqCst) - 1;
            debug!(pending = left, "Delayed commit finished");
        });
    }

    /// Jobs submitted and not finished yet.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

impl Drop for CommitQueue {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
        }
    }
}

impl std::fmt::Debug for CommitQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitQueue")
            .field("pending", &self.pending())
            .finish()
    }
}
