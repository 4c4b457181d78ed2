use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bagit_pipeline::CancelToken;

/// Cancels a running transfer from outside, typically a Ctrl-C handler, and
/// waits a bounded time for its workers to release their resources.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    cancel: CancelToken,
    active: Arc<(Mutex<usize>, Condvar)>,
    grace:  Duration,
}

/// Held by a worker while it runs.
#[derive(Debug)]
pub(crate) struct WorkerGuard {
    active: Arc<(Mutex<usize>, Condvar)>,
}

impl ShutdownHandle {
    pub const DEFAULT_GRACE: Duration = Duration::from_secs(10);

    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            active: Arc::new((Mutex::new(0), Condvar::new())),
            grace: Self::DEFAULT_GRACE,
        }
    }

    #[must_use]
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn grace_period(&self) -> Duration { self.grace }

    pub fn cancel_token(&self) -> &CancelToken { &self.cancel }

    /// Number of workers still running.
    pub fn active_workers(&self) -> usize { *lock(&self.active.0) }

    /// Cancel the transfer and wait up to the grace period for every worker
    /// to finish. Returns `true` if they all did.
    pub fn shutdown(&self) -> bool {
        tracing::info!(grace = ?self.grace, "shutting down transfer");
        self.cancel.cancel();
        let deadline = Instant::now() + self.grace;
        let (count, idle) = &*self.active;
        let mut active = lock(count);
        while *active > 0 {
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(workers = *active, "workers still running after grace period");
                return false;
            }
            active = match idle.wait_timeout(active, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    pub(crate) fn enter(&self) -> WorkerGuard {
        *lock(&self.active.0) += 1;
        WorkerGuard {
            active: self.active.clone(),
        }
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        let (count, idle) = &*self.active;
        let mut active = lock(count);
        *active = active.saturating_sub(1);
        if *active == 0 {
            idle.notify_all();
        }
    }
}

fn lock(count: &Mutex<usize>) -> MutexGuard<'_, usize> { count.lock().unwrap_or_else(|e| e.into_inner()) }
