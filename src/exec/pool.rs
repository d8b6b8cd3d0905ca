use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{Notify, Semaphore};
use tokio::task::{AbortHandle, JoinHandle};

use crate::llm::LlmError;

/// Fixed pool width: at most this many LLM calls run concurrently.
pub const WORKER_SLOTS: usize = 3;

const GRACE_PERIOD: Duration = Duration::from_secs(5);
const FORCE_PERIOD: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Submitted after `shutdown`; the task was never started.
    #[error("worker pool is shut down")]
    ShutDown,

    /// The task panicked; the panic was contained inside the pool.
    #[error("background task panicked: {0}")]
    Panicked(String),
}

struct Shared {
    slots: Semaphore,
    active: AtomicUsize,
    idle: Notify,
}

/// Fixed-width async worker pool with graceful shutdown.
///
/// Submissions race the shutdown flag: anything accepted before
/// `shutdown` gets a grace period to finish, anything after is rejected
/// immediately. Panics never escape a worker.
pub struct WorkerPool {
    shared: Arc<Shared>,
    shutting_down: AtomicBool,
    aborts: Mutex<Vec<AbortHandle>>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::with_slots(WORKER_SLOTS)
    }

    pub fn with_slots(slots: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                slots: Semaphore::new(slots),
                active: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
            shutting_down: AtomicBool::new(false),
            aborts: Mutex::new(Vec::new()),
        }
    }

    /// Submit a task and get a handle to its result. Waits for a free
    /// slot before the task itself starts.
    pub fn submit<F, T>(&self, task: F) -> Result<JoinHandle<Result<T, PoolError>>, PoolError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_shut_down() {
            return Err(PoolError::ShutDown);
        }
        Ok(self.spawn_tracked(task))
    }

    /// Fire-and-forget submission: a task error or panic is logged and
    /// handed to `on_error`, nothing is returned to the caller.
    pub fn submit_detached<F, E>(&self, task: F, on_error: E)
    where
        F: Future<Output = Result<(), LlmError>> + Send + 'static,
        E: FnOnce(String) + Send + 'static,
    {
        if self.is_shut_down() {
            on_error(PoolError::ShutDown.to_string());
            return;
        }
        self.spawn_tracked(async move {
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::error!(%err, "background task failed");
                    on_error(err.to_string());
                }
                Err(payload) => {
                    let err = PoolError::Panicked(panic_message(payload.as_ref()));
                    tracing::error!(%err, "background task failed");
                    on_error(err.to_string());
                }
            }
        });
    }

    fn spawn_tracked<F, T>(&self, task: F) -> JoinHandle<Result<T, PoolError>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let guard = ActiveGuard::new(self.shared.clone());
        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            let _permit = shared
                .slots
                .acquire()
                .await
                .map_err(|_| PoolError::ShutDown)?;
            AssertUnwindSafe(task)
                .catch_unwind()
                .await
                .map_err(|payload| PoolError::Panicked(panic_message(payload.as_ref())))
        });
        let mut aborts = self.aborts.lock().unwrap_or_else(|e| e.into_inner());
        aborts.retain(|h| !h.is_finished());
        aborts.push(handle.abort_handle());
        handle
    }

    /// Stop accepting work, wait up to five seconds for in-flight tasks,
    /// then abort stragglers. Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        if tokio::time::timeout(GRACE_PERIOD, self.wait_idle())
            .await
            .is_err()
        {
            let pending: Vec<AbortHandle> = {
                let mut aborts = self.aborts.lock().unwrap_or_else(|e| e.into_inner());
                aborts.drain(..).collect()
            };
            for handle in pending {
                handle.abort();
            }
            if tokio::time::timeout(FORCE_PERIOD, self.wait_idle())
                .await
                .is_err()
            {
                tracing::error!("worker pool did not terminate cleanly");
            }
        }
        tracing::debug!("worker pool shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    async fn wait_idle(&self) {
        loop {
            // Register before checking so a decrement between the check
            // and the await is not missed.
            let notified = self.shared.idle.notified();
            if self.shared.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps the active count accurate even when a task is aborted before it
/// ever runs: the guard travels inside the spawned future and decrements
/// on drop.
struct ActiveGuard(Arc<Shared>);

impl ActiveGuard {
    fn new(shared: Arc<Shared>) -> Self {
        shared.active.fetch_add(1, Ordering::SeqCst);
        Self(shared)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
        self.0.idle.notify_waiters();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
