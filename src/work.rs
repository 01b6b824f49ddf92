//! Background work queue.
//!
//! A fixed-size pool of worker threads, owned by a dedicated tokio runtime,
//! that runs deferred units of work off the render thread. Each submission
//! returns a [`TaskHandle`] the caller can poll without blocking once per
//! frame, or wait on from a thread that is allowed to block.
//!
//! A task that panics does not take its worker down: the panic is caught by
//! the runtime and surfaces as [`TileError::WorkerFault`] on the handle.

use std::any::Any;
use std::future::Future;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::JoinError;
use tracing::{debug, error};

use crate::error::TileError;

/// Default number of worker threads.
pub const DEFAULT_WORKERS: usize = 8;

const WORKER_THREAD_NAME: &str = "slippy-worker";

/// Fixed-size worker pool.
pub struct WorkQueue {
    runtime: Option<Runtime>,
    workers: usize,
}

impl WorkQueue {
    /// Start a pool with `workers` threads (minimum 1).
    pub fn new(workers: usize) -> Result<Self, TileError> {
        let workers = workers.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name(WORKER_THREAD_NAME)
            .enable_all()
            .build()
            .map_err(|e| TileError::WorkerFault {
                message: format!("Failed to start worker pool: {}", e),
            })?;

        debug!(workers, "Started work queue");
        Ok(Self {
            runtime: Some(runtime),
            workers,
        })
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run an async unit of work on the pool.
    pub fn submit<F, T>(&self, work: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.spawn_reporting(work, |result: Result<T, TileError>| result)
    }

    /// Run an async unit of work whose own failures are [`TileError`]s.
    ///
    /// The handle resolves to the work's result, or to a worker fault if
    /// the work panicked.
    pub fn submit_fallible<F, T>(&self, work: F) -> TaskHandle<T>
    where
        F: Future<Output = Result<T, TileError>> + Send + 'static,
        T: Send + 'static,
    {
        self.spawn_reporting(
            work,
            |result: Result<Result<T, TileError>, TileError>| result.and_then(|inner| inner),
        )
    }

    /// Run a blocking closure on the pool's blocking threads.
    pub fn submit_blocking<F, T>(&self, work: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        if let Some(runtime) = &self.runtime {
            let task = runtime.spawn_blocking(work);
            runtime.spawn(async move {
                let _ = tx.send(task.await.map_err(fault_from_join));
            });
        }
        TaskHandle::new(rx)
    }

    /// Handle to the underlying runtime, for spawning from other threads.
    pub fn handle(&self) -> Option<Handle> {
        self.runtime.as_ref().map(|rt| rt.handle().clone())
    }

    /// Stop the pool, waiting up to `timeout` for running tasks.
    ///
    /// Handles for unfinished tasks resolve to [`TileError::QueueClosed`].
    pub fn shutdown(mut self, timeout: Duration) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(timeout);
            debug!("Work queue shut down");
        }
    }

    fn spawn_reporting<F, O, T>(
        &self,
        work: F,
        flatten: fn(Result<O, TileError>) -> Result<T, TileError>,
    ) -> TaskHandle<T>
    where
        F: Future<Output = O> + Send + 'static,
        O: Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        if let Some(runtime) = &self.runtime {
            let task = runtime.spawn(work);
            runtime.spawn(async move {
                let result = flatten(task.await.map_err(fault_from_join));
                // The receiver may have been dropped; nobody wants the result.
                let _ = tx.send(result);
            });
        }
        TaskHandle::new(rx)
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        // Never block the dropping thread (usually the render thread).
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

fn fault_from_join(err: JoinError) -> TileError {
    if err.is_panic() {
        let message = panic_message(err.into_panic());
        error!(%message, "Worker task panicked");
        TileError::WorkerFault { message }
    } else {
        TileError::WorkerFault {
            message: "task was cancelled".to_string(),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Pending result of a submitted unit of work.
///
/// Dropping the handle abandons the result; the work itself still runs
/// to completion.
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, TileError>>,
    taken: bool,
}

impl<T> TaskHandle<T> {
    fn new(rx: oneshot::Receiver<Result<T, TileError>>) -> Self {
        Self { rx, taken: false }
    }

    /// Poll for the result without blocking.
    ///
    /// Returns `None` while the work is running. Returns the result exactly
    /// once; later calls return `None`.
    pub fn try_take(&mut self) -> Option<Result<T, TileError>> {
        if self.taken {
            return None;
        }
        let result = match self.rx.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Closed) => Err(TileError::QueueClosed),
        };
        self.taken = true;
        Some(result)
    }

    /// Whether the result has already been taken with [`try_take`](Self::try_take).
    pub fn is_taken(&self) -> bool {
        self.taken
    }

    /// Block the current thread until the result is ready.
    ///
    /// # Panics
    ///
    /// Panics if called from inside an async runtime; use [`join`](Self::join) there.
    pub fn wait(self) -> Result<T, TileError> {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(TileError::QueueClosed))
    }

    /// Await the result from async code.
    pub async fn join(self) -> Result<T, TileError> {
        self.rx.await.unwrap_or(Err(TileError::QueueClosed))
    }
}
