//! Pluggable execution backends for permutation workloads.
//!
//! The validators fan thousands of independent backtests out through an
//! [`Executor`]; results come back through task handles, and `wait_all`
//! surfaces the first failure while letting the remaining tasks run to
//! completion.

use std::sync::mpsc;

use tracing::warn;
use trading_core::{Result, TradingError};

/// A unit of work: runs once, reports success or a structured error.
pub type Task = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// Handle to one submitted task.
pub struct TaskHandle {
    receiver: mpsc::Receiver<Result<()>>,
}

impl TaskHandle {
    fn pair() -> (mpsc::Sender<Result<()>>, TaskHandle) {
        let (sender, receiver) = mpsc::channel();
        (sender, TaskHandle { receiver })
    }

    /// Block until the task finishes. A task that died without reporting
    /// (a panic in the worker) comes back as `PermutationFailure`.
    pub fn wait(self) -> Result<()> {
        self.receiver.recv().unwrap_or_else(|_| {
            Err(TradingError::PermutationFailure(
                "task terminated without a result".to_string(),
            ))
        })
    }
}

/// Scheduling seam for the permutation loops.
pub trait Executor {
    fn submit(&self, task: Task) -> TaskHandle;

    /// Await every handle; the first error wins, later tasks still finish.
    fn wait_all(&self, handles: Vec<TaskHandle>) -> Result<()> {
        let mut first_error: Option<TradingError> = None;
        for handle in handles {
            if let Err(err) = handle.wait() {
                if first_error.is_none() {
                    warn!(error = %err, "task failed");
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Runs each task on the submitting thread. Deterministic ordering; the
/// debugging baseline.
#[derive(Default)]
pub struct InlineExecutor;

impl InlineExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Executor for InlineExecutor {
    fn submit(&self, task: Task) -> TaskHandle {
        let (sender, handle) = TaskHandle::pair();
        let _ = sender.send(task());
        handle
    }
}

/// Fixed-size work-stealing pool (the default backend). A size of zero
/// means hardware concurrency.
pub struct ThreadPoolExecutor {
    pool: rayon::ThreadPool,
}

impl ThreadPoolExecutor {
    pub fn new(num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| TradingError::InvalidArgument(format!("thread pool: {e}")))?;
        Ok(Self { pool })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Executor for ThreadPoolExecutor {
    fn submit(&self, task: Task) -> TaskHandle {
        let (sender, handle) = TaskHandle::pair();
        self.pool.spawn(move || {
            let _ = sender.send(task());
        });
        handle
    }
}

/// Async task pool over a multi-thread tokio runtime; permutation work is
/// CPU-bound, so tasks run on the blocking pool.
pub struct AsyncExecutor {
    runtime: tokio::runtime::Runtime,
}

impl AsyncExecutor {
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| TradingError::InvalidArgument(format!("tokio runtime: {e}")))?;
        Ok(Self { runtime })
    }
}

impl Executor for AsyncExecutor {
    fn submit(&self, task: Task) -> TaskHandle {
        let (sender, handle) = TaskHandle::pair();
        self.runtime.spawn_blocking(move || {
            let _ = sender.send(task());
        });
        handle
    }
}
