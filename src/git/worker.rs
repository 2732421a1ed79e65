//! Background worker that runs VCS jobs one at a time.
//!
//! The worker owns a dedicated thread with a current-thread tokio runtime, so
//! child processes, timeouts and kills are handled by tokio while the queue
//! itself stays strictly FIFO. Jobs from different buffers interleave on the
//! queue; jobs from one buffer are naturally serialised by it.

use color_eyre::eyre::{Result, eyre};
use futures::FutureExt;
use futures::future::BoxFuture;
use log::{debug, error, trace};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use tokio::sync::mpsc;

/// A unit of work for the queue.
pub struct Task {
    name: String,
    generation: u64,
    job: BoxFuture<'static, Result<()>>,
}

impl Task {
    pub fn new<F>(name: impl Into<String>, job: F) -> Self
    where
        F: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            generation: 0,
            job: Box::pin(job),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("generation", &self.generation)
            .finish()
    }
}

#[derive(Debug, Default)]
struct QueueState {
    active: AtomicBool,
    pending: AtomicUsize,
    generation: AtomicU64,
}

#[derive(Debug)]
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<Task>,
    state: Arc<QueueState>,
}

impl TaskQueue {
    /// Start the worker thread.
    pub fn new() -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(QueueState::default());
        let worker_state = Arc::clone(&state);

        thread::Builder::new()
            .name("gutterline-vcs".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("Failed to start VCS worker runtime: {e}");
                        return;
                    }
                };
                runtime.block_on(Self::run_worker(rx, worker_state));
                debug!("VCS worker stopped");
            })
            .map_err(|e| eyre!("Could not spawn VCS worker thread: {e}"))?;

        Ok(Self { tx, state })
    }

    async fn run_worker(mut rx: mpsc::UnboundedReceiver<Task>, state: Arc<QueueState>) {
        while let Some(task) = rx.recv().await {
            if task.generation < state.generation.load(Ordering::SeqCst) {
                trace!("Dropping cancelled task {}", task.name);
                state.pending.fetch_sub(1, Ordering::SeqCst);
                continue;
            }

            state.active.store(true, Ordering::SeqCst);
            state.pending.fetch_sub(1, Ordering::SeqCst);
            trace!("Running task {}", task.name);

            match AssertUnwindSafe(task.job).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Task {} failed: {e}", task.name),
                Err(_) => error!("Task {} panicked", task.name),
            }

            state.active.store(false, Ordering::SeqCst);
        }
    }

    /// Append a task to the queue.
    pub fn submit(&self, mut task: Task) {
        task.generation = self.state.generation.load(Ordering::SeqCst);
        self.state.pending.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.tx.send(task) {
            self.state.pending.fetch_sub(1, Ordering::SeqCst);
            error!("VCS worker is gone, dropping task {}", e.0.name);
        }
    }

    /// Drop every task that has not started yet. The running task, if any,
    /// finishes normally.
    pub fn cancel_all(&self) {
        let dropped = self.state.pending.load(Ordering::SeqCst);
        self.state.generation.fetch_add(1, Ordering::SeqCst);
        debug!("Cancelling {dropped} queued task(s)");
    }

    /// Whether a task is running or waiting.
    pub fn busy(&self) -> bool {
        self.state.active.load(Ordering::SeqCst) || self.state.pending.load(Ordering::SeqCst) > 0
    }
}
