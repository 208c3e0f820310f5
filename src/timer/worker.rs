//! Logical workers: single-consumer job queues.
//!
//! A [`Worker`] is an event-loop-like execution context. Jobs submitted to it
//! run one at a time, in submission order, on a single Tokio task. Everything
//! bound to a worker (a session's transitions, its timer firings, its leg I/O)
//! is therefore serialized without locking the bound state.

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use super::failure::FailureSink;
use crate::core::TimerError;

type Job = Box<dyn FnOnce() + Send + 'static>;

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: Cell<Option<WorkerId>> = const { Cell::new(None) };
}

/// Identifier of a [`Worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    /// Numeric value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Handle to a logical worker. Cheap to clone.
///
/// The worker's task ends once every handle (and every job holding one) has
/// been dropped.
#[derive(Debug, Clone)]
pub struct Worker {
    id: WorkerId,
    tx: mpsc::UnboundedSender<Job>,
    failures: FailureSink,
}

impl Worker {
    /// Spawn a worker on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn(failures: FailureSink) -> Self {
        let id = WorkerId(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed));
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let sink = failures.clone();

        tokio::spawn(async move {
            debug!(worker_id = %id, "worker started");
            while let Some(job) = rx.recv().await {
                run_job(id, &sink, job);
            }
            debug!(worker_id = %id, "worker stopped");
        });

        Self { id, tx, failures }
    }

    /// The worker's id.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// The failure channel jobs on this worker report to.
    pub fn failures(&self) -> &FailureSink {
        &self.failures
    }

    /// Queue a job. It runs after every job queued before it.
    pub fn execute<F>(&self, job: F) -> Result<(), TimerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx
            .send(Box::new(job))
            .map_err(|_| TimerError::WorkerStopped)
    }

    /// Resolve once every job queued before this call has run.
    pub async fn barrier(&self) -> Result<(), TimerError> {
        let (tx, rx) = oneshot::channel();
        self.execute(move || {
            let _ = tx.send(());
        })?;
        rx.await.map_err(|_| TimerError::WorkerStopped)
    }

    /// Id of the worker running the current job, if any.
    pub fn current() -> Option<WorkerId> {
        CURRENT.with(Cell::get)
    }

    /// Whether the caller is running on this worker.
    pub fn is_current(&self) -> bool {
        Self::current() == Some(self.id)
    }
}

fn run_job(id: WorkerId, failures: &FailureSink, job: Job) {
    let previous = CURRENT.with(|c| c.replace(Some(id)));
    let ok = failures.isolate(&id.to_string(), job);
    CURRENT.with(|c| c.set(previous));
    if !ok {
        trace!(worker_id = %id, "job failed, continuing");
    }
}

/// A fixed set of workers handed out round-robin.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: Arc<[Worker]>,
    next: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one) sharing `failures`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(size: usize, failures: FailureSink) -> Self {
        let workers: Vec<Worker> = (0..size.max(1))
            .map(|_| Worker::spawn(failures.clone()))
            .collect();
        Self {
            workers: workers.into(),
            next: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// One worker per available CPU.
    pub fn with_default_size(failures: FailureSink) -> Self {
        let size = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(size, failures)
    }

    /// Next worker in round-robin order.
    pub fn next(&self) -> Worker {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        self.workers[idx].clone()
    }

    /// Number of workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Always `false`; a pool holds at least one worker.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// All workers.
    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }
}
