//! A fixed pool of worker threads fed from a shared task queue.
use crate::task::{panic_message, Origin, Runnable, Task};
use crate::{lock, Error, Future, Promise, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};

type Job = Box<dyn Runnable>;

/// Configuration for an [`Executor`].
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Number of worker threads. Always at least one.
    pub worker_threads: usize,
    /// Maximum number of queued tasks. `None` leaves the queue unbounded.
    pub queue_bound: Option<usize>,
    /// Worker threads are named `{thread_name}-{index}`.
    pub thread_name: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_threads: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            queue_bound: None,
            thread_name: String::from("promise-worker"),
        }
    }
}

/// Builder for configuring and creating an [`Executor`].
///
/// # Examples
///
/// ```
/// use promise_flow::ExecutorBuilder;
///
/// let executor = ExecutorBuilder::new()
///     .worker_threads(4)
///     .queue_bound(64)
///     .build()
///     .unwrap();
/// assert_eq!(executor.config().worker_threads, 4);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExecutorBuilder {
    config: ExecutorConfig,
}

impl ExecutorBuilder {
    /// Starts from [`ExecutorConfig::default`]: one worker per logical CPU
    /// and an unbounded queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn worker_threads(mut self, n: usize) -> Self {
        assert!(n > 0, "worker_threads must be > 0");

        self.config.worker_threads = n;
        self
    }

    /// Bounds the task queue. Once `bound` tasks are waiting,
    /// [`Executor::submit`] blocks until a worker takes one.
    pub fn queue_bound(mut self, bound: usize) -> Self {
        self.config.queue_bound = Some(bound);
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Spawns the worker threads.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if the OS refuses to start a thread.
    pub fn build(self) -> Result<Executor> {
        Executor::with_config(self.config)
    }
}

/// A pool of worker threads running submitted producers.
///
/// `Executor` is a cheap handle; clones share the same pool. Dropping the
/// last handle shuts the pool down gracefully: queued tasks still run, then
/// the workers exit.
///
/// Continuations registered with [`Future::map_on`] and the other `_on`
/// combinators do not keep the pool alive. If every handle is gone by the
/// time their source settles, the derived future fails with
/// [`Error::PoolShutdown`].
#[derive(Clone)]
pub struct Executor {
    inner: Arc<Inner>,
}

/// A handle that does not keep the pool running.
#[derive(Clone)]
pub(crate) struct WeakExecutor {
    inner: Weak<Inner>,
}

impl WeakExecutor {
    pub(crate) fn upgrade(&self) -> Option<Executor> {
        self.inner.upgrade().map(|inner| Executor { inner })
    }
}

struct Inner {
    config: ExecutorConfig,
    /// Taken on shutdown. Workers exit once every sender is gone and the
    /// queue is empty.
    sender: Mutex<Option<Sender<Job>>>,
    /// Kept so `shutdown_now` can drain tasks nobody has started.
    receiver: Receiver<Job>,
    abandon: Arc<AtomicBool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Executor {
    /// Creates an executor with the given number of worker threads and an
    /// unbounded queue.
    pub fn new(worker_threads: usize) -> Result<Self> {
        ExecutorBuilder::new().worker_threads(worker_threads).build()
    }

    /// # Panics
    ///
    /// Panics if `config.worker_threads == 0`.
    pub fn with_config(config: ExecutorConfig) -> Result<Self> {
        assert!(config.worker_threads > 0, "worker_threads must be > 0");

        let (sender, receiver) = match config.queue_bound {
            Some(bound) => crossbeam_channel::bounded(bound),
            None => crossbeam_channel::unbounded(),
        };
        let abandon = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(config.worker_threads);
        for id in 0..config.worker_threads {
            let worker = Worker {
                id,
                receiver: receiver.clone(),
                abandon: abandon.clone(),
            };
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name, id))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    // Dropping the sender lets the workers already started exit.
                    drop(sender);
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(Error::Spawn(err.to_string()));
                }
            }
        }

        tracing::debug!(
            workers = config.worker_threads,
            queue_bound = ?config.queue_bound,
            "executor started"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                sender: Mutex::new(Some(sender)),
                receiver,
                abandon,
                handles: Mutex::new(handles),
            }),
        })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.inner.config
    }

    /// Queues `producer` and returns a future of its result.
    ///
    /// A panic inside `producer` settles the future with
    /// [`Error::Producer`]; the worker thread keeps running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolShutdown`] if [`shutdown`](Self::shutdown) has
    /// been called.
    pub fn submit<T, F>(&self, producer: F) -> Result<Future<T>>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.spawn(move || Ok(producer()))
    }

    /// Like [`submit`](Self::submit) for a producer that can fail; an `Err`
    /// settles the future with [`Error::Producer`].
    pub fn submit_fallible<T, E, F>(&self, producer: F) -> Result<Future<T>>
    where
        T: Clone + Send + 'static,
        E: Display,
        F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
    {
        self.spawn(move || producer().map_err(|e| Error::Producer(e.to_string())))
    }

    fn spawn<T, F>(&self, body: F) -> Result<Future<T>>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (promise, future) = Promise::new();
        self.schedule(Box::new(Task::new(Origin::Producer, promise, body)))?;
        Ok(future)
    }

    pub(crate) fn downgrade(&self) -> WeakExecutor {
        WeakExecutor {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Queues `job`. A refused job is abandoned with
    /// [`Error::PoolShutdown`] before the error is returned.
    fn schedule(&self, job: Job) -> Result<()> {
        let sender = lock(&self.inner.sender).clone();
        let Some(sender) = sender else {
            job.abandon(Error::PoolShutdown);
            return Err(Error::PoolShutdown);
        };

        // Blocks only when the queue is bounded and full.
        sender.send(job).map_err(|err| {
            err.into_inner().abandon(Error::PoolShutdown);
            Error::PoolShutdown
        })
    }

    /// Queues a continuation without ever blocking. Continuations are
    /// dispatched from whichever thread settles their source, often a worker,
    /// so a full bounded queue runs the job on the calling thread instead.
    pub(crate) fn schedule_continuation(&self, job: Job) {
        let sender = lock(&self.inner.sender).clone();
        let Some(sender) = sender else {
            job.abandon(Error::PoolShutdown);
            return;
        };

        match sender.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                tracing::trace!("task queue full, running continuation inline");
                job.run();
            }
            Err(TrySendError::Disconnected(job)) => job.abandon(Error::PoolShutdown),
        }
    }

    /// Stops accepting new tasks. Tasks already queued still run.
    pub fn shutdown(&self) {
        if lock(&self.inner.sender).take().is_some() {
            tracing::debug!(queued = self.inner.receiver.len(), "executor shutting down");
        }
    }

    /// Stops accepting new tasks and abandons every task that has not
    /// started; their futures settle with [`Error::Cancelled`]. Running
    /// tasks are left to finish.
    ///
    /// Returns how many queued tasks were abandoned.
    pub fn shutdown_now(&self) -> usize {
        self.inner.abandon.store(true, Ordering::Release);
        self.shutdown();

        let mut abandoned = 0;
        while let Ok(job) = self.inner.receiver.try_recv() {
            job.abandon(Error::Cancelled);
            abandoned += 1;
        }
        tracing::debug!(abandoned, "executor stopped");
        abandoned
    }

    pub fn is_shutdown(&self) -> bool {
        lock(&self.inner.sender).is_none()
    }

    /// Waits for all worker threads to exit.
    ///
    /// Call after [`shutdown`](Self::shutdown) or
    /// [`shutdown_now`](Self::shutdown_now); otherwise this blocks forever.
    /// The calling thread is skipped when it is itself a worker.
    pub fn await_termination(&self) {
        let handles: Vec<_> = lock(&self.inner.handles).drain(..).collect();
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
    }
}

impl Default for Executor {
    /// An executor with one worker per logical CPU.
    ///
    /// # Panics
    ///
    /// Panics if the worker threads cannot be spawned.
    fn default() -> Self {
        match Executor::with_config(ExecutorConfig::default()) {
            Ok(executor) => executor,
            Err(err) => panic!("{err}"),
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.inner.config)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        lock(&self.sender).take();
    }
}

/// A worker thread in the executor.
///
/// Workers share one queue and take tasks in submission order. A task is
/// never executed once `shutdown_now` has raised the abandon flag.
struct Worker {
    id: usize,
    receiver: Receiver<Job>,
    abandon: Arc<AtomicBool>,
}

impl Worker {
    fn run(self) {
        tracing::debug!(worker = self.id, "worker started");

        while let Ok(job) = self.receiver.recv() {
            if self.abandon.load(Ordering::Acquire) {
                job.abandon(Error::Cancelled);
                continue;
            }
            // Tasks contain their own panics; this keeps the worker alive
            // whatever a job does.
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| job.run())) {
                let message = panic_message(payload.as_ref());
                tracing::warn!(worker = self.id, %message, "job panicked");
            }
        }

        tracing::debug!(worker = self.id, "worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::{Executor, ExecutorBuilder};
    use crate::Error;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn test_submit_after_shutdown_is_refused() {
        let executor = Executor::new(1).unwrap();
        executor.shutdown();
        assert!(executor.is_shutdown());
        assert_eq!(executor.submit(|| 1).err(), Some(Error::PoolShutdown));
        executor.await_termination();
    }

    #[test]
    fn test_workers_are_named() {
        let executor = ExecutorBuilder::new()
            .worker_threads(1)
            .thread_name("parse")
            .build()
            .unwrap();
        let name = executor
            .submit(|| thread::current().name().map(str::to_owned))
            .unwrap();
        assert_eq!(name.get(), Ok(Some(String::from("parse-0"))));
    }

    #[test]
    fn test_shutdown_now_cancels_queued_tasks() {
        let executor = Executor::new(1).unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let running = executor
            .submit(move || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                "ran"
            })
            .unwrap();
        started_rx.recv().unwrap();
        let queued = executor.submit(|| "never").unwrap();

        assert_eq!(executor.shutdown_now(), 1);
        assert_eq!(queued.get(), Err(Error::Cancelled));

        release_tx.send(()).unwrap();
        assert_eq!(running.get(), Ok("ran"));
        executor.await_termination();
    }
}
