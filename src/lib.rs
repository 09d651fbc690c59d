//! Promise/future combinators running on a pool of worker threads.
//!
//! A producer submitted to an [`Executor`] hands back a [`Future`] right
//! away. Combinators such as [`Future::map`], [`Future::bind`] and
//! [`Future::combine`] derive new futures that settle once their sources do,
//! and [`join_all`] gathers many futures into one.
//!
//! # Examples
//!
//! ```
//! use promise_flow::{join_all, ExecutorBuilder};
//!
//! let executor = ExecutorBuilder::new().worker_threads(5).build().unwrap();
//! let futures: Vec<_> = ["11", "12", "13", "14"]
//!     .into_iter()
//!     .map(|s| executor.submit(move || s.parse::<i32>().unwrap()).unwrap())
//!     .collect();
//!
//! assert_eq!(join_all(futures).get().unwrap(), vec![11, 12, 13, 14]);
//! ```
use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod executor;
pub mod future;
pub mod join;
pub mod parallel;
pub mod promise;
mod slot;
mod task;

pub use executor::{Executor, ExecutorBuilder, ExecutorConfig};
pub use future::{Future, Waiter};
pub use join::{all_of, join_all, JoinSet};
pub use parallel::{run_all, ParallelDrain};
pub use promise::Promise;

/// Failures stored in a future's completion slot or returned by the pool.
///
/// Cloneable so that every reader of a settled future observes the same
/// failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("producer failed: {0}")]
    Producer(String),
    #[error("composition failed: {0}")]
    Composition(String),
    #[error("future was cancelled")]
    Cancelled,
    #[error("timed out waiting for future")]
    TimedOut,
    #[error("executor has been shut down")]
    PoolShutdown,
    #[error("promise was dropped before it was settled")]
    ProducerDropped,
    #[error("failed to start worker pool: {0}")]
    Spawn(String),
}

impl Error {
    /// `true` for failures raised by user code, as opposed to the caller
    /// giving up on the future or the pool refusing work.
    pub fn is_task_failure(&self) -> bool {
        matches!(self, Error::Producer(_) | Error::Composition(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// No user code runs while a crate lock is held, so a poisoned lock still
/// guards consistent state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
