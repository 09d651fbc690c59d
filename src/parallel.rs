//! Running a fixed batch of independent producers and collecting the results.
use crate::task::panic_message;
use crate::{Error, Executor, JoinSet, Result};
use rayon::prelude::*;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};

/// Submits every producer to `executor`, then blocks until all of them have
/// finished. Results come back in submission order regardless of which
/// producer finished first.
///
/// # Errors
///
/// Returns the first failure observed among the producers, or
/// [`Error::PoolShutdown`] if the executor refuses a submission.
///
/// ```
/// use promise_flow::{run_all, Executor};
///
/// let executor = Executor::new(5).unwrap();
/// let parsed = run_all(
///     &executor,
///     ["11", "12", "13", "14"].map(|s| move || s.parse::<i32>().unwrap()),
/// );
/// assert_eq!(parsed, Ok(vec![11, 12, 13, 14]));
/// ```
pub fn run_all<T, F, I>(executor: &Executor, producers: I) -> Result<Vec<T>>
where
    T: Clone + Send + 'static,
    F: FnOnce() -> T + Send + 'static,
    I: IntoIterator<Item = F>,
{
    let mut set = JoinSet::new();
    for producer in producers {
        set.spawn(executor, producer)?;
    }
    set.join().get()
}

/// Fire-and-forget-then-drain execution on a work-stealing pool.
///
/// Unlike [`Executor`], no futures are handed out: a batch goes in, the
/// calling thread blocks, and either every result or the first error comes
/// out.
pub struct ParallelDrain {
    pool: rayon::ThreadPool,
}

impl ParallelDrain {
    /// A pool with one thread per logical CPU.
    pub fn new() -> Result<Self> {
        Self::build(rayon::ThreadPoolBuilder::new())
    }

    pub fn with_threads(threads: usize) -> Result<Self> {
        Self::build(rayon::ThreadPoolBuilder::new().num_threads(threads))
    }

    fn build(builder: rayon::ThreadPoolBuilder) -> Result<Self> {
        let pool = builder
            .thread_name(|index| format!("promise-drain-{index}"))
            .build()
            .map_err(|err| Error::Spawn(err.to_string()))?;
        tracing::debug!(threads = pool.current_num_threads(), "drain pool started");
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs every producer and returns their results in input order.
    ///
    /// # Errors
    ///
    /// A panicking producer is reported as [`Error::Producer`]. When several
    /// fail, one of their errors is returned.
    pub fn drain<T, F>(&self, producers: Vec<F>) -> Result<Vec<T>>
    where
        T: Send,
        F: FnOnce() -> T + Send,
    {
        self.drain_fallible(
            producers
                .into_iter()
                .map(|producer| move || Ok::<T, Error>(producer()))
                .collect(),
        )
    }

    /// Like [`drain`](Self::drain) for producers that can fail.
    pub fn drain_fallible<T, E, F>(&self, producers: Vec<F>) -> Result<Vec<T>>
    where
        T: Send,
        E: Display,
        F: FnOnce() -> std::result::Result<T, E> + Send,
    {
        self.pool.install(|| {
            producers
                .into_par_iter()
                .map(|producer| match panic::catch_unwind(AssertUnwindSafe(producer)) {
                    Ok(outcome) => outcome.map_err(|e| Error::Producer(e.to_string())),
                    Err(payload) => Err(Error::Producer(panic_message(payload.as_ref()))),
                })
                .collect()
        })
    }

    /// Applies `f` to every item in parallel, keeping input order.
    pub fn map<T, U, F>(&self, items: Vec<T>, f: F) -> Result<Vec<U>>
    where
        T: Send,
        U: Send,
        F: Fn(T) -> U + Send + Sync,
    {
        self.pool.install(|| {
            items
                .into_par_iter()
                .map(|item| {
                    panic::catch_unwind(AssertUnwindSafe(|| f(item)))
                        .map_err(|payload| Error::Producer(panic_message(payload.as_ref())))
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::ParallelDrain;
    use crate::Error;

    #[test]
    fn test_drain_keeps_input_order() {
        let drain = ParallelDrain::with_threads(3).unwrap();
        assert_eq!(drain.threads(), 3);
        let producers: Vec<_> = (0..32).map(|i| move || i * i).collect();
        let squares = drain.drain(producers).unwrap();
        assert_eq!(squares, (0..32).map(|i| i * i).collect::<Vec<_>>());
    }

    #[test]
    fn test_drain_surfaces_error() {
        let drain = ParallelDrain::with_threads(2).unwrap();
        let result = drain.map(vec!["11", "x", "13"], |s| s.parse::<i32>().unwrap());
        assert!(matches!(result, Err(Error::Producer(_))));

        let result = drain.drain_fallible(
            ["1", "2", "oops"]
                .into_iter()
                .map(|s| move || s.parse::<i32>())
                .collect(),
        );
        assert!(matches!(result, Err(Error::Producer(_))));
    }
}
