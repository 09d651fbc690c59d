//! The read half of a promise and the combinators that derive new futures
//! from it.
use crate::join;
use crate::slot::Slot;
use crate::task::{Origin, Task};
use crate::{Error, Executor, Promise, Result};
use std::fmt::{self, Display};
use std::future::IntoFuture;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

/// A handle to a value that will be produced later.
///
/// Cloning a `Future` is cheap and every clone observes the same
/// settlement. Combinators take `&self`, so one future can feed any number
/// of derived futures.
///
/// Continuations attached with [`map`](Self::map), [`bind`](Self::bind) and
/// friends run on whichever thread settles the source. The `_on` variants
/// submit them to the given [`Executor`] instead.
pub struct Future<T: Clone + Send + 'static> {
    slot: Arc<Slot<T>>,
}

impl<T: Clone + Send + 'static> Future<T> {
    pub(crate) fn from_slot(slot: Arc<Slot<T>>) -> Self {
        Self { slot }
    }

    /// A future already settled with `value`.
    pub fn completed(value: T) -> Self {
        let (promise, future) = Promise::new();
        promise.resolve(value);
        future
    }

    /// A future already settled with `error`.
    pub fn failed(error: Error) -> Self {
        let (promise, future) = Promise::new();
        promise.reject(error);
        future
    }

    /// Blocks the calling thread until the future settles.
    ///
    /// Calling this from a continuation that the same future depends on
    /// never returns.
    pub fn get(&self) -> Result<T> {
        self.slot.wait()
    }

    /// Blocks for at most `timeout`, returning [`Error::TimedOut`] if the
    /// future is still pending by then. The future may still settle later.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T> {
        self.slot.wait_timeout(timeout)
    }

    /// The outcome if the future has settled, without blocking.
    pub fn try_get(&self) -> Option<Result<T>> {
        self.slot.peek()
    }

    pub fn is_done(&self) -> bool {
        self.slot.is_settled()
    }

    /// Settles a pending future with [`Error::Cancelled`].
    ///
    /// Returns `false` if the future had already settled, in which case it is
    /// left as it was. A task that has not started yet will not run; one that
    /// is running finishes, but its result is discarded.
    pub fn cancel(&self) -> bool {
        let cancelled = self.slot.settle(Err(Error::Cancelled));
        if cancelled {
            tracing::debug!("future cancelled");
        }
        cancelled
    }

    /// Calls `f` with the outcome once the future settles.
    pub fn on_complete<F>(&self, f: F)
    where
        F: FnOnce(Result<T>) + Send + 'static,
    {
        self.slot.subscribe(Box::new(f));
    }

    /// A future of `f` applied to this future's value. Failures pass through
    /// without calling `f`.
    pub fn map<U, F>(&self, f: F) -> Future<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.then(None, move |value| Ok(f(value)))
    }

    /// [`map`](Self::map) with `f` running on `executor`.
    ///
    /// The continuation holds only a weak handle to `executor`. If the pool
    /// is gone or shut down by the time this future settles, the derived
    /// future fails with [`Error::PoolShutdown`].
    pub fn map_on<U, F>(&self, executor: &Executor, f: F) -> Future<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.then(Some(executor), move |value| Ok(f(value)))
    }

    /// Like [`map`](Self::map) for a fallible `f`; an `Err` settles the
    /// derived future with [`Error::Composition`].
    pub fn try_map<U, E, F>(&self, f: F) -> Future<U>
    where
        U: Clone + Send + 'static,
        E: Display,
        F: FnOnce(T) -> std::result::Result<U, E> + Send + 'static,
    {
        self.then(None, move |value| {
            f(value).map_err(|e| Error::Composition(e.to_string()))
        })
    }

    pub fn try_map_on<U, E, F>(&self, executor: &Executor, f: F) -> Future<U>
    where
        U: Clone + Send + 'static,
        E: Display,
        F: FnOnce(T) -> std::result::Result<U, E> + Send + 'static,
    {
        self.then(Some(executor), move |value| {
            f(value).map_err(|e| Error::Composition(e.to_string()))
        })
    }

    /// Sequences a dependent asynchronous step.
    ///
    /// `f` is called only once this future has a value, and the returned
    /// future settles with whatever the future from `f` settles with.
    ///
    /// ```
    /// use promise_flow::ExecutorBuilder;
    ///
    /// let executor = ExecutorBuilder::new().worker_threads(2).build().unwrap();
    /// let user = executor.submit(|| String::from("usr-1")).unwrap();
    /// let pool = executor.clone();
    /// let rating = user.bind(move |_user| pool.submit(|| 800).unwrap());
    /// assert_eq!(rating.get(), Ok(800));
    /// ```
    pub fn bind<U, F>(&self, f: F) -> Future<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Future<U> + Send + 'static,
    {
        self.then(None, move |value| Ok(f(value))).flatten()
    }

    /// [`bind`](Self::bind) with `f` running on `executor`.
    pub fn bind_on<U, F>(&self, executor: &Executor, f: F) -> Future<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Future<U> + Send + 'static,
    {
        self.then(Some(executor), move |value| Ok(f(value))).flatten()
    }

    /// Settles with `f(a, b)` once both this future and `other` have values.
    /// If either fails, the first failure observed wins.
    pub fn combine<U, R, F>(&self, other: &Future<U>, f: F) -> Future<R>
    where
        U: Clone + Send + 'static,
        R: Clone + Send + 'static,
        F: FnOnce(T, U) -> R + Send + 'static,
    {
        self.zip(other).map(move |(a, b)| f(a, b))
    }

    pub fn combine_on<U, R, F>(&self, executor: &Executor, other: &Future<U>, f: F) -> Future<R>
    where
        U: Clone + Send + 'static,
        R: Clone + Send + 'static,
        F: FnOnce(T, U) -> R + Send + 'static,
    {
        self.zip(other).map_on(executor, move |(a, b)| f(a, b))
    }

    /// Pairs the values of this future and `other`.
    pub fn zip<U>(&self, other: &Future<U>) -> Future<(T, U)>
    where
        U: Clone + Send + 'static,
    {
        join::zip(self, other)
    }

    /// Returns a [`std::future::Future`] that resolves with the outcome.
    pub fn wait_async(&self) -> Waiter<T> {
        Waiter {
            slot: self.slot.clone(),
        }
    }

    fn then<U, F>(&self, executor: Option<&Executor>, f: F) -> Future<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        let (promise, future) = Promise::new();
        let executor = executor.map(Executor::downgrade);
        self.on_complete(move |outcome| match outcome {
            Ok(value) => {
                Task::new(Origin::Composition, promise, move || f(value))
                    .dispatch(executor.as_ref());
            }
            Err(error) => {
                promise.reject(error);
            }
        });
        future
    }
}

impl<T: Clone + Send + 'static> Future<Future<T>> {
    /// Removes one level of nesting. The result settles when the inner future
    /// does.
    pub fn flatten(&self) -> Future<T> {
        let (promise, future) = Promise::new();
        self.on_complete(move |outcome| match outcome {
            Ok(inner) => inner.on_complete(move |outcome| {
                promise.complete(outcome);
            }),
            Err(error) => {
                promise.reject(error);
            }
        });
        future
    }
}

impl<T: Clone + Send + 'static> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T: Clone + Send + fmt::Debug + 'static> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("outcome", &self.slot.peek())
            .finish()
    }
}

impl<T: Clone + Send + 'static> IntoFuture for Future<T> {
    type Output = Result<T>;
    type IntoFuture = Waiter<T>;

    fn into_future(self) -> Self::IntoFuture {
        Waiter { slot: self.slot }
    }
}

/// Awaits a [`Future`] from async code. Created by [`Future::wait_async`]
/// or by `.await`ing the future directly.
pub struct Waiter<T: Clone + Send + 'static> {
    slot: Arc<Slot<T>>,
}

impl<T: Clone + Send + 'static> std::future::Future for Waiter<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.slot.poll_outcome(cx.waker())
    }
}
