//! Aggregating several futures into one.
//!
//! When more than one member fails, the aggregate settles with whichever
//! failure is observed first. Which one that is depends on thread timing.
use crate::{lock, Error, Executor, Future, Promise, Result};
use std::sync::{Arc, Mutex};

struct ZipState<T: Clone + Send + 'static, U: Clone + Send + 'static> {
    left: Option<T>,
    right: Option<U>,
    promise: Option<Promise<(T, U)>>,
}

type Settlement<T> = Option<(Promise<T>, Result<T>)>;

impl<T: Clone + Send + 'static, U: Clone + Send + 'static> ZipState<T, U> {
    fn ready(&mut self) -> Settlement<(T, U)> {
        if self.left.is_none() || self.right.is_none() {
            return None;
        }
        let promise = self.promise.take()?;
        let pair = (self.left.take()?, self.right.take()?);
        Some((promise, Ok(pair)))
    }

    fn fail(&mut self, error: Error) -> Settlement<(T, U)> {
        self.promise.take().map(|promise| (promise, Err(error)))
    }
}

/// Settles outside of any lock, so downstream continuations never run while
/// the aggregate state is held.
fn settle<T: Clone + Send + 'static>(settlement: Settlement<T>) {
    if let Some((promise, outcome)) = settlement {
        promise.complete(outcome);
    }
}

pub(crate) fn zip<T, U>(left: &Future<T>, right: &Future<U>) -> Future<(T, U)>
where
    T: Clone + Send + 'static,
    U: Clone + Send + 'static,
{
    let (promise, future) = Promise::new();
    let state = Arc::new(Mutex::new(ZipState {
        left: None,
        right: None,
        promise: Some(promise),
    }));

    let left_state = state.clone();
    left.on_complete(move |outcome| {
        let settlement = {
            let mut state = lock(&left_state);
            match outcome {
                Ok(value) => {
                    state.left = Some(value);
                    state.ready()
                }
                Err(error) => state.fail(error),
            }
        };
        settle(settlement);
    });

    right.on_complete(move |outcome| {
        let settlement = {
            let mut state = lock(&state);
            match outcome {
                Ok(value) => {
                    state.right = Some(value);
                    state.ready()
                }
                Err(error) => state.fail(error),
            }
        };
        settle(settlement);
    });

    future
}

struct JoinState<T: Clone + Send + 'static> {
    values: Vec<Option<T>>,
    remaining: usize,
    promise: Option<Promise<Vec<T>>>,
}

impl<T: Clone + Send + 'static> JoinState<T> {
    fn store(&mut self, index: usize, value: T) -> Settlement<Vec<T>> {
        if self.promise.is_none() {
            return None;
        }
        self.values[index] = Some(value);
        self.remaining -= 1;
        if self.remaining > 0 {
            return None;
        }
        let values = std::mem::take(&mut self.values).into_iter().flatten().collect();
        self.promise.take().map(|promise| (promise, Ok(values)))
    }

    fn fail(&mut self, error: Error) -> Settlement<Vec<T>> {
        self.promise.take().map(|promise| (promise, Err(error)))
    }
}

/// Gathers the values of `futures`, in input order, into one future.
///
/// The result fails as soon as any member fails. An empty input settles
/// immediately with an empty vector.
///
/// ```
/// use promise_flow::{join_all, Future};
///
/// let joined = join_all([Future::completed(1), Future::completed(2)]);
/// assert_eq!(joined.get(), Ok(vec![1, 2]));
/// ```
pub fn join_all<T, I>(futures: I) -> Future<Vec<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Future<T>>,
{
    let futures: Vec<Future<T>> = futures.into_iter().collect();
    if futures.is_empty() {
        return Future::completed(Vec::new());
    }

    let (promise, joined) = Promise::new();
    let state = Arc::new(Mutex::new(JoinState {
        values: vec![None; futures.len()],
        remaining: futures.len(),
        promise: Some(promise),
    }));

    for (index, future) in futures.iter().enumerate() {
        let state = state.clone();
        future.on_complete(move |outcome| {
            let settlement = {
                let mut state = lock(&state);
                match outcome {
                    Ok(value) => state.store(index, value),
                    Err(error) => state.fail(error),
                }
            };
            settle(settlement);
        });
    }
    joined
}

/// Like [`join_all`] but discards the values.
pub fn all_of<T, I>(futures: I) -> Future<()>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Future<T>>,
{
    let futures: Vec<Future<T>> = futures.into_iter().collect();
    if futures.is_empty() {
        return Future::completed(());
    }

    let (promise, joined) = Promise::new();
    let state = Arc::new(Mutex::new((futures.len(), Some(promise))));

    for future in &futures {
        let state = state.clone();
        future.on_complete(move |outcome| {
            let settlement = {
                let mut guard = lock(&state);
                let (remaining, promise) = &mut *guard;
                match outcome {
                    Ok(_) => {
                        *remaining = remaining.saturating_sub(1);
                        if *remaining == 0 {
                            promise.take().map(|promise| (promise, Ok(())))
                        } else {
                            None
                        }
                    }
                    Err(error) => promise.take().map(|promise| (promise, Err(error))),
                }
            };
            settle(settlement);
        });
    }
    joined
}

/// An ordered collection of futures that can be joined or cancelled as a
/// group.
///
/// Dropping a `JoinSet` leaves its futures running; use
/// [`cancel_all`](Self::cancel_all) to stop the ones that are still pending.
pub struct JoinSet<T: Clone + Send + 'static> {
    futures: Vec<Future<T>>,
}

impl<T: Clone + Send + 'static> JoinSet<T> {
    /// Creates a new, empty `JoinSet`.
    pub fn new() -> Self {
        Self {
            futures: Vec::new(),
        }
    }

    /// Submits `producer` to `executor` and adds its future to the set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolShutdown`] if the executor no longer accepts work;
    /// the set is left unchanged.
    pub fn spawn<F>(&mut self, executor: &Executor, producer: F) -> Result<()>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let future = executor.submit(producer)?;
        self.futures.push(future);
        Ok(())
    }

    pub fn push(&mut self, future: Future<T>) {
        self.futures.push(future);
    }

    pub fn len(&self) -> usize {
        self.futures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.futures.is_empty()
    }

    /// Number of members that have settled, successfully or not.
    pub fn settled(&self) -> usize {
        self.futures.iter().filter(|f| f.is_done()).count()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Future<T>> {
        self.futures.iter()
    }

    /// A future of every member's value in insertion order. See [`join_all`].
    pub fn join(&self) -> Future<Vec<T>> {
        join_all(self.futures.iter().cloned())
    }

    /// A future that settles once every member has a value. See [`all_of`].
    pub fn join_unit(&self) -> Future<()> {
        all_of(self.futures.iter().cloned())
    }

    /// Cancels every pending member and empties the set.
    ///
    /// Returns how many members were still pending.
    pub fn cancel_all(&mut self) -> usize {
        self.futures.drain(..).filter(|f| f.cancel()).count()
    }
}

impl<T: Clone + Send + 'static> Default for JoinSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> FromIterator<Future<T>> for JoinSet<T> {
    fn from_iter<I: IntoIterator<Item = Future<T>>>(iter: I) -> Self {
        Self {
            futures: iter.into_iter().collect(),
        }
    }
}

impl<T: Clone + Send + 'static> Extend<Future<T>> for JoinSet<T> {
    fn extend<I: IntoIterator<Item = Future<T>>>(&mut self, iter: I) {
        self.futures.extend(iter);
    }
}
