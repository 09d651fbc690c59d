use crate::slot::Slot;
use crate::{Error, Future, Result};
use std::fmt;
use std::sync::Arc;

/// The write half of a future. A `Promise` settles its [`Future`] exactly
/// once; the future may be cloned and read from any number of threads.
///
/// # Examples
///
/// ```
/// use promise_flow::Promise;
/// use std::thread;
/// let (promise, future) = Promise::<String>::new();
///
/// let task1 = thread::spawn(move || {
///     println!("Received {:?}", future.get());
/// });
/// promise.resolve("Hi".into());
/// task1.join().expect("The task1 thread has panicked.");
/// ```
pub struct Promise<T: Clone + Send + 'static> {
    slot: Arc<Slot<T>>,
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Creates an unsettled promise together with the future it feeds.
    pub fn new() -> (Self, Future<T>) {
        let slot = Arc::new(Slot::new());
        (Self { slot: slot.clone() }, Future::from_slot(slot))
    }

    /// Settles the future with `value`.
    ///
    /// Returns `false` if the future had already been settled, for example
    /// because a reader cancelled it.
    pub fn resolve(self, value: T) -> bool {
        self.complete(Ok(value))
    }

    /// Settles the future with `error`.
    pub fn reject(self, error: Error) -> bool {
        self.complete(Err(error))
    }

    pub fn complete(self, outcome: Result<T>) -> bool {
        self.slot.settle(outcome)
    }

    /// `true` once the future has been settled by anyone.
    pub fn is_settled(&self) -> bool {
        self.slot.is_settled()
    }
}

impl<T: Clone + Send + 'static> Drop for Promise<T> {
    /// If this is an unsettled promise, fail the future so waiters wake up.
    fn drop(&mut self) {
        if !self.slot.is_settled() {
            self.slot.settle(Err(Error::ProducerDropped));
        }
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("settled", &self.slot.is_settled())
            .finish()
    }
}
