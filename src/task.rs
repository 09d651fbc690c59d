use crate::executor::WeakExecutor;
use crate::{Error, Promise, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Work the executor can either run or give up on.
pub(crate) trait Runnable: Send {
    fn run(self: Box<Self>);

    /// Settles the task's future with `reason` without running it.
    fn abandon(self: Box<Self>, reason: Error);
}

/// Where a task's closure came from, which decides how its panics are
/// reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    Producer,
    Composition,
}

impl Origin {
    pub(crate) fn failure(self, message: String) -> Error {
        match self {
            Origin::Producer => Error::Producer(message),
            Origin::Composition => Error::Composition(message),
        }
    }
}

/// A closure bound to the promise it settles.
pub(crate) struct Task<U: Clone + Send + 'static, F> {
    body: F,
    promise: Promise<U>,
    origin: Origin,
}

impl<U, F> Task<U, F>
where
    U: Clone + Send + 'static,
    F: FnOnce() -> Result<U> + Send + 'static,
{
    pub(crate) fn new(origin: Origin, promise: Promise<U>, body: F) -> Self {
        Self {
            body,
            promise,
            origin,
        }
    }

    /// Runs the task on the calling thread, or hands it to `executor`.
    pub(crate) fn dispatch(self, executor: Option<&WeakExecutor>) {
        match executor.map(WeakExecutor::upgrade) {
            None => Box::new(self).run(),
            Some(Some(executor)) => executor.schedule_continuation(Box::new(self)),
            Some(None) => Box::new(self).abandon(Error::PoolShutdown),
        }
    }
}

impl<U, F> Runnable for Task<U, F>
where
    U: Clone + Send + 'static,
    F: FnOnce() -> Result<U> + Send + 'static,
{
    fn run(self: Box<Self>) {
        let Task {
            body,
            promise,
            origin,
        } = *self;

        if promise.is_settled() {
            tracing::trace!(?origin, "skipping task whose future is already settled");
            return;
        }

        let outcome = match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!(?origin, %message, "task panicked");
                Err(origin.failure(message))
            }
        };
        promise.complete(outcome);
    }

    fn abandon(self: Box<Self>, reason: Error) {
        tracing::warn!(origin = ?self.origin, %reason, "task abandoned");
        self.promise.reject(reason);
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("task panicked")
    }
}
