//! The write-once cell shared by a [`Promise`](crate::Promise) and its
//! [`Future`](crate::Future) handles.
use crate::task::panic_message;
use crate::{lock, Error, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Condvar, Mutex};
use std::task::{Poll, Waker};
use std::time::Duration;

pub(crate) type Continuation<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

pub(crate) struct Slot<T> {
    state: Mutex<State<T>>,
    settled: Condvar,
}

struct State<T> {
    outcome: Option<Result<T>>,
    continuations: Vec<Continuation<T>>,
    // Async waiters; several `Waiter`s may poll the same slot.
    wakers: Vec<Waker>,
}

impl<T: Clone + Send + 'static> Slot<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State {
                outcome: None,
                continuations: Vec::new(),
                wakers: Vec::new(),
            }),
            settled: Condvar::new(),
        }
    }

    /// Performs the one permitted transition out of pending. Returns `false`
    /// if the slot was already settled, in which case `outcome` is dropped.
    ///
    /// Continuations run on the calling thread after the lock is released, in
    /// the order they were registered.
    pub(crate) fn settle(&self, outcome: Result<T>) -> bool {
        let (continuations, wakers) = {
            let mut state = lock(&self.state);
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome.clone());
            (
                std::mem::take(&mut state.continuations),
                std::mem::take(&mut state.wakers),
            )
        };
        self.settled.notify_all();
        tracing::trace!(
            ok = outcome.is_ok(),
            continuations = continuations.len(),
            "slot settled"
        );

        for waker in wakers {
            waker.wake();
        }
        for continuation in continuations {
            run_continuation(continuation, outcome.clone());
        }
        true
    }

    /// Runs `continuation` once the slot settles. If it already has, the
    /// continuation runs right away on the calling thread.
    pub(crate) fn subscribe(&self, continuation: Continuation<T>) {
        let outcome = {
            let mut state = lock(&self.state);
            match state.outcome {
                Some(ref outcome) => outcome.clone(),
                None => {
                    state.continuations.push(continuation);
                    return;
                }
            }
        };
        run_continuation(continuation, outcome);
    }

    pub(crate) fn peek(&self) -> Option<Result<T>> {
        lock(&self.state).outcome.clone()
    }

    pub(crate) fn is_settled(&self) -> bool {
        lock(&self.state).outcome.is_some()
    }

    pub(crate) fn wait(&self) -> Result<T> {
        let mut state = lock(&self.state);
        loop {
            if let Some(ref outcome) = state.outcome {
                return outcome.clone();
            }
            state = self
                .settled
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Like [`wait`](Self::wait) but gives up with [`Error::TimedOut`] after
    /// `timeout`. The slot itself is left untouched.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> Result<T> {
        let state = lock(&self.state);
        let (state, _) = self
            .settled
            .wait_timeout_while(state, timeout, |state| state.outcome.is_none())
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match state.outcome {
            Some(ref outcome) => outcome.clone(),
            None => Err(Error::TimedOut),
        }
    }

    pub(crate) fn poll_outcome(&self, waker: &Waker) -> Poll<Result<T>> {
        let mut state = lock(&self.state);
        match state.outcome {
            Some(ref outcome) => Poll::Ready(outcome.clone()),
            None => {
                if !state.wakers.iter().any(|w| w.will_wake(waker)) {
                    state.wakers.push(waker.clone());
                }
                Poll::Pending
            }
        }
    }
}

/// Runs one continuation; a panic stops here and the caller moves on to the
/// next one.
fn run_continuation<T>(continuation: Continuation<T>, outcome: Result<T>) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || continuation(outcome))) {
        let message = panic_message(payload.as_ref());
        tracing::warn!(%message, "continuation panicked");
    }
}
