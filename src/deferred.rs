use std::pin::pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::SignalError;

enum State<T> {
    Pending,
    Resolved(T),
    Rejected(SignalError),
}

struct Shared<T> {
    state: Mutex<State<T>>,
    settled: Notify,
}

/// A resolvable/rejectable placeholder for a value produced later.
///
/// The owner settles it exactly once through [`resolve`](Deferred::resolve) or
/// [`reject`](Deferred::reject); later settle calls are ignored. Awaiting
/// happens through read-only [`DeferredHandle`]s, and every handle observes
/// the same outcome. There is no cancellation: a deferred that never settles
/// leaves its waiters suspended, and the surrounding test timeout is what
/// abandons them.
pub struct Deferred<T> {
    shared: Arc<Shared<T>>,
}

/// Read-only awaitable side of a [`Deferred`].
pub struct DeferredHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Deferred<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Pending),
                settled: Notify::new(),
            }),
        }
    }

    /// Hand out an awaitable for this deferred.
    pub fn handle(&self) -> DeferredHandle<T> {
        DeferredHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Settle with a value. Ignored if already settled.
    pub fn resolve(&self, value: T) {
        self.settle(State::Resolved(value));
    }

    /// Settle with an error. Ignored if already settled.
    pub fn reject(&self, error: SignalError) {
        self.settle(State::Rejected(error));
    }

    pub fn is_settled(&self) -> bool {
        !matches!(*self.shared.state.lock(), State::Pending)
    }

    fn settle(&self, outcome: State<T>) {
        {
            let mut state = self.shared.state.lock();
            if !matches!(*state, State::Pending) {
                return;
            }
            *state = outcome;
        }
        self.shared.settled.notify_waiters();
    }
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for DeferredHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for DeferredHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredHandle").finish_non_exhaustive()
    }
}

impl<T: Clone> DeferredHandle<T> {
    /// Wait for settlement; returns immediately if already settled.
    ///
    /// The notified future is enabled before each state check so a settlement
    /// landing between the check and the await cannot be missed.
    pub async fn wait(&self) -> Result<T, SignalError> {
        let mut notified = pin!(self.shared.settled.notified());
        loop {
            notified.as_mut().enable();
            {
                let state = self.shared.state.lock();
                match &*state {
                    State::Resolved(value) => return Ok(value.clone()),
                    State::Rejected(error) => return Err(error.clone()),
                    State::Pending => {}
                }
            }
            notified.as_mut().await;
            notified.set(self.shared.settled.notified());
        }
    }
}
