use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::deferred::{Deferred, DeferredHandle};
use crate::envelope::{Envelope, EnvelopeKind};
use crate::error::SignalError;
use crate::harness::DoneReport;

type PayloadHandler = Arc<dyn Fn(Value) + Send + Sync>;

struct RouterInner {
    backlog: VecDeque<Envelope>,
    pending_description: Option<Deferred<Value>>,
    candidate_handler: Option<PayloadHandler>,
    data_handler: Option<PayloadHandler>,
    failure: Option<SignalError>,
}

enum Dispatch {
    Buffered,
    Invoke(PayloadHandler, Value),
    ResolveDescription(Deferred<Value>, Value),
}

/// Routes inbound envelopes to their consumers, buffering anything that
/// arrives before the matching consumer exists.
///
/// Buffered envelopes are re-delivered in strict arrival order once a
/// consumer registers, and each is delivered exactly once. `done` needs no
/// registration: the remote-done deferred is armed from construction.
///
/// A fatal transport or protocol failure latches the router via
/// [`SignalRouter::abort`]: outstanding and future waits reject with the
/// stored error instead of hanging until the test timeout.
pub struct SignalRouter {
    inner: Mutex<RouterInner>,
    remote_done: Deferred<DoneReport>,
}

impl SignalRouter {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RouterInner {
                backlog: VecDeque::new(),
                pending_description: None,
                candidate_handler: None,
                data_handler: None,
                failure: None,
            }),
            remote_done: Deferred::new(),
        }
    }

    /// Feed one inbound envelope through the router.
    ///
    /// Handlers are invoked after the internal lock is released, so a handler
    /// may deliver back into this router (loopback peers answer
    /// synchronously) without deadlocking.
    pub fn receive(&self, envelope: Envelope) -> Result<(), SignalError> {
        if envelope.kind == EnvelopeKind::Done {
            let report = DoneReport::from_value(&envelope.value)?;
            tracing::debug!(target = "signaling", status = ?report.status, "remote done received");
            self.remote_done.resolve(report);
            return Ok(());
        }

        let action = {
            let mut inner = self.inner.lock();
            if let Some(failure) = &inner.failure {
                return Err(failure.clone());
            }
            match envelope.kind {
                EnvelopeKind::Description => match inner.pending_description.take() {
                    Some(slot) => Dispatch::ResolveDescription(slot, envelope.value),
                    None => {
                        inner.backlog.push_back(envelope);
                        Dispatch::Buffered
                    }
                },
                EnvelopeKind::Candidate => match inner.candidate_handler.clone() {
                    Some(handler) => Dispatch::Invoke(handler, envelope.value),
                    None => {
                        inner.backlog.push_back(envelope);
                        Dispatch::Buffered
                    }
                },
                EnvelopeKind::Data => match inner.data_handler.clone() {
                    Some(handler) => Dispatch::Invoke(handler, envelope.value),
                    None => {
                        inner.backlog.push_back(envelope);
                        Dispatch::Buffered
                    }
                },
                EnvelopeKind::Done => unreachable!("done handled above"),
            }
        };

        match action {
            Dispatch::Buffered => {
                tracing::trace!(target = "signaling", "buffered envelope until a consumer registers");
            }
            Dispatch::Invoke(handler, value) => handler(value),
            Dispatch::ResolveDescription(slot, value) => slot.resolve(value),
        }
        Ok(())
    }

    /// Wait for the peer's session description.
    ///
    /// Creates the single description slot, replays the backlog (which may
    /// settle it immediately if the description already arrived), and returns
    /// the awaitable. At most one wait may be outstanding; a concurrent
    /// second call is a checked programming error.
    pub fn request_remote_description(&self) -> Result<DeferredHandle<Value>, SignalError> {
        let handle = {
            let mut inner = self.inner.lock();
            if let Some(failure) = &inner.failure {
                return Err(failure.clone());
            }
            if inner.pending_description.is_some() {
                return Err(SignalError::DescriptionAlreadyPending);
            }
            let slot = Deferred::new();
            let handle = slot.handle();
            inner.pending_description = Some(slot);
            handle
        };
        self.replay()?;
        Ok(handle)
    }

    /// Register the candidate consumer. Exactly one registration per router.
    pub fn register_candidate_handler(
        &self,
        handler: impl Fn(Value) + Send + Sync + 'static,
    ) -> Result<(), SignalError> {
        {
            let mut inner = self.inner.lock();
            if let Some(failure) = &inner.failure {
                return Err(failure.clone());
            }
            if inner.candidate_handler.is_some() {
                return Err(SignalError::HandlerAlreadyRegistered("candidate"));
            }
            inner.candidate_handler = Some(Arc::new(handler));
        }
        self.replay()
    }

    /// Register the data consumer. Exactly one registration per router.
    pub fn register_data_handler(
        &self,
        handler: impl Fn(Value) + Send + Sync + 'static,
    ) -> Result<(), SignalError> {
        {
            let mut inner = self.inner.lock();
            if let Some(failure) = &inner.failure {
                return Err(failure.clone());
            }
            if inner.data_handler.is_some() {
                return Err(SignalError::HandlerAlreadyRegistered("data"));
            }
            inner.data_handler = Some(Arc::new(handler));
        }
        self.replay()
    }

    /// Handle on the peer's end-of-test report.
    pub fn remote_done(&self) -> DeferredHandle<DoneReport> {
        self.remote_done.handle()
    }

    /// Latch a fatal failure: reject the outstanding waits and refuse
    /// further traffic. Idempotent; the first failure wins.
    pub fn abort(&self, error: SignalError) {
        let pending = {
            let mut inner = self.inner.lock();
            if inner.failure.is_some() {
                return;
            }
            tracing::error!(target = "signaling", "fatal signaling failure: {error}");
            inner.failure = Some(error.clone());
            inner.backlog.clear();
            inner.pending_description.take()
        };
        if let Some(slot) = pending {
            slot.reject(error.clone());
        }
        self.remote_done.reject(error);
    }

    /// Re-deliver everything buffered before a consumer existed.
    ///
    /// Takes ownership of the backlog before iterating; arrivals during the
    /// replay land in the fresh queue instead of being lost or re-delivered.
    /// Entries whose consumer is still missing are buffered again, behind any
    /// interleaved arrivals.
    fn replay(&self) -> Result<(), SignalError> {
        let captured: Vec<Envelope> = {
            let mut inner = self.inner.lock();
            inner.backlog.drain(..).collect()
        };
        for envelope in captured {
            self.receive(envelope)?;
        }
        Ok(())
    }
}

impl Default for SignalRouter {
    fn default() -> Self {
        Self::new()
    }
}
