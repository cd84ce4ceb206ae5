use std::sync::Arc;

use crate::envelope::Envelope;
use crate::error::SignalError;
use crate::router::SignalRouter;

use super::SignalTransport;

/// In-process backend: each side feeds the paired router directly.
///
/// No buffering and no failure modes of its own; a send succeeds as long as
/// the peer router accepts the envelope.
pub struct DirectTransport {
    peer: Arc<SignalRouter>,
}

impl DirectTransport {
    /// Cross-wire two routers into a connected pair of transports. The first
    /// transport belongs to the side owning `first` and delivers into
    /// `second`, and vice versa.
    pub fn pair(first: Arc<SignalRouter>, second: Arc<SignalRouter>) -> (Self, Self) {
        (Self { peer: second }, Self { peer: first })
    }
}

impl SignalTransport for DirectTransport {
    fn send(&self, envelope: Envelope) -> Result<(), SignalError> {
        self.peer.receive(envelope)
    }

    fn close(&self) {}
}
