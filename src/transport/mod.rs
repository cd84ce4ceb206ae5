use crate::envelope::Envelope;
use crate::error::SignalError;

mod direct;
mod relay;

pub use direct::DirectTransport;
pub use relay::{rendezvous_round_trip, RelayTransport};

/// Send side of a signaling backend.
///
/// Sends are fire-and-forget; nothing acknowledges delivery, and a failed
/// send is fatal to the owning test.
pub trait SignalTransport: Send + Sync {
    fn send(&self, envelope: Envelope) -> Result<(), SignalError>;

    /// Tear down the backend. Safe to call repeatedly, and safe before the
    /// backend ever finished connecting.
    fn close(&self);
}
