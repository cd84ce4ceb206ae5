use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::envelope::{IceCandidate, SessionDescription};
use crate::error::SignalError;

/// Connection-establishment capability the tests drive.
///
/// The signaling helper never looks inside descriptions or candidates; it
/// shuttles them between this API and the remote peer. Real deployments back
/// this with an actual peer-connection stack; tests use a scripted mock.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, SignalError>;

    async fn create_answer(&self) -> Result<SessionDescription, SignalError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), SignalError>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), SignalError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), SignalError>;

    /// Stream of locally discovered candidates. `None` marks the end of
    /// gathering; it is delivered to consumers but never forwarded.
    fn subscribe_local_candidates(&self) -> mpsc::UnboundedReceiver<Option<IceCandidate>>;
}
