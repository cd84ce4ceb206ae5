//! Signaling helper for interoperability tests of a real-time
//! peer-connection protocol.
//!
//! Two test peers (both roles in this process, or one role per process
//! behind a relay server) exchange session descriptions, connectivity
//! candidates, and small data messages, then reconcile pass/fail verdicts
//! when the test finishes. The interesting part is the ordering machinery in
//! [`router::SignalRouter`]: messages may arrive before the test has
//! registered a consumer for them, and either arrival order must produce the
//! same outcome.

pub mod config;
pub mod deferred;
pub mod envelope;
pub mod error;
pub mod harness;
pub mod orchestrate;
pub mod peer;
pub mod router;
pub mod signaling;
pub mod transport;

pub use config::{ExecutionMode, HarnessConfig, HarnessConfigBuilder, Role};
pub use deferred::{Deferred, DeferredHandle};
pub use envelope::{Envelope, EnvelopeKind, IceCandidate, SdpKind, SessionDescription};
pub use error::SignalError;
pub use harness::{DoneReport, TestContext, TestPhase, TestStatus};
pub use orchestrate::TestCoordinator;
pub use peer::PeerConnection;
pub use router::SignalRouter;
pub use signaling::Signaling;
pub use transport::{DirectTransport, RelayTransport, SignalTransport};
