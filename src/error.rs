use thiserror::Error;

/// Failures surfaced by the signaling helper.
///
/// Protocol violations, setup/transport failures, and closed channels are
/// fatal to the current test and never retried. The handler and description
/// variants report misuse of the single-slot registration APIs and indicate a
/// bug in the test, not in the peer.
///
/// The type is `Clone` so a single rejection can settle every awaiter of a
/// deferred value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    /// Malformed signaling traffic: missing or unknown envelope kind, or an
    /// undecodable payload where a specific shape is required.
    #[error("signaling protocol violation: {0}")]
    Protocol(String),

    /// Transport construction or connection-level failure.
    #[error("signaling setup failed: {0}")]
    Setup(String),

    /// The peer side of an internal channel is gone.
    #[error("signaling channel closed")]
    ChannelClosed,

    /// A single-slot handler was registered twice on the same router.
    #[error("{0} handler already registered")]
    HandlerAlreadyRegistered(&'static str),

    /// A second remote-description wait was requested while one is pending.
    #[error("remote description already awaited")]
    DescriptionAlreadyPending,
}
