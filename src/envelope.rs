use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SignalError;

/// Kinds of signaling messages exchanged between the two test peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Description,
    Candidate,
    Data,
    Done,
}

/// One signaling message on the wire: `{"type": ..., "value": ...}`.
///
/// `value` defaults to JSON null when absent. A missing or unknown `type` is
/// a protocol violation and fails decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(default)]
    pub value: Value,
}

impl Envelope {
    pub fn new(kind: EnvelopeKind, value: Value) -> Self {
        Self { kind, value }
    }

    pub fn description(value: Value) -> Self {
        Self::new(EnvelopeKind::Description, value)
    }

    pub fn candidate(value: Value) -> Self {
        Self::new(EnvelopeKind::Candidate, value)
    }

    pub fn data(value: Value) -> Self {
        Self::new(EnvelopeKind::Data, value)
    }

    pub fn done(value: Value) -> Self {
        Self::new(EnvelopeKind::Done, value)
    }

    /// Serialize for a single relay frame.
    pub fn encode(&self) -> Result<String, SignalError> {
        serde_json::to_string(self).map_err(|err| SignalError::Setup(err.to_string()))
    }

    /// Decode a relay frame, failing loudly on malformed envelopes.
    pub fn decode(text: &str) -> Result<Self, SignalError> {
        serde_json::from_str(text)
            .map_err(|err| SignalError::Protocol(format!("malformed envelope: {err}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Session description payload of a `description` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Connectivity candidate payload of a `candidate` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}
