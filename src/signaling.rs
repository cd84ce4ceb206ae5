use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::deferred::DeferredHandle;
use crate::envelope::{Envelope, IceCandidate, SessionDescription};
use crate::error::SignalError;
use crate::harness::DoneReport;
use crate::peer::PeerConnection;
use crate::router::SignalRouter;
use crate::transport::SignalTransport;

/// One peer's signaling endpoint for a single test case.
///
/// Wraps outbound values in wire envelopes, surfaces inbound ones through the
/// router, and drives the offer/answer handshake against the connection API.
/// Created per test case per role and torn down by the owning test's cleanup.
pub struct Signaling {
    router: Arc<SignalRouter>,
    transport: Arc<dyn SignalTransport>,
    done_sent: AtomicBool,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl Signaling {
    pub fn new(transport: Arc<dyn SignalTransport>, router: Arc<SignalRouter>) -> Arc<Self> {
        Arc::new(Self {
            router,
            transport,
            done_sent: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn router(&self) -> &Arc<SignalRouter> {
        &self.router
    }

    pub fn send_local_description(&self, desc: &SessionDescription) -> Result<(), SignalError> {
        let value = serde_json::to_value(desc).map_err(|err| SignalError::Setup(err.to_string()))?;
        self.transport.send(Envelope::description(value))
    }

    pub fn send_local_candidate(&self, candidate: &IceCandidate) -> Result<(), SignalError> {
        let value =
            serde_json::to_value(candidate).map_err(|err| SignalError::Setup(err.to_string()))?;
        self.transport.send(Envelope::candidate(value))
    }

    pub fn send_data(&self, value: Value) -> Result<(), SignalError> {
        self.transport.send(Envelope::data(value))
    }

    /// Await the peer's description; at most one wait may be outstanding.
    pub fn receive_remote_description(&self) -> Result<DeferredHandle<Value>, SignalError> {
        self.router.request_remote_description()
    }

    /// Register the consumer for inbound `data` envelopes. One registration
    /// per instance lifetime.
    pub fn register_data_handler(
        &self,
        handler: impl Fn(Value) + Send + Sync + 'static,
    ) -> Result<(), SignalError> {
        self.router.register_data_handler(handler)
    }

    /// Forward local candidates to the peer and apply the peer's candidates
    /// locally.
    ///
    /// Candidate application is expected to succeed in these scenarios; a
    /// rejected or undecodable candidate latches the router as a fatal
    /// failure.
    pub fn exchange_candidates(
        &self,
        connection: Arc<dyn PeerConnection>,
    ) -> Result<(), SignalError> {
        let mut discovered = connection.subscribe_local_candidates();
        let outbound = Arc::clone(&self.transport);
        let forward = tokio::spawn(async move {
            while let Some(candidate) = discovered.recv().await {
                // a null candidate marks the end of gathering; not forwarded
                let Some(candidate) = candidate else { continue };
                let value = match serde_json::to_value(&candidate) {
                    Ok(value) => value,
                    Err(err) => {
                        tracing::warn!(target = "signaling", "unencodable local candidate: {err}");
                        continue;
                    }
                };
                if let Err(err) = outbound.send(Envelope::candidate(value)) {
                    tracing::warn!(target = "signaling", "stopping candidate forwarding: {err}");
                    break;
                }
            }
        });
        self.tasks.lock().push(forward);

        // Inbound candidates hop through a channel so the router's
        // synchronous dispatch never blocks on the connection API.
        let (apply_tx, mut apply_rx) = mpsc::unbounded_channel::<Value>();
        self.router.register_candidate_handler(move |value| {
            let _ = apply_tx.send(value);
        })?;
        let fatal = Arc::clone(&self.router);
        let apply = tokio::spawn(async move {
            while let Some(value) = apply_rx.recv().await {
                let candidate: IceCandidate = match serde_json::from_value(value) {
                    Ok(candidate) => candidate,
                    Err(err) => {
                        fatal.abort(SignalError::Protocol(format!(
                            "malformed remote candidate: {err}"
                        )));
                        break;
                    }
                };
                if let Err(err) = connection.add_ice_candidate(candidate).await {
                    fatal.abort(SignalError::Setup(format!("remote candidate rejected: {err}")));
                    break;
                }
            }
        });
        self.tasks.lock().push(apply);
        Ok(())
    }

    /// Drive the canonical one-offer/one-answer handshake. Exactly one offer
    /// and one answer per test; no renegotiation.
    pub async fn exchange_descriptions(
        &self,
        connection: &dyn PeerConnection,
        is_offerer: bool,
    ) -> Result<(), SignalError> {
        if is_offerer {
            let offer = connection.create_offer().await?;
            connection.set_local_description(offer.clone()).await?;
            self.send_local_description(&offer)?;
            tracing::debug!(target = "signaling", "offer sent, awaiting answer");
            let answer = self.await_remote_description().await?;
            connection.set_remote_description(answer).await?;
        } else {
            let offer = self.await_remote_description().await?;
            connection.set_remote_description(offer).await?;
            let answer = connection.create_answer().await?;
            connection.set_local_description(answer.clone()).await?;
            self.send_local_description(&answer)?;
            tracing::debug!(target = "signaling", "answer sent");
        }
        Ok(())
    }

    async fn await_remote_description(&self) -> Result<SessionDescription, SignalError> {
        let value = self.receive_remote_description()?.wait().await?;
        serde_json::from_value(value)
            .map_err(|err| SignalError::Protocol(format!("malformed remote description: {err}")))
    }

    /// Report this side's verdict to the peer. The first call transmits;
    /// repeats are suppressed, not errors. Returns the handle on the peer's
    /// report so the caller can reconcile.
    pub fn done(&self, report: &DoneReport) -> Result<DeferredHandle<DoneReport>, SignalError> {
        if !self.done_sent.swap(true, Ordering::SeqCst) {
            self.transport.send(Envelope::done(report.to_value()?))?;
        }
        Ok(self.router.remote_done())
    }

    /// The peer's report, without sending ours.
    pub fn remote_done(&self) -> DeferredHandle<DoneReport> {
        self.router.remote_done()
    }

    /// Tear down the transport and stop the candidate tasks. Registered as
    /// test cleanup; safe to call repeatedly.
    pub fn close(&self) {
        self.transport.close();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Drop for Signaling {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::TestStatus;
    use serde_json::json;

    /// Transport that records what would go on the wire.
    struct RecordingTransport {
        sent: Mutex<Vec<Envelope>>,
    }

    impl RecordingTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    impl SignalTransport for RecordingTransport {
        fn send(&self, envelope: Envelope) -> Result<(), SignalError> {
            self.sent.lock().push(envelope);
            Ok(())
        }

        fn close(&self) {}
    }

    #[tokio::test]
    async fn done_transmits_exactly_once() {
        let transport = RecordingTransport::new();
        let signaling = Signaling::new(transport.clone(), Arc::new(SignalRouter::new()));

        let report = DoneReport::pass();
        signaling.done(&report).unwrap();
        signaling.done(&report).unwrap();
        signaling
            .done(&DoneReport::new(TestStatus::Fail, Some("late".into())))
            .unwrap();

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], Envelope::done(json!({"status": "pass", "message": null})));
    }

    #[tokio::test]
    async fn sends_wrap_values_in_matching_kinds() {
        let transport = RecordingTransport::new();
        let signaling = Signaling::new(transport.clone(), Arc::new(SignalRouter::new()));

        signaling
            .send_local_description(&SessionDescription::offer("v=0"))
            .unwrap();
        signaling
            .send_local_candidate(&IceCandidate {
                candidate: "candidate:1 1 udp 1 198.51.100.1 9 typ host".into(),
                sdp_mid: Some("0".into()),
                sdp_mline_index: Some(0),
            })
            .unwrap();
        signaling.send_data(json!({"ping": 1})).unwrap();

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].kind, crate::envelope::EnvelopeKind::Description);
        assert_eq!(sent[1].kind, crate::envelope::EnvelopeKind::Candidate);
        assert_eq!(sent[2].kind, crate::envelope::EnvelopeKind::Data);
        assert_eq!(sent[2].value, json!({"ping": 1}));
    }
}
