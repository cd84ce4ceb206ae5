use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::envelope::Envelope;
use crate::error::SignalError;
use crate::router::SignalRouter;

use super::SignalTransport;

/// Relay-backed backend: one persistent WebSocket per test peer.
///
/// Construction returns immediately; a background task dials the relay.
/// Envelopes sent before the socket is open sit in the outbound channel and
/// are flushed, in order, ahead of anything sent afterwards. Connection-level
/// errors and undecodable inbound frames are fatal and latch the router, so
/// outstanding waits reject instead of hanging.
pub struct RelayTransport {
    outbound: mpsc::UnboundedSender<Envelope>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl RelayTransport {
    pub fn connect(url: String, router: Arc<SignalRouter>) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel::<Envelope>();
        let task = tokio::spawn(run_socket(url, router, outbound_rx));
        Self {
            outbound,
            task: Mutex::new(Some(task)),
        }
    }
}

impl SignalTransport for RelayTransport {
    fn send(&self, envelope: Envelope) -> Result<(), SignalError> {
        self.outbound
            .send(envelope)
            .map_err(|_| SignalError::ChannelClosed)
    }

    fn close(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for RelayTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

async fn run_socket(
    url: String,
    router: Arc<SignalRouter>,
    mut outbound_rx: mpsc::UnboundedReceiver<Envelope>,
) {
    let (ws, _) = match connect_async(url.as_str()).await {
        Ok(connected) => connected,
        Err(err) => {
            router.abort(SignalError::Setup(format!("relay connect failed: {err}")));
            return;
        }
    };
    tracing::debug!(target = "signaling", url = %url, "relay socket open");
    let (mut ws_write, mut ws_read) = ws.split();

    loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => {
                let Some(envelope) = outgoing else {
                    // transport dropped; nothing more to send
                    break;
                };
                let text = match envelope.encode() {
                    Ok(text) => text,
                    Err(err) => {
                        router.abort(err);
                        break;
                    }
                };
                if let Err(err) = ws_write.send(Message::Text(text)).await {
                    router.abort(SignalError::Setup(format!("relay send failed: {err}")));
                    break;
                }
            }
            frame = ws_read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(err) = decode_into(&text, &router) {
                            router.abort(err);
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        match String::from_utf8(data) {
                            Ok(text) => {
                                if let Err(err) = decode_into(&text, &router) {
                                    router.abort(err);
                                    break;
                                }
                            }
                            Err(_) => {
                                router.abort(SignalError::Protocol(
                                    "non-utf8 relay frame".into(),
                                ));
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(target = "signaling", url = %url, "relay socket closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        router.abort(SignalError::Setup(format!("relay socket error: {err}")));
                        break;
                    }
                }
            }
        }
    }
}

fn decode_into(text: &str, router: &SignalRouter) -> Result<(), SignalError> {
    let envelope = Envelope::decode(text)?;
    tracing::trace!(target = "signaling", kind = ?envelope.kind, "relay frame in");
    router.receive(envelope)
}

/// One-shot reachability probe: dial the rendezvous endpoint, announce
/// ourselves, and wait for the relay to answer once the peer process is
/// there.
pub async fn rendezvous_round_trip(url: &str) -> Result<(), SignalError> {
    let (ws, _) = connect_async(url)
        .await
        .map_err(|err| SignalError::Setup(format!("rendezvous connect failed: {err}")))?;
    let (mut write, mut read) = ws.split();
    write
        .send(Message::Text("are-you-there".to_string()))
        .await
        .map_err(|err| SignalError::Setup(format!("rendezvous send failed: {err}")))?;
    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(_)) | Ok(Message::Binary(_)) => return Ok(()),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(SignalError::Setup(format!("rendezvous socket error: {err}")));
            }
        }
    }
    Err(SignalError::Setup(
        "rendezvous socket closed before the peer answered".into(),
    ))
}
