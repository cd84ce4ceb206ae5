#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use signaling_harness::{IceCandidate, PeerConnection, SessionDescription, SignalError};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Poll a condition until it holds, failing the test after five seconds.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

#[derive(Default)]
struct MockState {
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    remote_candidates: Vec<IceCandidate>,
    candidate_feeds: Vec<mpsc::UnboundedSender<Option<IceCandidate>>>,
}

/// Scripted stand-in for the connection-establishment API.
pub struct MockPeerConnection {
    label: &'static str,
    state: Mutex<MockState>,
}

impl MockPeerConnection {
    pub fn new(label: &'static str) -> Arc<Self> {
        Arc::new(Self {
            label,
            state: Mutex::new(MockState::default()),
        })
    }

    /// Fire the local-candidate-discovered event.
    pub fn discover_candidate(&self, candidate: IceCandidate) {
        let state = self.state.lock();
        for feed in &state.candidate_feeds {
            let _ = feed.send(Some(candidate.clone()));
        }
    }

    /// Fire the end-of-gathering (null candidate) event.
    pub fn finish_gathering(&self) {
        let state = self.state.lock();
        for feed in &state.candidate_feeds {
            let _ = feed.send(None);
        }
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.state.lock().local_description.clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.state.lock().remote_description.clone()
    }

    pub fn remote_candidates(&self) -> Vec<IceCandidate> {
        self.state.lock().remote_candidates.clone()
    }
}

#[async_trait]
impl PeerConnection for MockPeerConnection {
    async fn create_offer(&self) -> Result<SessionDescription, SignalError> {
        Ok(SessionDescription::offer(format!("v=0 offer from {}", self.label)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, SignalError> {
        Ok(SessionDescription::answer(format!("v=0 answer from {}", self.label)))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), SignalError> {
        self.state.lock().local_description = Some(desc);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), SignalError> {
        self.state.lock().remote_description = Some(desc);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), SignalError> {
        self.state.lock().remote_candidates.push(candidate);
        Ok(())
    }

    fn subscribe_local_candidates(&self) -> mpsc::UnboundedReceiver<Option<IceCandidate>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().candidate_feeds.push(tx);
        rx
    }
}

/// Per-slot relay state: one outbound sender and one backlog per role.
#[derive(Default)]
pub struct RelayPair {
    outbound: [Option<mpsc::UnboundedSender<String>>; 2],
    backlog: [Vec<String>; 2],
    pub connects: [u32; 2],
}

pub type RelayState = Arc<AsyncMutex<HashMap<String, RelayPair>>>;

/// In-process relay: pairs the two roles of each slot (`/<slot>/<role>`) and
/// forwards frames to the opposite role, buffering while the peer is absent.
/// The rendezvous endpoint (`/are-you-there/<role>`) is just another slot, so
/// each side's probe reaches the other as the confirmation reply.
pub async fn spawn_relay() -> (String, RelayState) {
    let state: RelayState = Arc::new(AsyncMutex::new(HashMap::new()));
    let app = Router::new()
        .route("/:slot/:role", get(ws_handler))
        .with_state(Arc::clone(&state));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind relay");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    (format!("ws://{addr}"), state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path((slot, role)): Path<(String, u8)>,
    State(state): State<RelayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, slot, role, state))
}

async fn handle_socket(socket: WebSocket, slot: String, role: u8, state: RelayState) {
    if role > 1 {
        return;
    }
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    {
        let mut slots = state.lock().await;
        let pair = slots.entry(slot.clone()).or_default();
        pair.connects[role as usize] += 1;
        for queued in pair.backlog[role as usize].drain(..) {
            let _ = tx.send(queued);
        }
        pair.outbound[role as usize] = Some(tx);
    }

    let send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let peer = 1 - role as usize;
        let mut slots = state.lock().await;
        let pair = slots.entry(slot.clone()).or_default();
        let delivered = pair.outbound[peer]
            .as_ref()
            .map(|out| out.send(text.clone()).is_ok())
            .unwrap_or(false);
        if !delivered {
            pair.backlog[peer].push(text);
        }
    }

    send_task.abort();
}
