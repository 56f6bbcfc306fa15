//! ChannelSender: in-memory NetworkSender implementation
//!
//! Every `send` becomes a `SimRequest` on an mpsc queue drained by the
//! `SimServer`. The server answers through the request's oneshot, so tests
//! control ordering and timing of responses exactly.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tessera_net_types::{Envelope, NetworkEvent, NetworkSender, TransportError};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

const REQUEST_QUEUE: usize = 64;

/// Create a connected sender/server pair.
pub fn channel() -> (ChannelSender, SimServer) {
    let (requests_tx, requests_rx) = mpsc::channel(REQUEST_QUEUE);
    let (events_tx, _) = broadcast::channel(16);
    let connected = Arc::new(AtomicBool::new(true));

    let sender = ChannelSender {
        requests: requests_tx,
        connected: connected.clone(),
        events: events_tx.clone(),
    };
    let server = SimServer {
        requests: requests_rx,
        connected,
        events: events_tx,
    };
    (sender, server)
}

/// One request awaiting an answer from the simulated server.
pub struct SimRequest {
    pub envelope: Envelope,
    reply: oneshot::Sender<Result<Envelope, TransportError>>,
}

impl SimRequest {
    pub fn kind(&self) -> u32 {
        self.envelope.kind
    }

    /// Answer with `kind`/`payload`, echoing the request ID.
    pub fn respond(self, kind: u32, payload: Vec<u8>) {
        let envelope = Envelope::new(kind, self.envelope.request_id, payload);
        let _ = self.reply.send(Ok(envelope));
    }

    pub fn fail(self, error: TransportError) {
        let _ = self.reply.send(Err(error));
    }
}

#[derive(Clone, Debug)]
pub struct ChannelSender {
    requests: mpsc::Sender<SimRequest>,
    connected: Arc<AtomicBool>,
    events: broadcast::Sender<NetworkEvent>,
}

#[async_trait]
impl NetworkSender for ChannelSender {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, envelope: Envelope, timeout: Duration) -> Result<Envelope, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = SimRequest { envelope, reply: reply_tx };
        self.requests
            .send(request)
            .await
            .map_err(|_| TransportError::Closed)?;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    fn network_events(&self) -> broadcast::Receiver<NetworkEvent> {
        self.events.subscribe()
    }
}

/// Far end of a [`ChannelSender`].
pub struct SimServer {
    requests: mpsc::Receiver<SimRequest>,
    connected: Arc<AtomicBool>,
    events: broadcast::Sender<NetworkEvent>,
}

impl SimServer {
    /// Wait for the next request. `None` once every sender is dropped.
    pub async fn next_request(&mut self) -> Option<SimRequest> {
        self.requests.recv().await
    }

    /// Next request if one is already queued.
    pub fn try_next_request(&mut self) -> Option<SimRequest> {
        self.requests.try_recv().ok()
    }

    pub fn set_connected(&self, connected: bool) {
        let was = self.connected.swap(connected, Ordering::SeqCst);
        if was != connected {
            let event = if connected {
                NetworkEvent::Connected
            } else {
                NetworkEvent::Disconnected
            };
            let _ = self.events.send(event);
        }
    }

    /// Answer every request with `handler` on a background task.
    pub fn spawn_handler<F>(mut self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(&Envelope) -> Result<(u32, Vec<u8>), TransportError> + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(request) = self.next_request().await {
                tracing::debug!(kind = request.kind(), "sim server request");
                match handler(&request.envelope) {
                    Ok((kind, payload)) => request.respond(kind, payload),
                    Err(e) => request.fail(e),
                }
            }
        })
    }
}
