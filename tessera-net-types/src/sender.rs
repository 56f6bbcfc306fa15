//! Request/response sender abstraction.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::sync::broadcast;

/// Error type for sender operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,
    #[error("Not connected")]
    Disconnected,
    #[error("Connection closed")]
    Closed,
    #[error("Remote error: {0}")]
    Remote(String),
}

/// A framed payload tagged with its kind and the request it belongs to.
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    pub kind: u32,
    pub request_id: u64,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn new(kind: u32, request_id: u64, payload: Vec<u8>) -> Self {
        Self { kind, request_id, payload }
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("kind", &format_args!("{:#06x}", self.kind))
            .field("request_id", &self.request_id)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Connectivity changes reported by the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    Connected,
    Disconnected,
}

/// Sends one request and waits for its response.
#[async_trait]
pub trait NetworkSender: Send + Sync + 'static {
    fn is_connected(&self) -> bool;

    /// Send `envelope` and wait up to `timeout` for the matching response.
    async fn send(&self, envelope: Envelope, timeout: Duration) -> Result<Envelope, TransportError>;

    fn network_events(&self) -> broadcast::Receiver<NetworkEvent>;
}
