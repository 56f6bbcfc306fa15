//! State shared by the dispatcher, outbox and update applier.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::ClientUpdate;
use prost::Message as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tessera_holes::DetectorRegistry;
use tessera_net_types::{Envelope, NetworkSender};
use tessera_proto::kind;
use tessera_proto::wire::ServerError;
use tessera_storage::Repository;
use tokio::sync::broadcast;

pub(crate) struct Context {
    pub repo: Arc<dyn Repository>,
    pub holes: Arc<DetectorRegistry>,
    pub sender: Arc<dyn NetworkSender>,
    pub config: EngineConfig,
    updates: broadcast::Sender<ClientUpdate>,
    request_ids: AtomicU64,
}

impl Context {
    pub fn new(
        repo: Arc<dyn Repository>,
        holes: Arc<DetectorRegistry>,
        sender: Arc<dyn NetworkSender>,
        config: EngineConfig,
    ) -> Self {
        let (updates, _) = broadcast::channel(config.update_buffer.max(1));
        Self {
            repo,
            holes,
            sender,
            config,
            updates,
            request_ids: AtomicU64::new(1),
        }
    }

    pub fn next_request_id(&self) -> u64 {
        self.request_ids.fetch_add(1, Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientUpdate> {
        self.updates.subscribe()
    }

    /// Publish to subscribers. Having none is fine.
    pub fn emit(&self, update: ClientUpdate) {
        let _ = self.updates.send(update);
    }

    /// Send one request and wait for its response within the configured timeout.
    pub async fn request<M: prost::Message>(&self, kind: u32, body: &M) -> Result<Envelope, EngineError> {
        let envelope = Envelope::new(kind, self.next_request_id(), body.encode_to_vec());
        Ok(self.sender.send(envelope, self.config.request_timeout).await?)
    }
}

/// Decode a response of the `expected` kind, turning server error envelopes
/// into `EngineError::Server`.
pub(crate) fn decode_response<M: prost::Message + Default>(
    envelope: &Envelope,
    expected: u32,
) -> Result<M, EngineError> {
    match envelope.kind {
        k if k == expected => Ok(M::decode(envelope.payload.as_slice())?),
        kind::ERROR => {
            let err = ServerError::decode(envelope.payload.as_slice())?;
            Err(EngineError::Server {
                code: err.code,
                items: err.items,
            })
        }
        other => Err(EngineError::UnexpectedResponse(other)),
    }
}

pub(crate) fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
