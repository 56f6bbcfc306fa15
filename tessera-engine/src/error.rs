use tessera_holes::HoleStoreError;
use tessera_model::MessageId;
use tessera_net_types::TransportError;
use tessera_proto::kind;
use tessera_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Hole store error: {0}")]
    Holes(#[from] HoleStoreError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Server error {code}: {items}")]
    Server { code: String, items: String },

    #[error("Unexpected response: {}", kind::name(*.0))]
    UnexpectedResponse(u32),

    #[error("Request timed out")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Message body is empty")]
    EmptyMessage,

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Unknown pending message: {0}")]
    UnknownPending(MessageId),
}
