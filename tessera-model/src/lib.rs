//! Tessera Model
//!
//! Pure data types for the Tessera history sync engine, decoupled from
//! storage engines, wire payloads and the network stack.

pub mod types;
pub mod storage_config;

// Re-exports
pub use types::{
    is_pending_id, DetectorKey, MediaCategory, MessageId, PeerRef, UnknownCategory, UpdateId,
    PEER_TYPE_GROUP, PEER_TYPE_USER,
};
pub use storage_config::StorageConfig;
