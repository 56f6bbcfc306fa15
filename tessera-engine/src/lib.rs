//! Tessera Engine
//!
//! Gap-aware history synchronization for a chat client:
//! - **SyncEngine**: facade owning storage, hole detectors and the network sender
//! - **HistoryDispatcher**: serves history pages from cache or fetches the holes
//! - **Outbox**: optimistic sends reconciled against server confirmations
//! - **UpdateApplier**: sequenced update stream with gap detection and difference sync
//! - **MediaCache**: where uploaded files end up once their message is confirmed

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod media;
pub mod requests;

mod context;
mod history;
mod outbox;
mod updates;

pub use config::EngineConfig;
pub use engine::{EngineBuilder, SyncEngine};
pub use error::EngineError;
pub use events::ClientUpdate;
pub use media::{MediaCache, NoopUploads, UploadController};
pub use requests::{HistoryCall, HistoryPage, RequestId};

// Re-export the types that appear in the engine API
pub use tessera_holes::{Bar, BarKind, DetectorRegistry};
pub use tessera_model::{DetectorKey, MediaCategory, MessageId, PeerRef, StorageConfig, UpdateId};
pub use tessera_net_types::{NetworkEvent, NetworkSender, TransportError};
pub use tessera_proto::storage::{Dialog, Group, Message, PendingMessage, User};
pub use tessera_storage::Repository;
