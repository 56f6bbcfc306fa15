//! Tessera Storage
//!
//! Local persistence for the sync engine. The engine talks to the store only
//! through the traits below; [`RedbRepository`] is the redb implementation.
//!
//! All range bounds are inclusive. A bound of `0` means "unbounded" on that
//! side, which is how the history requests encode open ranges.

pub mod error;
pub mod keys;
pub mod repository;

pub use error::StorageError;
pub use repository::RedbRepository;

use tessera_holes::HoleStore;
use tessera_model::{MediaCategory, MessageId, PeerRef};
use tessera_proto::storage::{Dialog, Group, Message, PendingMessage, User};

/// Confirmed messages plus the users and groups that arrive with them.
pub trait MessageStore: Send + Sync {
    fn save_messages(&self, messages: &[Message]) -> Result<(), StorageError>;
    fn get_message(&self, peer: PeerRef, id: MessageId) -> Result<Option<Message>, StorageError>;
    fn delete_messages(&self, peer: PeerRef, ids: &[MessageId]) -> Result<(), StorageError>;

    /// Page of messages in `[min, max]`, newest first.
    ///
    /// With only `min` set the page is the `limit` oldest messages from `min`
    /// upward; otherwise it is the `limit` newest from `max` downward.
    fn message_history(
        &self,
        peer: PeerRef,
        min: MessageId,
        max: MessageId,
        limit: i32,
    ) -> Result<Vec<Message>, StorageError>;

    /// Same as `message_history`, restricted to one media category.
    fn media_history(
        &self,
        peer: PeerRef,
        category: MediaCategory,
        min: MessageId,
        max: MessageId,
        limit: i32,
    ) -> Result<Vec<Message>, StorageError>;

    fn save_users(&self, users: &[User]) -> Result<(), StorageError>;
    fn get_user(&self, id: i64) -> Result<Option<User>, StorageError>;
    fn save_groups(&self, groups: &[Group]) -> Result<(), StorageError>;
    fn get_group(&self, id: i64) -> Result<Option<Group>, StorageError>;
}

pub trait DialogStore: Send + Sync {
    fn dialog(&self, peer: PeerRef) -> Result<Option<Dialog>, StorageError>;
    fn save_dialog(&self, dialog: &Dialog) -> Result<(), StorageError>;
    fn list_dialogs(&self) -> Result<Vec<Dialog>, StorageError>;
}

/// Outbox rows, keyed by negative ID with lookups by correlation and real ID.
pub trait PendingStore: Send + Sync {
    fn save_pending(&self, pending: &PendingMessage) -> Result<(), StorageError>;
    fn get_pending(&self, id: MessageId) -> Result<Option<PendingMessage>, StorageError>;
    fn get_pending_by_random_id(&self, random_id: i64) -> Result<Option<PendingMessage>, StorageError>;
    fn get_pending_by_real_id(&self, real_id: MessageId) -> Result<Option<PendingMessage>, StorageError>;
    /// Record the server ID for the row with `random_id`. Returns the updated
    /// row, or `None` when no such row exists.
    fn save_pending_real_id(
        &self,
        random_id: i64,
        real_id: MessageId,
    ) -> Result<Option<PendingMessage>, StorageError>;
    /// Delete a row and its index entries, returning it if it existed.
    fn delete_pending(&self, id: MessageId) -> Result<Option<PendingMessage>, StorageError>;
    /// Pending rows for `peer`, newest (most negative ID) first.
    fn pending_by_peer(&self, peer: PeerRef) -> Result<Vec<PendingMessage>, StorageError>;
    /// Lowest pending ID in use, or 0 when the outbox is empty.
    fn lowest_pending_id(&self) -> Result<MessageId, StorageError>;
}

/// Small integer settings, e.g. the applied update watermark.
pub trait SystemStore: Send + Sync {
    fn system_int(&self, key: &str) -> Result<Option<i64>, StorageError>;
    fn set_system_int(&self, key: &str, value: i64) -> Result<(), StorageError>;
}

/// Everything the engine needs from local storage.
///
/// Blanket-implemented for any type providing the individual stores.
pub trait Repository: MessageStore + DialogStore + PendingStore + SystemStore + HoleStore {}

impl<T> Repository for T where T: MessageStore + DialogStore + PendingStore + SystemStore + HoleStore + ?Sized {}
