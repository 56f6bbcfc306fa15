//! Updates pushed to the embedding application.

use tessera_model::{MessageId, PeerRef, UpdateId};
use tessera_proto::storage::Message;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientUpdate {
    /// A message arrived through the update stream.
    NewMessage(Message),
    /// Messages to remove from the view. Also used to retire pending IDs.
    MessagesDeleted { peer: PeerRef, ids: Vec<MessageId> },
    /// A pending message was matched with its confirmed server message.
    PendingDelivered { pending_id: MessageId, message: Message },
    /// Sending a pending message failed; the row is kept for a retry.
    PendingFailed { pending_id: MessageId, reason: String },
    /// Updates `[from, to]` were missed and a difference sync was started.
    OutOfSync { from: UpdateId, to: UpdateId },
    /// A difference sync finished at `update_id`.
    Synced { update_id: UpdateId },
}
