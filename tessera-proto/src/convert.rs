//! Proto ↔ Model conversion helpers.

use crate::storage::{Dialog, Message, PendingMessage};
use crate::wire::InputPeer;
use tessera_model::{MediaCategory, PeerRef};

// ==================== InputPeer ====================

impl From<PeerRef> for InputPeer {
    fn from(peer: PeerRef) -> Self {
        Self {
            team_id: peer.team_id,
            peer_id: peer.peer_id,
            peer_type: peer.peer_type,
        }
    }
}

impl From<InputPeer> for PeerRef {
    fn from(input: InputPeer) -> Self {
        PeerRef::new(input.team_id, input.peer_id, input.peer_type)
    }
}

// ==================== Message ====================

impl Message {
    pub fn peer(&self) -> PeerRef {
        PeerRef::new(self.team_id, self.peer_id, self.peer_type)
    }

    /// Media category, falling back to `All` for unknown wire values.
    pub fn category(&self) -> MediaCategory {
        MediaCategory::try_from(self.media_category).unwrap_or_default()
    }
}

// ==================== Dialog ====================

impl Dialog {
    pub fn for_peer(peer: PeerRef, top_message_id: i64) -> Self {
        Self {
            team_id: peer.team_id,
            peer_id: peer.peer_id,
            peer_type: peer.peer_type,
            top_message_id,
            ..Default::default()
        }
    }

    pub fn peer(&self) -> PeerRef {
        PeerRef::new(self.team_id, self.peer_id, self.peer_type)
    }
}

// ==================== PendingMessage ====================

impl PendingMessage {
    pub fn peer(&self) -> PeerRef {
        PeerRef::new(self.team_id, self.peer_id, self.peer_type)
    }

    pub fn has_file(&self) -> bool {
        self.file_id != 0
    }

    /// View of the pending entry as a history message under its negative ID.
    pub fn to_message(&self) -> Message {
        Message {
            id: self.id,
            team_id: self.team_id,
            peer_id: self.peer_id,
            peer_type: self.peer_type,
            sender_id: self.sender_id,
            body: self.body.clone(),
            created_on: self.created_on,
            media_category: self.media_category,
            media: Vec::new(),
            reply_to: self.reply_to,
        }
    }
}
