//! Identity types for conversations and hole detectors
//!
//! Message IDs are server-assigned and positive. Locally created (pending)
//! messages live in the negative half of the same space until the server
//! hands out their real ID.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Server message ID. Negative values identify pending (outbox) messages.
pub type MessageId = i64;

/// Sequence number of a server update.
pub type UpdateId = i64;

/// Returns true if `id` belongs to a locally created, unconfirmed message.
pub fn is_pending_id(id: MessageId) -> bool {
    id < 0
}

pub const PEER_TYPE_USER: i32 = 1;
pub const PEER_TYPE_GROUP: i32 = 2;

/// A conversation as seen by the client: team, peer and peer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct PeerRef {
    pub team_id: i64,
    pub peer_id: i64,
    pub peer_type: i32,
}

impl PeerRef {
    pub fn new(team_id: i64, peer_id: i64, peer_type: i32) -> Self {
        Self { team_id, peer_id, peer_type }
    }

    pub fn is_group(&self) -> bool {
        self.peer_type == PEER_TYPE_GROUP
    }

    /// Detector key for this conversation and media category.
    pub fn key(self, category: MediaCategory) -> DetectorKey {
        DetectorKey { peer: self, category }
    }
}

impl fmt::Display for PeerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.team_id, self.peer_id, self.peer_type)
    }
}

/// Error returned when a wire value does not name a known media category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown media category: {0}")]
pub struct UnknownCategory(pub i32);

/// Media category a detector tracks.
///
/// A conversation can be fully synced for text while still having holes for
/// a single category, so every category gets its own detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaCategory {
    #[default]
    All,
    Photo,
    Video,
    Document,
    Audio,
    Voice,
    Link,
    Gif,
}

impl MediaCategory {
    pub const ALL: [MediaCategory; 8] = [
        MediaCategory::All,
        MediaCategory::Photo,
        MediaCategory::Video,
        MediaCategory::Document,
        MediaCategory::Audio,
        MediaCategory::Voice,
        MediaCategory::Link,
        MediaCategory::Gif,
    ];

    pub fn as_i32(self) -> i32 {
        match self {
            MediaCategory::All => 0,
            MediaCategory::Photo => 1,
            MediaCategory::Video => 2,
            MediaCategory::Document => 3,
            MediaCategory::Audio => 4,
            MediaCategory::Voice => 5,
            MediaCategory::Link => 6,
            MediaCategory::Gif => 7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaCategory::All => "all",
            MediaCategory::Photo => "photo",
            MediaCategory::Video => "video",
            MediaCategory::Document => "document",
            MediaCategory::Audio => "audio",
            MediaCategory::Voice => "voice",
            MediaCategory::Link => "link",
            MediaCategory::Gif => "gif",
        }
    }
}

impl TryFrom<i32> for MediaCategory {
    type Error = UnknownCategory;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_i32() == value)
            .ok_or(UnknownCategory(value))
    }
}

impl fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one bar store: a conversation plus a media category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DetectorKey {
    pub peer: PeerRef,
    pub category: MediaCategory,
}

impl DetectorKey {
    pub fn new(peer: PeerRef, category: MediaCategory) -> Self {
        Self { peer, category }
    }
}

impl fmt::Display for DetectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.peer, self.category)
    }
}

// --- Tests ---
