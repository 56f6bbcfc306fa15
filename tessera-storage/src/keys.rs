//! Table key encoding.
//!
//! Integers are written big-endian with the sign bit flipped so that byte
//! order equals numeric order, which lets history pages be served by plain
//! range scans over the message table.

use tessera_model::{DetectorKey, MediaCategory, MessageId, PeerRef};

pub const PEER_KEY_LEN: usize = 20;
pub const MESSAGE_KEY_LEN: usize = PEER_KEY_LEN + 8;

fn ord_i64(v: i64) -> [u8; 8] {
    ((v as u64) ^ (1 << 63)).to_be_bytes()
}

fn ord_i32(v: i32) -> [u8; 4] {
    ((v as u32) ^ (1 << 31)).to_be_bytes()
}

/// `team | peer | peer_type`
pub fn peer_key(peer: PeerRef) -> Vec<u8> {
    let mut key = Vec::with_capacity(PEER_KEY_LEN);
    key.extend_from_slice(&ord_i64(peer.team_id));
    key.extend_from_slice(&ord_i64(peer.peer_id));
    key.extend_from_slice(&ord_i32(peer.peer_type));
    key
}

/// `team | peer | peer_type | message_id`
pub fn message_key(peer: PeerRef, id: MessageId) -> Vec<u8> {
    let mut key = peer_key(peer);
    key.extend_from_slice(&ord_i64(id));
    key
}

/// `team | peer | peer_type | category | message_id`
pub fn media_key(peer: PeerRef, category: MediaCategory, id: MessageId) -> Vec<u8> {
    let mut key = peer_key(peer);
    key.extend_from_slice(&ord_i32(category.as_i32()));
    key.extend_from_slice(&ord_i64(id));
    key
}

/// Message ID stored in the trailing 8 bytes of a message or media key.
pub fn trailing_id(key: &[u8]) -> Option<MessageId> {
    let start = key.len().checked_sub(8)?;
    let bytes: [u8; 8] = key[start..].try_into().ok()?;
    Some((u64::from_be_bytes(bytes) ^ (1 << 63)) as i64)
}

pub fn hole_key(key: &DetectorKey) -> String {
    key.to_string()
}
