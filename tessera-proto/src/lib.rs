//! Protobuf definitions for Tessera
//!
//! Messages are declared directly with `prost` derives. Every payload that
//! crosses the network sender travels inside an envelope tagged with one of
//! the constants in [`kind`].

pub mod storage;
pub mod wire;
pub mod convert;

pub use prost::Message as ProstMessage;

/// Payload kinds carried by envelopes.
pub mod kind {
    // Requests
    pub const GET_HISTORY: u32 = 0x0101;
    pub const GET_MEDIA_HISTORY: u32 = 0x0102;
    pub const SEND_MESSAGE: u32 = 0x0103;
    pub const GET_DIFFERENCE: u32 = 0x0104;

    // Responses
    pub const MESSAGES_MANY: u32 = 0x0201;
    pub const MESSAGES_SENT: u32 = 0x0202;
    pub const UPDATE_DIFFERENCE: u32 = 0x0203;
    pub const ERROR: u32 = 0x02FF;

    // Updates
    pub const UPDATE_NEW_MESSAGE: u32 = 0x0301;
    pub const UPDATE_MESSAGE_ID: u32 = 0x0302;
    pub const UPDATE_MESSAGES_DELETED: u32 = 0x0303;

    /// Human readable name for logs.
    pub fn name(kind: u32) -> &'static str {
        match kind {
            GET_HISTORY => "GetHistory",
            GET_MEDIA_HISTORY => "GetMediaHistory",
            SEND_MESSAGE => "SendMessage",
            GET_DIFFERENCE => "GetDifference",
            MESSAGES_MANY => "MessagesMany",
            MESSAGES_SENT => "MessagesSent",
            UPDATE_DIFFERENCE => "UpdateDifference",
            ERROR => "Error",
            UPDATE_NEW_MESSAGE => "UpdateNewMessage",
            UPDATE_MESSAGE_ID => "UpdateMessageId",
            UPDATE_MESSAGES_DELETED => "UpdateMessagesDeleted",
            _ => "Unknown",
        }
    }
}
