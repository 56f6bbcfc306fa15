//! Request, response and update payloads exchanged with the server.

use crate::storage::{Group, Message, User};

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct InputPeer {
    #[prost(int64, tag = "1")]
    pub team_id: i64,
    #[prost(int64, tag = "2")]
    pub peer_id: i64,
    #[prost(int32, tag = "3")]
    pub peer_type: i32,
}

// ==================== Requests ====================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetHistory {
    #[prost(message, optional, tag = "1")]
    pub peer: ::core::option::Option<InputPeer>,
    #[prost(int64, tag = "2")]
    pub min_id: i64,
    #[prost(int64, tag = "3")]
    pub max_id: i64,
    #[prost(int32, tag = "4")]
    pub limit: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetMediaHistory {
    #[prost(message, optional, tag = "1")]
    pub peer: ::core::option::Option<InputPeer>,
    #[prost(int64, tag = "2")]
    pub min_id: i64,
    #[prost(int64, tag = "3")]
    pub max_id: i64,
    #[prost(int32, tag = "4")]
    pub limit: i32,
    #[prost(int32, tag = "5")]
    pub category: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SendMessage {
    #[prost(message, optional, tag = "1")]
    pub peer: ::core::option::Option<InputPeer>,
    #[prost(string, tag = "2")]
    pub body: ::prost::alloc::string::String,
    #[prost(int64, tag = "3")]
    pub random_id: i64,
    #[prost(int64, tag = "4")]
    pub reply_to: i64,
    #[prost(int64, tag = "5")]
    pub file_id: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetDifference {
    #[prost(int64, tag = "1")]
    pub from: i64,
    #[prost(int32, tag = "2")]
    pub limit: i32,
}

// ==================== Responses ====================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MessagesMany {
    #[prost(message, repeated, tag = "1")]
    pub messages: ::prost::alloc::vec::Vec<Message>,
    #[prost(message, repeated, tag = "2")]
    pub users: ::prost::alloc::vec::Vec<User>,
    #[prost(message, repeated, tag = "3")]
    pub groups: ::prost::alloc::vec::Vec<Group>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MessagesSent {
    #[prost(int64, tag = "1")]
    pub message_id: i64,
    #[prost(int64, tag = "2")]
    pub random_id: i64,
    #[prost(int64, tag = "3")]
    pub created_on: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerError {
    #[prost(string, tag = "1")]
    pub code: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub items: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateDifference {
    #[prost(message, repeated, tag = "1")]
    pub updates: ::prost::alloc::vec::Vec<UpdateEnvelope>,
    #[prost(int64, tag = "2")]
    pub min_update_id: i64,
    #[prost(int64, tag = "3")]
    pub max_update_id: i64,
    #[prost(int64, tag = "4")]
    pub current_update_id: i64,
    #[prost(bool, tag = "5")]
    pub more: bool,
    #[prost(message, repeated, tag = "6")]
    pub users: ::prost::alloc::vec::Vec<User>,
    #[prost(message, repeated, tag = "7")]
    pub groups: ::prost::alloc::vec::Vec<Group>,
}

// ==================== Updates ====================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateEnvelope {
    #[prost(uint32, tag = "1")]
    pub kind: u32,
    /// 0 for updates outside the sequenced stream.
    #[prost(int64, tag = "2")]
    pub update_id: i64,
    #[prost(bytes = "vec", tag = "3")]
    pub payload: ::prost::alloc::vec::Vec<u8>,
    #[prost(int64, tag = "4")]
    pub timestamp: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateContainer {
    #[prost(message, repeated, tag = "1")]
    pub updates: ::prost::alloc::vec::Vec<UpdateEnvelope>,
    #[prost(int64, tag = "2")]
    pub min_update_id: i64,
    #[prost(int64, tag = "3")]
    pub max_update_id: i64,
    #[prost(message, repeated, tag = "4")]
    pub users: ::prost::alloc::vec::Vec<User>,
    #[prost(message, repeated, tag = "5")]
    pub groups: ::prost::alloc::vec::Vec<Group>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateNewMessage {
    #[prost(message, optional, tag = "1")]
    pub message: ::core::option::Option<Message>,
    #[prost(message, optional, tag = "2")]
    pub sender: ::core::option::Option<User>,
    /// Correlation ID of the originating send, when the server echoes it.
    #[prost(int64, tag = "3")]
    pub random_id: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateMessageId {
    #[prost(int64, tag = "1")]
    pub random_id: i64,
    #[prost(int64, tag = "2")]
    pub message_id: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateMessagesDeleted {
    #[prost(message, optional, tag = "1")]
    pub peer: ::core::option::Option<InputPeer>,
    #[prost(int64, repeated, tag = "2")]
    pub message_ids: ::prost::alloc::vec::Vec<i64>,
}
