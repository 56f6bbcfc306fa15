//! Records persisted by the repository.

/// A server-confirmed (or, inside history pages, pending) message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Message {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(int64, tag = "2")]
    pub team_id: i64,
    #[prost(int64, tag = "3")]
    pub peer_id: i64,
    #[prost(int32, tag = "4")]
    pub peer_type: i32,
    #[prost(int64, tag = "5")]
    pub sender_id: i64,
    #[prost(string, tag = "6")]
    pub body: ::prost::alloc::string::String,
    #[prost(int64, tag = "7")]
    pub created_on: i64,
    /// `MediaCategory` wire value; 0 for plain text.
    #[prost(int32, tag = "8")]
    pub media_category: i32,
    #[prost(bytes = "vec", tag = "9")]
    pub media: ::prost::alloc::vec::Vec<u8>,
    #[prost(int64, tag = "10")]
    pub reply_to: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct User {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub first_name: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub last_name: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Group {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(int64, tag = "2")]
    pub team_id: i64,
    #[prost(string, tag = "3")]
    pub title: ::prost::alloc::string::String,
}

/// Local record of a conversation.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Dialog {
    #[prost(int64, tag = "1")]
    pub team_id: i64,
    #[prost(int64, tag = "2")]
    pub peer_id: i64,
    #[prost(int32, tag = "3")]
    pub peer_type: i32,
    /// Highest known message ID; the implicit max of open-ended history requests.
    #[prost(int64, tag = "4")]
    pub top_message_id: i64,
    #[prost(int64, tag = "5")]
    pub read_inbox_max_id: i64,
    #[prost(int32, tag = "6")]
    pub unread_count: i32,
}

/// A locally created message awaiting its server ID.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PendingMessage {
    /// Negative local ID.
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(int64, tag = "2")]
    pub team_id: i64,
    #[prost(int64, tag = "3")]
    pub peer_id: i64,
    #[prost(int32, tag = "4")]
    pub peer_type: i32,
    #[prost(int64, tag = "5")]
    pub sender_id: i64,
    /// Client-generated correlation ID echoed back by the server.
    #[prost(int64, tag = "6")]
    pub random_id: i64,
    /// Real server ID once confirmed, 0 before.
    #[prost(int64, tag = "7")]
    pub real_id: i64,
    #[prost(string, tag = "8")]
    pub body: ::prost::alloc::string::String,
    /// Encoded `SendMessage` request, replayed on retry.
    #[prost(bytes = "vec", tag = "9")]
    pub request: ::prost::alloc::vec::Vec<u8>,
    #[prost(int64, tag = "10")]
    pub file_id: i64,
    #[prost(string, tag = "11")]
    pub file_path: ::prost::alloc::string::String,
    #[prost(int64, tag = "12")]
    pub created_on: i64,
    #[prost(int32, tag = "13")]
    pub media_category: i32,
    #[prost(int64, tag = "14")]
    pub reply_to: i64,
}
