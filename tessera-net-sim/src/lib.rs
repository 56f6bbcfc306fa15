//! In-memory network simulation for Tessera
//!
//! Provides:
//! - `ChannelSender`: `NetworkSender` impl over tokio channels
//! - `SimServer`: the far end, where tests inspect requests and answer them
//!
//! Enables engine testing without a real server.

mod channel_sender;

pub use channel_sender::{channel, ChannelSender, SimRequest, SimServer};
