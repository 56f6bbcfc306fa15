//! Tessera Net Types
//!
//! The engine's view of the network: a request/response sender plus a stream
//! of connectivity events. Production code wraps a real connection; tests use
//! `tessera-net-sim`.

pub mod sender;

pub use sender::{Envelope, NetworkEvent, NetworkSender, TransportError};
