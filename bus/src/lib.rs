//! Durable stream bus shared by the Twitch gateway and chat brain.
//!
//! Wraps Redis Streams consumer groups behind a small append/read/ack/claim
//! surface (see [`client::BusClient`]) and carries the wire data model
//! (see [`message`]) both processes agree on.

pub mod client;
pub mod error;
pub mod message;
pub mod retry;

pub use client::{BusClient, ReadFrom};
pub use error::BusError;
pub use message::{ChatMessage, OutboundMessage, StreamEntry, CHAT_MESSAGE_TYPE};
