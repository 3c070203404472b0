//! Line codec and TLS socket I/O for the tagged IRC-style wire protocol.

pub mod codec;
pub mod connection;

pub use codec::WireMessage;
pub use connection::{connect, IrcReader, IrcSender};
