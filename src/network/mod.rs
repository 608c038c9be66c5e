//! Message transports. A transport moves [`Message`]s between nodes and knows
//! nothing about the election protocol.

mod channel;
mod error;
mod memory;

pub use self::channel::{ChannelEndpoint, ChannelNetwork};
pub use self::error::NetworkError;
pub use self::memory::{Envelope, MemoryEndpoint, MemoryNetwork};

use crate::raft::{Message, Target};

/// The send capability handed to a node. Delivery is fire-and-forget: `Ok`
/// means the message was queued, not that it arrived.
pub trait Transport: Send {
    fn send(&self, target: Target, message: Message) -> Result<(), NetworkError>;
}

impl<F> Transport for F
where
    F: Fn(Target, Message) -> Result<(), NetworkError> + Send,
{
    fn send(&self, target: Target, message: Message) -> Result<(), NetworkError> {
        self(target, message)
    }
}

/// A transport that drops everything. Useful before a real one is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn send(&self, _target: Target, _message: Message) -> Result<(), NetworkError> {
        Ok(())
    }
}
