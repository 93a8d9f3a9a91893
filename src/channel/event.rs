//! Events consumed by the channel's event loop

use serde_json::Value;
use uuid::Uuid;

use super::registry::HandlerRegistry;
use super::scheduler::TimerId;

/// Identifies one transport construction; events from older ones are stale
pub type ConnectionId = Uuid;

/// Something the transport reported about a connection
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Handshake completed
    Opened,
    /// A text frame arrived
    Message(String),
    /// Connection ended, for any reason
    Closed {
        /// Close code sent by the peer, if any
        code: Option<u16>,
        /// Human readable reason
        reason: String,
    },
    /// Transport-level failure
    Error(String),
}

/// Requests issued through a `ChannelHandle`
pub enum Command {
    Connect,
    Send(Value),
    Close,
    SetSubscriber(Option<String>),
    ReplaceHandlers(HandlerRegistry),
    /// Close the channel and stop the event loop
    Shutdown,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Connect => f.write_str("Connect"),
            Command::Send(value) => f.debug_tuple("Send").field(value).finish(),
            Command::Close => f.write_str("Close"),
            Command::SetSubscriber(id) => f.debug_tuple("SetSubscriber").field(id).finish(),
            Command::ReplaceHandlers(registry) => {
                f.debug_tuple("ReplaceHandlers").field(registry).finish()
            }
            Command::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Everything the event loop reacts to, in arrival order
#[derive(Debug)]
pub enum ChannelEvent {
    Transport {
        connection: ConnectionId,
        event: TransportEvent,
    },
    ReconnectDue(TimerId),
    Command(Command),
}
