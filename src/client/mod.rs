//! Client-side wire concerns
//!
//! Envelope definitions, endpoint resolution and the WebSocket transport
//! used by the realtime channel.

mod endpoint;
mod protocol;
mod websocket;

pub use endpoint::*;
pub use protocol::*;
pub use websocket::*;
