//! UrbanEase realtime client
//!
//! Maintains the live-update WebSocket channel used by the UrbanEase dashboard:
//! connection lifecycle, fixed-delay reconnection, and typed dispatch of
//! server envelopes to update handlers.

pub mod channel;
pub mod client;
pub mod config;
pub mod dashboard;

pub use channel::{
    ChannelBuilder, ChannelHandle, ChannelState, HandlerRegistry, RealtimeChannel,
    ReconnectPolicy,
};
pub use client::{Envelope, MessageKind, PageOrigin, WebSocketTransport};
pub use config::ClientConfig;
pub use dashboard::{standard_handlers, Dashboard, SharedDashboard};
