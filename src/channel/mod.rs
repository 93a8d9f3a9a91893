//! Realtime channel module
//!
//! Connection lifecycle, reconnect policy and typed dispatch for the live
//! update feed. The state machine lives in [`RealtimeChannel`]; the tokio
//! plumbing around it in [`ChannelRuntime`] and [`ChannelHandle`].

mod event;
mod realtime;
mod registry;
mod runtime;
mod scheduler;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use event::*;
pub use realtime::*;
pub use registry::*;
pub use runtime::*;
pub use scheduler::*;
pub use transport::*;
