//! Dashboard module
//!
//! Typed view of the four live-update feeds and the handlers that keep it
//! current.

mod board;
mod handlers;

pub use board::*;
pub use handlers::*;
