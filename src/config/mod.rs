//! Configuration module
//!
//! Handles loading and saving the realtime client configuration.

mod client;

pub use client::*;
