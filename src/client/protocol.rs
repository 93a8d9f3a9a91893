//! Protocol message definitions
//!
//! Defines the envelopes exchanged with the UrbanEase update feed.
//! Inbound messages are `{"type": ..., "payload": ...}` objects whose payload
//! is opaque to the channel; outbound messages are small tagged commands.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Subscriber identity sent when no user is known
pub const ANONYMOUS_SUBSCRIBER: &str = "anonymous";

// ============================================================================
// Error Types
// ============================================================================

/// Protocol-related errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Unknown message type: {0}")]
    UnknownType(String),
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

// ============================================================================
// Inbound Envelope
// ============================================================================

/// Envelope wrapping every message pushed by the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Message type used to select a handler
    #[serde(rename = "type")]
    pub kind: String,
    /// Opaque payload handed to the handler; `null` when absent
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Create a new envelope
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Parse and validate an envelope from JSON
    pub fn from_json(json: &str) -> ProtocolResult<Self> {
        let envelope: Self = serde_json::from_str(json)?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// Validate the envelope
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.kind.trim().is_empty() {
            return Err(ProtocolError::InvalidMessage(
                "type cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Serialize the envelope to JSON
    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The well-known message kind, if this is one
    pub fn known_kind(&self) -> Option<MessageKind> {
        self.kind.parse().ok()
    }
}

// ============================================================================
// Known Message Types
// ============================================================================

/// Message types the dashboard knows how to render
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Live ETA and status for transit vehicles
    TransportUpdate,
    /// Congestion or roadworks alert
    TrafficAlert,
    /// City-wide emergency broadcast
    EmergencyAlert,
    /// Free-form user notification
    Notification,
}

impl MessageKind {
    /// Every known kind, in registration order
    pub const ALL: [MessageKind; 4] = [
        MessageKind::TransportUpdate,
        MessageKind::TrafficAlert,
        MessageKind::EmergencyAlert,
        MessageKind::Notification,
    ];

    /// Wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::TransportUpdate => "transport_update",
            MessageKind::TrafficAlert => "traffic_alert",
            MessageKind::EmergencyAlert => "emergency_alert",
            MessageKind::Notification => "notification",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownType(s.to_string()))
    }
}

// ============================================================================
// Outbound Messages
// ============================================================================

/// Commands the client originates itself
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Register interest in updates for a subscriber
    Subscribe {
        /// User identifier, or "anonymous"
        user_id: String,
    },
}

impl ClientMessage {
    /// Create a Subscribe message, falling back to the anonymous identity
    pub fn subscribe(user_id: Option<&str>) -> Self {
        ClientMessage::Subscribe {
            user_id: user_id.unwrap_or(ANONYMOUS_SUBSCRIBER).to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
