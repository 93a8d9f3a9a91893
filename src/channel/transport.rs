//! Transport abstraction
//!
//! The channel never talks to a socket directly. It hands the transport an
//! [`EventSink`] with four slots (`on_open`, `on_message`, `on_close`,
//! `on_error`) and reacts to whatever comes back through its event loop.

use thiserror::Error;
use tokio::sync::mpsc;

use super::event::{ChannelEvent, ConnectionId, TransportEvent};

/// Errors raised synchronously by a transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Transport not connected")]
    NotConnected,

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Delivers transport events for one connection into the channel's queue
#[derive(Debug, Clone)]
pub struct EventSink {
    connection: ConnectionId,
    tx: mpsc::UnboundedSender<ChannelEvent>,
}

impl EventSink {
    /// Create a sink tagged with a connection id
    pub fn new(connection: ConnectionId, tx: mpsc::UnboundedSender<ChannelEvent>) -> Self {
        Self { connection, tx }
    }

    /// Connection this sink reports for
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn on_open(&self) -> bool {
        self.emit(TransportEvent::Opened)
    }

    pub fn on_message(&self, text: impl Into<String>) -> bool {
        self.emit(TransportEvent::Message(text.into()))
    }

    pub fn on_close(&self, code: Option<u16>, reason: impl Into<String>) -> bool {
        self.emit(TransportEvent::Closed {
            code,
            reason: reason.into(),
        })
    }

    pub fn on_error(&self, error: impl Into<String>) -> bool {
        self.emit(TransportEvent::Error(error.into()))
    }

    /// Returns false once the event loop has gone away
    fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(ChannelEvent::Transport {
                connection: self.connection,
                event,
            })
            .is_ok()
    }
}

/// A message transport the channel can drive
///
/// Implementations must return from `open` immediately and report the
/// outcome later through the sink. `send` must never block.
pub trait Transport: Send {
    /// Start connecting to `url`
    fn open(&mut self, url: &str, sink: EventSink) -> TransportResult<()>;

    /// Write a text frame on the current connection
    fn send(&mut self, text: String) -> TransportResult<()>;

    /// Begin closing the current connection, if any
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_sink_tags_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        let sink = EventSink::new(id, tx);

        assert!(sink.on_open());
        assert!(sink.on_message("hello"));
        assert!(sink.on_close(Some(1000), "bye"));

        let mut seen = Vec::new();
        while let Ok(ChannelEvent::Transport { connection, event }) = rx.try_recv() {
            assert_eq!(connection, id);
            seen.push(event);
        }
        assert_eq!(
            seen,
            vec![
                TransportEvent::Opened,
                TransportEvent::Message("hello".to_string()),
                TransportEvent::Closed {
                    code: Some(1000),
                    reason: "bye".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_sink_reports_dropped_loop() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(Uuid::new_v4(), tx);
        drop(rx);
        assert!(!sink.on_error("boom"));
    }
}
