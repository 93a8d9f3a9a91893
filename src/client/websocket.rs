//! WebSocket transport
//!
//! Runs each connection in its own task. Frames read from the socket and
//! lifecycle changes are reported through the connection's [`EventSink`];
//! writes are queued on an unbounded channel so `send` never blocks.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::channel::{EventSink, Transport, TransportError, TransportResult};

/// Close code sent when the client hangs up on purpose
const NORMAL_CLOSURE: u16 = 1000;

/// How long to wait for the server's half of the closing handshake
const CLOSE_REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// Work queued for the connection task
#[derive(Debug)]
enum Outgoing {
    Text(String),
    Close,
}

/// [`Transport`] over `tokio-tungstenite`
///
/// `open` must be called from within a tokio runtime.
#[derive(Default)]
pub struct WebSocketTransport {
    outgoing: Option<mpsc::UnboundedSender<Outgoing>>,
    task: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a connection task is still running
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Transport for WebSocketTransport {
    fn open(&mut self, url: &str, sink: EventSink) -> TransportResult<()> {
        let request = url
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

        // At most one live socket
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.outgoing = Some(tx);
        self.task = Some(tokio::spawn(run_connection(request, sink, rx)));
        Ok(())
    }

    fn send(&mut self, text: String) -> TransportResult<()> {
        let outgoing = self.outgoing.as_ref().ok_or(TransportError::NotConnected)?;
        outgoing
            .send(Outgoing::Text(text))
            .map_err(|_| TransportError::SendFailed("connection task has exited".to_string()))
    }

    fn close(&mut self) {
        if let Some(outgoing) = self.outgoing.take() {
            let _ = outgoing.send(Outgoing::Close);
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Own one connection from handshake to close
async fn run_connection(
    request: Request,
    sink: EventSink,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
) {
    let uri = request.uri().to_string();

    // Nothing is written before the channel sees Opened, so anything that
    // arrives here is a close request
    let ws_stream = tokio::select! {
        result = connect_async(request) => match result {
            Ok((stream, _response)) => stream,
            Err(e) => {
                sink.on_error(format!("failed to connect to {}: {}", uri, e));
                return;
            }
        },
        _ = outgoing.recv() => {
            sink.on_close(None, "closed before open");
            return;
        }
    };

    sink.on_open();
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received {} bytes from {}", text.len(), uri);
                        sink.on_message(text);
                    }
                    Some(Ok(Message::Binary(data))) => {
                        warn!("Received binary message ({} bytes), ignoring", data.len());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_sender.send(Message::Pong(data)).await {
                            sink.on_error(e.to_string());
                            return;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pong messages
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                            None => (None, String::new()),
                        };
                        sink.on_close(code, reason);
                        return;
                    }
                    Some(Ok(Message::Frame(_))) => {
                        // Raw frame, ignore
                    }
                    Some(Err(e)) => {
                        sink.on_error(e.to_string());
                        return;
                    }
                    None => {
                        sink.on_close(None, "connection closed by server");
                        return;
                    }
                }
            }
            cmd = outgoing.recv() => {
                match cmd {
                    Some(Outgoing::Text(text)) => {
                        if let Err(e) = ws_sender.send(Message::Text(text)).await {
                            sink.on_error(e.to_string());
                            return;
                        }
                    }
                    Some(Outgoing::Close) | None => {
                        if ws_sender.send(Message::Close(None)).await.is_ok() {
                            // Give the server a chance to answer the close
                            let reply = tokio::time::timeout(CLOSE_REPLY_TIMEOUT, async {
                                while let Some(Ok(msg)) = ws_receiver.next().await {
                                    if msg.is_close() {
                                        break;
                                    }
                                }
                            });
                            if reply.await.is_err() {
                                debug!("No close reply from {}", uri);
                            }
                        }
                        sink.on_close(Some(NORMAL_CLOSURE), "closed by client");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelEvent, TransportEvent};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use uuid::Uuid;

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> TransportEvent {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("event queue closed");
        match event {
            ChannelEvent::Transport { event, .. } => event,
            other => panic!("Expected transport event, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_url_rejected_synchronously() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut transport = WebSocketTransport::new();
        let result = transport.open("not a url", EventSink::new(Uuid::new_v4(), tx));
        assert!(matches!(result, Err(TransportError::InvalidEndpoint(_))));
        assert!(!transport.is_active());
    }

    #[test]
    fn test_send_without_connection() {
        let mut transport = WebSocketTransport::new();
        let result = transport.send("{}".to_string());
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = WebSocketTransport::new();
        transport
            .open(&format!("ws://{}/ws/updates/", addr), EventSink::new(Uuid::new_v4(), tx))
            .unwrap();

        match next_event(&mut rx).await {
            TransportEvent::Error(msg) => assert!(msg.contains("failed to connect")),
            other => panic!("Expected Error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_round_trip_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let subscribe = ws.next().await.unwrap().unwrap();
            assert_eq!(
                subscribe,
                Message::Text(r#"{"type":"subscribe","user_id":"anonymous"}"#.to_string())
            );

            ws.send(Message::Text(
                r#"{"type":"notification","payload":{"text":"hi"}}"#.to_string(),
            ))
            .await
            .unwrap();

            // Wait for the client to hang up
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = WebSocketTransport::new();
        transport
            .open(&format!("ws://{}/ws/updates/", addr), EventSink::new(Uuid::new_v4(), tx))
            .unwrap();

        assert_eq!(next_event(&mut rx).await, TransportEvent::Opened);
        transport
            .send(r#"{"type":"subscribe","user_id":"anonymous"}"#.to_string())
            .unwrap();

        let expected = r#"{"type":"notification","payload":{"text":"hi"}}"#;
        assert_eq!(
            next_event(&mut rx).await,
            TransportEvent::Message(expected.to_string())
        );

        transport.close();
        assert_eq!(
            next_event(&mut rx).await,
            TransportEvent::Closed {
                code: Some(NORMAL_CLOSURE),
                reason: "closed by client".to_string()
            }
        );

        server.await.unwrap();
    }
}
