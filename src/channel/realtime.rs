//! Realtime channel state machine
//!
//! Owns the single connection slot, the reconnect timer and the handler
//! table. All methods are synchronous and are expected to be driven from one
//! event loop (see [`ChannelRuntime`](super::ChannelRuntime)); the transport and
//! scheduler report back through the same queue.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::event::{ChannelEvent, ConnectionId, TransportEvent};
use super::registry::{DispatchOutcome, HandlerRegistry};
use super::scheduler::{Scheduler, TimerId};
use super::transport::{EventSink, Transport};
use crate::client::{ClientMessage, Envelope, ResolveEndpoint};

/// Default delay before reconnecting after an unexpected close
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Connection states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Closed,
    Connecting,
    Open,
    Closing,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Closed => "closed",
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "open",
            ChannelState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// How the channel recovers from lost connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Fixed delay between losing a connection and the next attempt
    pub delay: Duration,
    /// Also retry when the transport cannot even be constructed
    pub retry_on_connect_failure: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
            retry_on_connect_failure: true,
        }
    }
}

/// The live-update channel
pub struct RealtimeChannel<T: Transport, S: Scheduler> {
    resolver: Box<dyn ResolveEndpoint>,
    transport: T,
    scheduler: S,
    /// Queue handed to each connection's event sink
    events: mpsc::UnboundedSender<ChannelEvent>,
    handlers: HandlerRegistry,
    policy: ReconnectPolicy,
    state: ChannelState,
    state_tx: watch::Sender<ChannelState>,
    connection: Option<ConnectionId>,
    reconnect_timer: Option<TimerId>,
    subscriber: Option<String>,
    /// Set by `close()`, cleared by the next `connect()`
    intentional_close: bool,
}

impl<T: Transport, S: Scheduler> RealtimeChannel<T, S> {
    /// Create a closed channel
    pub fn new(
        resolver: impl ResolveEndpoint + 'static,
        transport: T,
        scheduler: S,
        events: mpsc::UnboundedSender<ChannelEvent>,
        handlers: HandlerRegistry,
    ) -> Self {
        let (state_tx, _) = watch::channel(ChannelState::Closed);
        Self {
            resolver: Box::new(resolver),
            transport,
            scheduler,
            events,
            handlers,
            policy: ReconnectPolicy::default(),
            state: ChannelState::Closed,
            state_tx,
            connection: None,
            reconnect_timer: None,
            subscriber: None,
            intentional_close: false,
        }
    }

    /// Set the reconnect policy
    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the initial subscriber identity
    pub fn with_subscriber(mut self, subscriber: Option<String>) -> Self {
        self.subscriber = subscriber;
        self
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Receive every state transition
    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.state_tx.subscribe()
    }

    /// Resolves once no state receiver is left
    ///
    /// Borrows only the state sender; the channel is not `Sync`.
    pub fn unobserved(&self) -> impl Future<Output = ()> + Send + '_ {
        self.state_tx.closed()
    }

    pub fn subscriber(&self) -> Option<&str> {
        self.subscriber.as_deref()
    }

    /// Id of the live (or connecting) transport, if any
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.reconnect_timer.is_some()
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    // ------------------------------------------------------------------------
    // Public operations
    // ------------------------------------------------------------------------

    /// Start connecting
    ///
    /// Does nothing unless the channel is closed. Never fails: resolution or
    /// construction errors are logged and leave the channel closed, with a
    /// retry scheduled when the policy allows it.
    pub fn connect(&mut self) {
        if self.state != ChannelState::Closed {
            debug!("connect() ignored while {}", self.state);
            return;
        }

        self.intentional_close = false;
        self.cancel_reconnect();

        let url = match self.resolver.resolve() {
            Ok(url) => url,
            Err(e) => {
                error!("WebSocket setup failed: {}", e);
                self.on_connect_failed();
                return;
            }
        };

        let connection = Uuid::new_v4();
        let sink = EventSink::new(connection, self.events.clone());
        self.connection = Some(connection);
        self.set_state(ChannelState::Connecting);

        match self.transport.open(&url, sink) {
            Ok(()) => info!("Connecting to {}", url),
            Err(e) => {
                error!("WebSocket setup failed: {}", e);
                self.connection = None;
                self.set_state(ChannelState::Closed);
                self.on_connect_failed();
            }
        }
    }

    /// Serialize and transmit a message if the channel is open
    ///
    /// Returns whether the message was handed to the transport. Messages sent
    /// in any other state are dropped without error.
    pub fn send<M: Serialize + ?Sized>(&mut self, message: &M) -> bool {
        if self.state != ChannelState::Open {
            debug!("Dropping outbound message while {}", self.state);
            return false;
        }

        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize outbound message: {}", e);
                return false;
            }
        };

        match self.transport.send(text) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send message: {}", e);
                false
            }
        }
    }

    /// Parse raw text and run the matching handler
    ///
    /// Never alters the connection state.
    pub fn dispatch(&self, raw: &str) -> DispatchOutcome {
        match Envelope::from_json(raw) {
            Ok(envelope) => self.handlers.dispatch(&envelope),
            Err(e) => {
                warn!("Dropping malformed message: {}", e);
                DispatchOutcome::Malformed
            }
        }
    }

    /// Close the connection and suppress reconnection
    pub fn close(&mut self) {
        self.intentional_close = true;
        self.cancel_reconnect();

        match self.state {
            ChannelState::Open | ChannelState::Connecting => {
                info!("Closing WebSocket");
                self.set_state(ChannelState::Closing);
                self.transport.close();
            }
            ChannelState::Closing | ChannelState::Closed => {
                debug!("close() while already {}", self.state);
            }
        }
    }

    /// Update the subscriber identity, re-subscribing if connected
    pub fn set_subscriber(&mut self, subscriber: Option<String>) {
        self.subscriber = subscriber;
        if self.state == ChannelState::Open {
            self.send_subscribe();
        }
    }

    /// Swap in a new handler table
    pub fn replace_handlers(&mut self, handlers: HandlerRegistry) {
        debug!("Replacing handlers: {:?}", handlers);
        self.handlers = handlers;
    }

    // ------------------------------------------------------------------------
    // Event handling
    // ------------------------------------------------------------------------

    /// React to something the transport reported
    pub fn handle_transport_event(&mut self, connection: ConnectionId, event: TransportEvent) {
        if self.connection != Some(connection) {
            debug!("Ignoring event from stale connection {}", connection);
            return;
        }

        match event {
            TransportEvent::Opened => self.on_open(),
            TransportEvent::Message(text) => {
                if self.state == ChannelState::Open {
                    self.dispatch(&text);
                } else {
                    debug!("Dropping message received while {}", self.state);
                }
            }
            TransportEvent::Closed { code, reason } => self.on_close(code, &reason),
            TransportEvent::Error(err) => {
                warn!("WebSocket error: {}", err);
                self.on_close(None, &err);
            }
        }
    }

    /// React to a reconnect timer expiring
    pub fn handle_reconnect_due(&mut self, timer: TimerId) {
        if self.reconnect_timer != Some(timer) {
            debug!("Ignoring stale timer {}", timer.raw());
            return;
        }
        self.reconnect_timer = None;

        if self.intentional_close {
            return;
        }
        info!("Reconnecting");
        self.connect();
    }

    fn on_open(&mut self) {
        if self.state != ChannelState::Connecting {
            debug!("Ignoring open while {}", self.state);
            return;
        }
        self.set_state(ChannelState::Open);
        info!("WebSocket connected");
        self.send_subscribe();
    }

    fn on_close(&mut self, code: Option<u16>, reason: &str) {
        if self.state == ChannelState::Closed {
            return;
        }

        self.set_state(ChannelState::Closing);
        self.transport.close();
        self.connection = None;
        self.set_state(ChannelState::Closed);
        info!("WebSocket disconnected (code: {:?}, reason: {})", code, reason);

        if self.intentional_close {
            debug!("Closed intentionally, not reconnecting");
        } else {
            self.schedule_reconnect();
        }
    }

    fn on_connect_failed(&mut self) {
        if self.policy.retry_on_connect_failure {
            self.schedule_reconnect();
        }
    }

    fn send_subscribe(&mut self) {
        let message = ClientMessage::subscribe(self.subscriber.as_deref());
        self.send(&message);
    }

    fn schedule_reconnect(&mut self) {
        if self.reconnect_timer.is_some() {
            debug!("Reconnect already pending");
            return;
        }
        let timer = self.scheduler.schedule(self.policy.delay);
        self.reconnect_timer = Some(timer);
        info!("Reconnecting in {}ms", self.policy.delay.as_millis());
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            self.scheduler.cancel(timer);
        }
    }

    fn set_state(&mut self, state: ChannelState) {
        if self.state != state {
            debug!("Channel state: {} -> {}", self.state, state);
            self.state = state;
            self.state_tx.send_replace(state);
        }
    }
}
