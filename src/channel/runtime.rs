//! Channel event loop and handle
//!
//! The channel is owned by a single task that drains one queue of
//! [`ChannelEvent`]s: transport callbacks, timer expiries and commands from
//! [`ChannelHandle`]s. Processing is strictly sequential, which is what gives
//! handlers their in-order delivery.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::event::{ChannelEvent, Command};
use super::realtime::{ChannelState, RealtimeChannel, ReconnectPolicy};
use super::registry::HandlerRegistry;
use super::scheduler::{Scheduler, TokioScheduler};
use super::transport::Transport;
use crate::client::{ProtocolResult, ResolveEndpoint};

/// How long shutdown waits for the transport to confirm the close
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// Drives a channel from its event queue
pub struct ChannelRuntime<T: Transport, S: Scheduler> {
    channel: RealtimeChannel<T, S>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    shutdown_timeout: Duration,
}

impl<T: Transport, S: Scheduler> ChannelRuntime<T, S> {
    /// Pair a channel with the receiving end of the queue its sinks feed
    pub fn new(
        channel: RealtimeChannel<T, S>,
        events: mpsc::UnboundedReceiver<ChannelEvent>,
    ) -> Self {
        Self {
            channel,
            events,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn channel(&self) -> &RealtimeChannel<T, S> {
        &self.channel
    }

    /// Process events until shutdown is requested or every state
    /// receiver (and so every handle) is dropped
    pub async fn run(mut self) {
        loop {
            let event = tokio::select! {
                event = self.events.recv() => event,
                _ = self.channel.unobserved() => {
                    debug!("All channel handles dropped");
                    None
                }
            };

            match event {
                Some(ChannelEvent::Transport { connection, event }) => {
                    self.channel.handle_transport_event(connection, event);
                }
                Some(ChannelEvent::ReconnectDue(timer)) => {
                    self.channel.handle_reconnect_due(timer);
                }
                Some(ChannelEvent::Command(Command::Shutdown)) | None => {
                    info!("Channel shutting down");
                    self.channel.close();
                    self.finish_close().await;
                    break;
                }
                Some(ChannelEvent::Command(command)) => self.apply(command),
            }
        }
        debug!("Channel event loop finished");
    }

    /// Keep feeding transport events until the close completes or times out
    async fn finish_close(&mut self) {
        let deadline = tokio::time::sleep(self.shutdown_timeout);
        tokio::pin!(deadline);

        while self.channel.state() == ChannelState::Closing {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(ChannelEvent::Transport { connection, event }) => {
                        self.channel.handle_transport_event(connection, event);
                    }
                    Some(_) => {}
                    None => break,
                },
                _ = &mut deadline => {
                    warn!("Transport did not confirm close within {:?}", self.shutdown_timeout);
                    break;
                }
            }
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Connect => self.channel.connect(),
            Command::Send(message) => {
                self.channel.send(&message);
            }
            Command::Close => self.channel.close(),
            Command::SetSubscriber(subscriber) => self.channel.set_subscriber(subscriber),
            Command::ReplaceHandlers(handlers) => self.channel.replace_handlers(handlers),
            Command::Shutdown => {}
        }
    }
}

/// Cloneable front door to a running channel
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    commands: mpsc::UnboundedSender<ChannelEvent>,
    state: watch::Receiver<ChannelState>,
}

impl ChannelHandle {
    /// Begin connecting (no-op unless closed)
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Send a message if the channel is open; dropped otherwise
    ///
    /// Only fails when the message cannot be serialized.
    pub fn send<M: Serialize + ?Sized>(&self, message: &M) -> ProtocolResult<()> {
        let value = serde_json::to_value(message)?;
        self.command(Command::Send(value));
        Ok(())
    }

    /// Close the connection and stop reconnecting
    pub fn close(&self) {
        self.command(Command::Close);
    }

    /// Change the identity sent in `subscribe`
    pub fn set_subscriber(&self, subscriber: Option<String>) {
        self.command(Command::SetSubscriber(subscriber));
    }

    /// Swap the handler table
    pub fn replace_handlers(&self, handlers: HandlerRegistry) {
        self.command(Command::ReplaceHandlers(handlers));
    }

    /// Close the channel and end its event loop
    pub fn shutdown(&self) {
        self.command(Command::Shutdown);
    }

    /// Last published state
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Wait until the channel reaches `target`
    ///
    /// Returns false if the event loop ended first.
    pub async fn wait_for_state(&self, target: ChannelState) -> bool {
        let mut rx = self.state.clone();
        let reached = rx.wait_for(|state| *state == target).await.is_ok();
        reached
    }

    fn command(&self, command: Command) {
        if self.commands.send(ChannelEvent::Command(command)).is_err() {
            debug!("Channel event loop is gone, command dropped");
        }
    }
}

/// Assembles a channel, its event loop and a handle
pub struct ChannelBuilder {
    resolver: Box<dyn ResolveEndpoint>,
    handlers: HandlerRegistry,
    policy: ReconnectPolicy,
    subscriber: Option<String>,
    shutdown_timeout: Duration,
}

impl ChannelBuilder {
    /// Start building a channel that connects to `resolver`'s endpoint
    pub fn new(resolver: impl ResolveEndpoint + 'static) -> Self {
        Self {
            resolver: Box::new(resolver),
            handlers: HandlerRegistry::new(),
            policy: ReconnectPolicy::default(),
            subscriber: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn subscriber(mut self, subscriber: Option<String>) -> Self {
        self.subscriber = subscriber;
        self
    }

    /// Upper bound on waiting for the close handshake at shutdown
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Build the runtime with tokio timers, without spawning it
    ///
    /// Must be called inside a tokio runtime.
    pub fn build<T: Transport>(
        self,
        transport: T,
    ) -> (ChannelHandle, ChannelRuntime<T, TokioScheduler>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = TokioScheduler::new(tx.clone());

        let channel = RealtimeChannel::new(
            BoxedResolver(self.resolver),
            transport,
            scheduler,
            tx.clone(),
            self.handlers,
        )
        .with_policy(self.policy)
        .with_subscriber(self.subscriber);

        let handle = ChannelHandle {
            commands: tx,
            state: channel.subscribe_state(),
        };
        let runtime = ChannelRuntime::new(channel, rx).with_shutdown_timeout(self.shutdown_timeout);
        (handle, runtime)
    }

    /// Build and spawn the event loop
    pub fn spawn<T: Transport + 'static>(self, transport: T) -> (ChannelHandle, JoinHandle<()>) {
        let (handle, runtime) = self.build(transport);
        let task = tokio::spawn(runtime.run());
        (handle, task)
    }
}

struct BoxedResolver(Box<dyn ResolveEndpoint>);

impl ResolveEndpoint for BoxedResolver {
    fn resolve(&self) -> crate::client::EndpointResult<String> {
        self.0.resolve()
    }
}
