//! Reconnect timers
//!
//! Timers are a capability handed to the channel so that tests can drive
//! time by hand. Expiry is reported as a [`ChannelEvent::ReconnectDue`].

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::event::ChannelEvent;

/// Handle for a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Schedules one-shot timers
pub trait Scheduler: Send {
    /// Arrange for `id` to fire after `delay`
    fn schedule(&mut self, delay: Duration) -> TimerId;

    /// Cancel a timer; unknown or already fired ids are ignored
    fn cancel(&mut self, id: TimerId);
}

/// Scheduler backed by `tokio::time::sleep`
pub struct TokioScheduler {
    next_id: u64,
    timers: HashMap<TimerId, JoinHandle<()>>,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl TokioScheduler {
    /// Create a scheduler delivering expiries into the given queue
    pub fn new(events: mpsc::UnboundedSender<ChannelEvent>) -> Self {
        Self {
            next_id: 0,
            timers: HashMap::new(),
            events,
        }
    }

    /// Number of timers that have not yet fired or been cancelled
    pub fn pending(&self) -> usize {
        self.timers.values().filter(|t| !t.is_finished()).count()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration) -> TimerId {
        self.timers.retain(|_, task| !task.is_finished());

        self.next_id += 1;
        let id = TimerId(self.next_id);
        let events = self.events.clone();
        let deadline = Instant::now() + delay;

        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = events.send(ChannelEvent::ReconnectDue(id));
        });
        self.timers.insert(id, task);

        debug!("Scheduled timer {} in {:?}", id.0, delay);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(task) = self.timers.remove(&id) {
            task.abort();
            debug!("Cancelled timer {}", id.0);
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, task) in self.timers.drain() {
            task.abort();
        }
    }
}
