//! Test doubles for the transport and scheduler

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use super::scheduler::{Scheduler, TimerId};
use super::transport::{EventSink, Transport, TransportError, TransportResult};

#[derive(Default)]
struct FakeState {
    opened: Vec<String>,
    sent: Vec<String>,
    close_calls: usize,
    fail_next_open: bool,
    sink: Option<EventSink>,
}

/// Records everything the channel asks of it; events are injected by hand
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_open(&self) {
        self.state.lock().unwrap().fail_next_open = true;
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.state.lock().unwrap().opened.clone()
    }

    pub fn sent_json(&self) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().unwrap().close_calls
    }

    /// Sink handed over by the most recent successful `open`
    pub fn sink(&self) -> Option<EventSink> {
        self.state.lock().unwrap().sink.clone()
    }
}

impl Transport for FakeTransport {
    fn open(&mut self, url: &str, sink: EventSink) -> TransportResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_open {
            state.fail_next_open = false;
            return Err(TransportError::InvalidEndpoint(url.to_string()));
        }
        state.opened.push(url.to_string());
        state.sink = Some(sink);
        Ok(())
    }

    fn send(&mut self, text: String) -> TransportResult<()> {
        self.state.lock().unwrap().sent.push(text);
        Ok(())
    }

    fn close(&mut self) {
        self.state.lock().unwrap().close_calls += 1;
    }
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    timers: Vec<(TimerId, Duration, Duration)>,
}

/// Scheduler whose clock only moves when told to
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timers scheduled and not yet fired or cancelled
    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().timers.len()
    }

    /// Requested delays of pending timers
    pub fn delays(&self) -> Vec<Duration> {
        self.state
            .lock()
            .unwrap()
            .timers
            .iter()
            .map(|(_, _, delay)| *delay)
            .collect()
    }

    /// Move the clock forward and return the timers that came due
    pub fn advance(&self, by: Duration) -> Vec<TimerId> {
        let mut state = self.state.lock().unwrap();
        state.now += by;
        let now = state.now;

        let mut fired = Vec::new();
        state.timers.retain(|(id, due, _)| {
            if *due <= now {
                fired.push(*id);
                false
            } else {
                true
            }
        });
        fired
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration) -> TimerId {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = TimerId::from_raw(state.next_id);
        let due = state.now + delay;
        state.timers.push((id, due, delay));
        id
    }

    fn cancel(&mut self, id: TimerId) {
        self.state
            .lock()
            .unwrap()
            .timers
            .retain(|(timer, _, _)| *timer != id);
    }
}
