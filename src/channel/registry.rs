//! Handler registry
//!
//! Maps message types to update handlers. Each invocation is isolated: a
//! handler that returns an error or panics is logged and the channel moves
//! on to the next message.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::client::Envelope;

/// Handles the payload of one message type
pub type Handler = Box<dyn Fn(&Value) -> anyhow::Result<()> + Send>;

/// Called for envelopes whose type has no handler
pub type FallbackHook = Box<dyn Fn(&str, &Value) + Send>;

/// Errors that can occur while building a registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Handler already registered for message type: {0}")]
    Duplicate(String),

    #[error("Message type cannot be empty")]
    EmptyType,
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// What happened to a dispatched message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler ran to completion
    Handled,
    /// The handler returned an error or panicked
    HandlerFailed(String),
    /// No handler for this type
    Unhandled,
    /// The raw text was not a valid envelope
    Malformed,
}

/// Type-keyed table of update handlers
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
    fallback: Option<FallbackHook>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a message type
    ///
    /// Fails if the type is empty or already has a handler.
    pub fn register<F>(&mut self, kind: impl Into<String>, handler: F) -> RegistryResult<()>
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + 'static,
    {
        let kind = kind.into();
        if kind.trim().is_empty() {
            return Err(RegistryError::EmptyType);
        }
        if self.handlers.contains_key(&kind) {
            return Err(RegistryError::Duplicate(kind));
        }

        debug!("Registered handler for {}", kind);
        self.handlers.insert(kind, Box::new(handler));
        Ok(())
    }

    /// Builder-style variant of [`register`](Self::register)
    pub fn with_handler<F>(mut self, kind: impl Into<String>, handler: F) -> RegistryResult<Self>
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + 'static,
    {
        self.register(kind, handler)?;
        Ok(self)
    }

    /// Replace the hook used for unknown message types
    pub fn set_fallback<F>(&mut self, hook: F)
    where
        F: Fn(&str, &Value) + Send + 'static,
    {
        self.fallback = Some(Box::new(hook));
    }

    /// Check whether a type has a handler
    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered types, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Run the handler for an envelope
    pub fn dispatch(&self, envelope: &Envelope) -> DispatchOutcome {
        let Some(handler) = self.handlers.get(&envelope.kind) else {
            match &self.fallback {
                Some(hook) => {
                    if panic::catch_unwind(AssertUnwindSafe(|| {
                        hook(&envelope.kind, &envelope.payload)
                    }))
                    .is_err()
                    {
                        error!("Fallback hook panicked for type {}", envelope.kind);
                    }
                }
                None => info!("Unknown WebSocket message type: {}", envelope.kind),
            }
            return DispatchOutcome::Unhandled;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| handler(&envelope.payload))) {
            Ok(Ok(())) => DispatchOutcome::Handled,
            Ok(Err(e)) => {
                error!("Handler for {} failed: {:#}", envelope.kind, e);
                DispatchOutcome::HandlerFailed(e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Handler for {} panicked: {}", envelope.kind, message);
                DispatchOutcome::HandlerFailed(message)
            }
        }
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.kinds())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn recording(
        log: &Arc<Mutex<Vec<Value>>>,
    ) -> impl Fn(&Value) -> anyhow::Result<()> + Send + 'static {
        let log = Arc::clone(log);
        move |payload| {
            log.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = HandlerRegistry::new();
        registry.register("notification", |_| Ok(())).unwrap();
        let result = registry.register("notification", |_| Ok(()));
        assert!(matches!(result, Err(RegistryError::Duplicate(k)) if k == "notification"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_type_rejected() {
        let result = HandlerRegistry::new().with_handler("", |_| Ok(()));
        assert!(matches!(result, Err(RegistryError::EmptyType)));
    }

    #[test]
    fn test_dispatch_invokes_matching_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = HandlerRegistry::new()
            .with_handler("notification", recording(&log))
            .unwrap();

        let outcome = registry.dispatch(&Envelope::new("notification", json!({"text": "hi"})));
        assert_eq!(outcome, DispatchOutcome::Handled);
        assert_eq!(*log.lock().unwrap(), vec![json!({"text": "hi"})]);
    }

    #[test]
    fn test_unknown_type_goes_to_fallback() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let unknown = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new()
            .with_handler("notification", recording(&log))
            .unwrap();
        let seen = Arc::clone(&unknown);
        registry.set_fallback(move |kind, _| seen.lock().unwrap().push(kind.to_string()));

        let outcome = registry.dispatch(&Envelope::new("weather", json!(null)));
        assert_eq!(outcome, DispatchOutcome::Unhandled);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(*unknown.lock().unwrap(), vec!["weather".to_string()]);
    }

    #[test]
    fn test_failing_handler_is_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = HandlerRegistry::new()
            .with_handler("traffic_alert", |_| Err(anyhow::anyhow!("bad alert")))
            .unwrap()
            .with_handler("notification", recording(&log))
            .unwrap();

        let outcome = registry.dispatch(&Envelope::new("traffic_alert", json!({})));
        assert_eq!(outcome, DispatchOutcome::HandlerFailed("bad alert".to_string()));

        let outcome = registry.dispatch(&Envelope::new("notification", json!("after")));
        assert_eq!(outcome, DispatchOutcome::Handled);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let registry = HandlerRegistry::new()
            .with_handler("emergency_alert", |_| panic!("handler exploded"))
            .unwrap();

        let envelope = Envelope::new("emergency_alert", json!({}));
        for _ in 0..2 {
            match registry.dispatch(&envelope) {
                DispatchOutcome::HandlerFailed(msg) => assert!(msg.contains("handler exploded")),
                other => panic!("Expected HandlerFailed, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_kinds_sorted() {
        let registry = HandlerRegistry::new()
            .with_handler("traffic_alert", |_| Ok(()))
            .unwrap()
            .with_handler("notification", |_| Ok(()))
            .unwrap();
        assert_eq!(registry.kinds(), vec!["notification", "traffic_alert"]);
        assert!(registry.contains("notification"));
        assert!(!registry.contains("transport_update"));
    }
}
