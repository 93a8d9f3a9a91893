//! Dashboard view model
//!
//! In-memory state behind the dashboard widgets: the transport ETA board,
//! the traffic alert feed, the emergency banner and the notification tray.
//! Timed entries carry their arrival instant and are pruned by [`Dashboard::expire`].

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Traffic alerts stay on the feed for five minutes
pub const TRAFFIC_ALERT_TTL: Duration = Duration::from_secs(300);

/// Notifications dismiss themselves after five seconds
pub const NOTIFICATION_TTL: Duration = Duration::from_secs(5);

// ============================================================================
// Payloads
// ============================================================================

/// One row of a `transport_update` payload
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TransportUpdate {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(deserialize_with = "lenient_string")]
    pub eta: String,
}

/// Payload of a `traffic_alert`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TrafficAlert {
    #[serde(default = "default_severity")]
    pub severity: String,
    pub title: String,
    pub message: String,
}

/// Payload of an `emergency_alert`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EmergencyAlert {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub location: String,
}

/// Payload of a `notification`: plain text or an object
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum NotificationPayload {
    Text(String),
    Detailed {
        #[serde(alias = "message")]
        text: String,
        #[serde(default = "default_level")]
        level: String,
    },
}

/// A notification as shown in the tray
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Notification {
    pub text: String,
    pub level: String,
}

impl From<NotificationPayload> for Notification {
    fn from(payload: NotificationPayload) -> Self {
        match payload {
            NotificationPayload::Text(text) => Notification {
                text,
                level: default_level(),
            },
            NotificationPayload::Detailed { text, level } => Notification { text, level },
        }
    }
}

fn default_severity() -> String {
    "warning".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

/// Accept strings, numbers and booleans for display fields
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

// ============================================================================
// Board
// ============================================================================

/// Status and ETA shown for one vehicle or line
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TransportStatus {
    pub status: String,
    pub eta: String,
}

#[derive(Debug, Clone)]
struct Timed<T> {
    item: T,
    arrived: Instant,
}

/// Counts for logging
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DashboardSummary {
    pub transport_entries: usize,
    pub traffic_alerts: usize,
    pub emergency_active: bool,
    pub notifications: usize,
}

#[derive(Debug, Default)]
pub struct Dashboard {
    transport: BTreeMap<String, TransportStatus>,
    /// Newest first
    traffic_alerts: VecDeque<Timed<TrafficAlert>>,
    emergency: Option<EmergencyAlert>,
    notifications: VecDeque<Timed<Notification>>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update ETA rows, returning how many rows were touched
    pub fn apply_transport_updates(&mut self, updates: Vec<TransportUpdate>) -> usize {
        let count = updates.len();
        for update in updates {
            self.transport.insert(
                update.id,
                TransportStatus {
                    status: update.status,
                    eta: update.eta,
                },
            );
        }
        count
    }

    pub fn push_traffic_alert(&mut self, alert: TrafficAlert, now: Instant) {
        self.traffic_alerts.push_front(Timed {
            item: alert,
            arrived: now,
        });
    }

    /// Replace the emergency banner
    pub fn set_emergency(&mut self, alert: EmergencyAlert) {
        self.emergency = Some(alert);
    }

    pub fn clear_emergency(&mut self) {
        self.emergency = None;
    }

    pub fn push_notification(&mut self, notification: Notification, now: Instant) {
        self.notifications.push_back(Timed {
            item: notification,
            arrived: now,
        });
    }

    /// Drop timed entries older than their TTL, returning how many went
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.traffic_alerts.len() + self.notifications.len();
        self.traffic_alerts
            .retain(|a| now.saturating_duration_since(a.arrived) < TRAFFIC_ALERT_TTL);
        self.notifications
            .retain(|n| now.saturating_duration_since(n.arrived) < NOTIFICATION_TTL);
        before - (self.traffic_alerts.len() + self.notifications.len())
    }

    pub fn transport_status(&self, id: &str) -> Option<&TransportStatus> {
        self.transport.get(id)
    }

    /// Alerts, newest first
    pub fn traffic_alerts(&self) -> impl Iterator<Item = &TrafficAlert> {
        self.traffic_alerts.iter().map(|t| &t.item)
    }

    pub fn emergency(&self) -> Option<&EmergencyAlert> {
        self.emergency.as_ref()
    }

    /// Notifications, oldest first
    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.notifications.iter().map(|t| &t.item)
    }

    pub fn summary(&self) -> DashboardSummary {
        DashboardSummary {
            transport_entries: self.transport.len(),
            traffic_alerts: self.traffic_alerts.len(),
            emergency_active: self.emergency.is_some(),
            notifications: self.notifications.len(),
        }
    }
}
