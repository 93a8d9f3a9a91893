//! Standard update handlers
//!
//! Binds each known message type to the shared dashboard.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use anyhow::{anyhow, Context};
use serde_json::Value;
use tracing::{info, warn};

use super::board::{
    Dashboard, EmergencyAlert, Notification, NotificationPayload, TrafficAlert, TransportUpdate,
};
use crate::channel::{HandlerRegistry, RegistryResult};
use crate::client::MessageKind;

/// Dashboard shared between the channel's handlers and readers
pub type SharedDashboard = Arc<Mutex<Dashboard>>;

/// Registry with a handler for every [`MessageKind`], feeding `dashboard`
pub fn standard_handlers(dashboard: SharedDashboard) -> RegistryResult<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();

    let board = Arc::clone(&dashboard);
    registry.register(MessageKind::TransportUpdate.as_str(), move |payload| {
        let updates: Vec<TransportUpdate> =
            serde_json::from_value(payload.clone()).context("invalid transport_update payload")?;
        let count = lock(&board)?.apply_transport_updates(updates);
        info!("Transport board updated ({} entries)", count);
        Ok(())
    })?;

    let board = Arc::clone(&dashboard);
    registry.register(MessageKind::TrafficAlert.as_str(), move |payload| {
        let alert: TrafficAlert =
            serde_json::from_value(payload.clone()).context("invalid traffic_alert payload")?;
        info!("Traffic alert [{}]: {} - {}", alert.severity, alert.title, alert.message);
        let now = Instant::now();
        let mut board = lock(&board)?;
        board.expire(now);
        board.push_traffic_alert(alert, now);
        Ok(())
    })?;

    let board = Arc::clone(&dashboard);
    registry.register(MessageKind::EmergencyAlert.as_str(), move |payload| {
        let alert: EmergencyAlert =
            serde_json::from_value(payload.clone()).context("invalid emergency_alert payload")?;
        warn!(
            "Emergency alert: {} - {} (location: {})",
            alert.title, alert.message, alert.location
        );
        lock(&board)?.set_emergency(alert);
        Ok(())
    })?;

    let board = Arc::clone(&dashboard);
    registry.register(MessageKind::Notification.as_str(), move |payload: &Value| {
        let notification: NotificationPayload =
            serde_json::from_value(payload.clone()).context("invalid notification payload")?;
        let notification = Notification::from(notification);
        info!("Notification [{}]: {}", notification.level, notification.text);
        let now = Instant::now();
        let mut board = lock(&board)?;
        board.expire(now);
        board.push_notification(notification, now);
        Ok(())
    })?;

    Ok(registry)
}

fn lock(dashboard: &SharedDashboard) -> anyhow::Result<MutexGuard<'_, Dashboard>> {
    dashboard.lock().map_err(|_| anyhow!("dashboard lock poisoned"))
}
