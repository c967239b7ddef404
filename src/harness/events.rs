//! Lifecycle events
//!
//! Fire-and-forget notifications for external observers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

#[derive(Clone, Debug, Serialize)]
pub struct Event {
    pub name: String,
    pub entry_id: Option<String>,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_id: None,
            payload: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn for_entry(mut self, entry_id: impl Into<String>) -> Self {
        self.entry_id = Some(entry_id.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Receives events; delivery is best effort
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &Event);
}

/// Drops every event
#[derive(Clone, Copy, Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: &Event) {}
}

/// Logs events at debug level
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &Event) {
        debug!(
            event = %event.name,
            entry = event.entry_id.as_deref().unwrap_or("-"),
            "{}",
            event.payload
        );
    }
}
