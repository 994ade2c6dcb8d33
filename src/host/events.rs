//! Structured diagnostic events.
//!
//! Every event is mirrored into `tracing` at its level and broadcast as an
//! [`EventEnvelope`] so an observability collaborator (or the stdio adapter)
//! can consume it. A send with no subscribers is not an error.

use crate::host::contract::{EventEnvelope, EventLevel};
use tokio::sync::broadcast;

/// Event name used for user-facing transient notifications.
pub const NOTICE_EVENT: &str = "notice";

#[derive(Debug, Clone)]
pub struct Diagnostics {
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl Diagnostics {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _event_rx) = broadcast::channel(capacity.max(1));
        Self { event_tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_tx.subscribe()
    }

    pub fn emit(&self, level: EventLevel, event: &str, payload: serde_json::Value) {
        match level {
            EventLevel::Debug => tracing::debug!(event, %payload, "bridge event"),
            EventLevel::Info => tracing::info!(event, %payload, "bridge event"),
            EventLevel::Warn => tracing::warn!(event, %payload, "bridge event"),
            EventLevel::Error => tracing::error!(event, %payload, "bridge event"),
        }
        let envelope = EventEnvelope::new(uuid::Uuid::new_v4().to_string(), event, level, payload);
        let _ = self.event_tx.send(envelope);
    }

    /// Surface a transient notification to the user.
    pub fn notice(&self, level: EventLevel, message: impl Into<String>) {
        self.emit(
            level,
            NOTICE_EVENT,
            serde_json::json!({ "message": message.into() }),
        );
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(128)
    }
}
