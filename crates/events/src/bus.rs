//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>`; publishers never wait on
//! subscribers.

use chrono::{DateTime, Utc};
use helmsman_core::hooks::HookWhen;
use helmsman_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// LifecycleEvent
// ---------------------------------------------------------------------------

/// Something hooks can subscribe to.
///
/// Constructed via [`LifecycleEvent::new`] and enriched with
/// [`with_source`](LifecycleEvent::with_source) and
/// [`with_payload`](LifecycleEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub when: HookWhen,

    /// Source entity kind (`"history"`, `"project"`, `"template"`, ...).
    pub source_entity_type: Option<String>,

    pub source_entity_id: Option<DbId>,

    /// Event-specific data, sent to hook recipients as-is.
    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn new(when: HookWhen) -> Self {
        Self {
            when,
            source_entity_type: None,
            source_entity_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_source(mut self, entity_type: impl Into<String>, entity_id: DbId) -> Self {
        self.source_entity_type = Some(entity_type.into());
        self.source_entity_id = Some(entity_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// JSON body sent to hook recipients.
    pub fn to_message(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.when,
            "source_entity_type": self.source_entity_type,
            "source_entity_id": self.source_entity_id,
            "payload": self.payload,
            "timestamp": self.timestamp,
        })
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest unconsumed events are dropped and
    /// slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: LifecycleEvent) {
        // A send error only means there are no receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
