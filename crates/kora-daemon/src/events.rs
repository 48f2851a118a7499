//! Event emission system.
//!
//! Ledger events are pushed from the daemon to subscribed connections as
//! JSON-RPC notifications. Each subscriber has an independent buffer
//! with backpressure at 1000 events; a subscriber that falls behind
//! loses the oldest events, never the daemon.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// An event emitted by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type name (e.g. "EntryApplied", "WithdrawalSettled").
    pub event_type: String,
    /// Unix timestamp.
    pub timestamp: u64,
    /// Type-specific payload.
    pub payload: serde_json::Value,
}

/// Filter for event subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// Category filter: "wallet", "withdrawal", "boost", "admin",
    /// "system".
    pub categories: Option<Vec<String>>,
    /// Filter to events about specific user ids.
    pub user_ids: Option<Vec<String>>,
}

/// Event bus for broadcasting events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: Event) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Emit with the current wall clock.
    pub fn emit_now(&self, event_type: &str, payload: serde_json::Value) {
        self.emit(Event {
            event_type: event_type.to_string(),
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            payload,
        });
    }

    /// Subscribe to events. Returns a receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Get the current sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl EventFilter {
    /// Check if an event matches this filter.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref categories) = self.categories {
            let event_category = categorize_event(&event.event_type);
            if !categories.iter().any(|c| c == event_category) {
                return false;
            }
        }

        if let Some(ref user_ids) = self.user_ids {
            if let Some(uid) = event.payload.get("user_id").and_then(|v| v.as_str()) {
                if !user_ids.iter().any(|id| id == uid) {
                    return false;
                }
            }
        }

        true
    }
}

/// Categorize an event type into a category.
fn categorize_event(event_type: &str) -> &'static str {
    match event_type {
        s if s.starts_with("Entry")
            || s.starts_with("Conversion")
            || s.starts_with("Subscription")
            || s.starts_with("Hold") =>
        {
            "wallet"
        }
        s if s.starts_with("Withdrawal") || s.starts_with("Payout") => "withdrawal",
        s if s.starts_with("Boost") => "boost",
        s if s.starts_with("Reserve") || s.starts_with("UserBalanceAdjusted") => "admin",
        _ => "system",
    }
}
