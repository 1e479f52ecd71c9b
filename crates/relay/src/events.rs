// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relay event types, webhook payload mapping, and the browser fan-out hub.
//!
//! Field values are passed through as the donation tracker sent them; the
//! relay only decides which fields each event carries.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// Comment moderation state that allows a comment to be shown.
const COMMENT_APPROVED: &str = "APPROVED";

// -- Wire-format event types -------------------------------------------------

/// Events pushed to browser clients as `{"event": ..., "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RelayEvent {
    /// A donation approved to be shown on stream.
    Donation(Donation),
    /// The running total changed after a payment was confirmed.
    Total(TotalChange),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Donation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donor_visiblename: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_state: Option<Value>,
    /// Blank unless the comment was approved; absent when an approved
    /// donation carried none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_received: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TotalChange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_total: Option<Value>,
}

impl RelayEvent {
    /// Map a donation-tracker postback to an event. Unknown message types
    /// yield `None`.
    pub fn from_webhook(body: &Value) -> Option<Self> {
        let field = |name: &str| body.get(name).cloned();
        match body.get("message_type").and_then(Value::as_str)? {
            "donation_push" => {
                let approved =
                    body.get("comment_state").and_then(Value::as_str) == Some(COMMENT_APPROVED);
                let comment = if approved {
                    field("comment")
                } else {
                    Some(Value::String(String::new()))
                };
                Some(Self::Donation(Donation {
                    event: field("event"),
                    id: field("id"),
                    donor_visiblename: field("donor_visiblename"),
                    amount: field("amount"),
                    comment_state: field("comment_state"),
                    comment,
                    time_received: field("time_received"),
                }))
            }
            "donation_total_change" => Some(Self::Total(TotalChange {
                event: field("event"),
                id: field("id"),
                amount: field("amount"),
                new_total: field("new_total"),
            })),
            _ => None,
        }
    }

    /// Event name as seen by browser clients.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Donation(_) => "donation",
            Self::Total(_) => "total",
        }
    }
}

// -- Fan-out hub -------------------------------------------------------------

/// Fans relay events out to every connected browser client.
pub struct EventHub {
    tx: broadcast::Sender<RelayEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Returns the number of clients it reached.
    pub fn emit(&self, event: RelayEvent) -> usize {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::info!(event = event.name(), data = %json, "emit"),
            Err(_) => tracing::info!(event = event.name(), "emit"),
        }
        // No subscribers is not an error.
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.tx.subscribe()
    }

    /// Number of connected browser clients.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
