//! Stored span and event records

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A span as persisted by the store.
///
/// Immutable once written except for the append of new events. The
/// `conversation_id`, `agent` and `model` fields are denormalized from the
/// `yuu.*` attributes at ingest time so the listing path never has to dig
/// through attribute maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanRecord {
    pub trace_id: String,
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub name: String,
    pub start_time_unix_nano: u64,
    pub end_time_unix_nano: u64,
    pub status_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    /// Span attributes, stored opaquely. No validation of `yuu.*` keys
    /// happens here; typed decoding is the rollup engine's job.
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Resource-level attributes of the exporting process.
    #[serde(default)]
    pub resource: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Events ordered by timestamp.
    #[serde(default)]
    pub events: Vec<EventRecord>,
}

/// A timestamped, attribute-bearing fact attached to a span. Append-only,
/// never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub name: String,
    pub time_unix_nano: u64,
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl EventRecord {
    /// Content identity of an event: name + timestamp + attributes.
    ///
    /// Re-ingesting an event with the same identity is a no-op, which makes
    /// batch replay and producer retries safe. BTreeMap keys serialize in a
    /// stable order, so the hash is deterministic.
    pub fn identity_hash(&self) -> u64 {
        let canonical =
            serde_json::to_string(&(&self.name, self.time_unix_nano, &self.attributes))
                .unwrap_or_default();
        fxhash::hash64(canonical.as_bytes())
    }
}

impl SpanRecord {
    /// True when this span is a conversation root.
    pub fn is_conversation_root(&self) -> bool {
        self.conversation_id.is_some()
    }

    /// The `yuu.conversation.tags` attribute of a root span, if present.
    pub fn tags(&self) -> Option<&serde_json::Value> {
        self.attributes.get(crate::otel::ATTR_CONVERSATION_TAGS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_event(name: &str, time: u64, amount: f64) -> EventRecord {
        let mut attributes = BTreeMap::new();
        attributes.insert("yuu.cost.amount".to_string(), serde_json::json!(amount));
        EventRecord {
            name: name.to_string(),
            time_unix_nano: time,
            attributes,
        }
    }

    #[test]
    fn test_identity_hash_stable() {
        let a = make_event("yuu.cost", 1000, 0.002);
        let b = make_event("yuu.cost", 1000, 0.002);
        assert_eq!(a.identity_hash(), b.identity_hash());
    }

    #[test]
    fn test_identity_hash_distinguishes_content() {
        let a = make_event("yuu.cost", 1000, 0.002);
        let b = make_event("yuu.cost", 1000, 0.003);
        let c = make_event("yuu.cost", 2000, 0.002);
        assert_ne!(a.identity_hash(), b.identity_hash());
        assert_ne!(a.identity_hash(), c.identity_hash());
    }
}
