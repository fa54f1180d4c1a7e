//! Durable span store
//!
//! Writes go through the WAL first, then into concurrent in-memory indexes.
//! Readers only touch the `DashMap`s and never block writers; every query
//! works on cloned records, so concurrent aggregations are trivially safe.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;

use super::model::SpanRecord;
use super::wal::{Wal, WalBatch, WalError};

pub struct SpanStore {
    /// Spans indexed by span id.
    spans: DashMap<String, SpanRecord>,
    /// Trace id -> span ids, in arrival order.
    traces: DashMap<String, Vec<String>>,
    /// Conversation id -> root span id.
    conversations: DashMap<String, String>,
    /// Serializes writers. WAL append order equals in-memory apply order.
    wal: Mutex<Wal>,
}

/// One row of the conversation listing.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub span_count: usize,
    pub total_cost: f64,
    pub start_time: u64,
    pub end_time: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub spans: usize,
    pub events: usize,
    pub conversations: usize,
    pub wal_bytes: u64,
}

impl SpanStore {
    /// Open the store under `data_dir`, replaying any committed batches.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let (wal, batches) = Wal::open(data_dir)?;
        let store = Self {
            spans: DashMap::new(),
            traces: DashMap::new(),
            conversations: DashMap::new(),
            wal: Mutex::new(wal),
        };

        let mut replayed = 0;
        for batch in &batches {
            store.apply_spans(&batch.spans);
            replayed += batch.spans.len();
        }
        if replayed > 0 {
            tracing::info!(
                "Replayed {} spans from {} WAL batches",
                replayed,
                batches.len()
            );
        }

        Ok(store)
    }

    /// Atomically persist and apply one ingest batch.
    ///
    /// The WAL append happens under the writer lock and fsyncs before the
    /// indexes are updated; concurrent batches interleave in commit order.
    /// Upserts are idempotent on `(trace_id, span_id)` and on event content
    /// identity, so replaying an identical batch changes nothing.
    pub fn upsert_batch(&self, spans: Vec<SpanRecord>) -> Result<usize, StoreError> {
        if spans.is_empty() {
            return Ok(0);
        }
        let batch = WalBatch::new(spans);

        let mut wal = self.wal.lock();
        wal.append(&batch)?;
        self.apply_spans(&batch.spans);
        drop(wal);

        Ok(batch.spans.len())
    }

    fn apply_spans(&self, spans: &[SpanRecord]) {
        for incoming in spans {
            match self.spans.get_mut(&incoming.span_id) {
                Some(mut existing) => merge_span(&mut existing, incoming),
                None => {
                    let mut record = incoming.clone();
                    dedup_and_sort_events(&mut record);
                    self.spans.insert(record.span_id.clone(), record);
                }
            }

            let mut trace = self.traces.entry(incoming.trace_id.clone()).or_default();
            if !trace.iter().any(|id| id == &incoming.span_id) {
                trace.push(incoming.span_id.clone());
            }
            drop(trace);

            if let Some(conversation_id) = &incoming.conversation_id {
                self.conversations
                    .insert(conversation_id.clone(), incoming.span_id.clone());
            }
        }
    }

    /// Paginated listing of conversations, newest first.
    ///
    /// Summary cost is computed by the rollup engine at read time, never
    /// stored. Ties on `start_time` break by span id ascending so offset
    /// pagination stays deterministic.
    pub fn list_conversations(
        &self,
        limit: usize,
        offset: usize,
        agent: Option<&str>,
    ) -> (Vec<ConversationSummary>, usize) {
        let mut roots: Vec<SpanRecord> = self
            .conversations
            .iter()
            .filter_map(|entry| self.spans.get(entry.value()).map(|s| s.clone()))
            .filter(|root| match agent {
                Some(agent) => root.agent.as_deref() == Some(agent),
                None => true,
            })
            .collect();

        roots.sort_by(|a, b| {
            b.start_time_unix_nano
                .cmp(&a.start_time_unix_nano)
                .then_with(|| a.span_id.cmp(&b.span_id))
        });

        let total = roots.len();
        let summaries = roots
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|root| self.summarize(root))
            .collect();

        (summaries, total)
    }

    fn summarize(&self, root: SpanRecord) -> ConversationSummary {
        let trace_spans = self.trace_spans(&root.trace_id);
        let rollup = crate::rollup::aggregate(&trace_spans);
        let start_time = trace_spans
            .iter()
            .map(|s| s.start_time_unix_nano)
            .min()
            .unwrap_or(root.start_time_unix_nano);
        let end_time = trace_spans
            .iter()
            .map(|s| s.end_time_unix_nano)
            .max()
            .unwrap_or(root.end_time_unix_nano);

        ConversationSummary {
            id: root.conversation_id.unwrap_or_default(),
            agent: root.agent.unwrap_or_default(),
            model: root.model,
            span_count: trace_spans.len(),
            total_cost: rollup.total_cost,
            start_time,
            end_time,
        }
    }

    /// All spans of a conversation, start-time ascending.
    ///
    /// Membership is every span sharing the root's trace id; spans whose
    /// `parent_span_id` has no match in the store are retained as orphans,
    /// never dropped.
    pub fn get_conversation(&self, conversation_id: &str) -> Option<Vec<SpanRecord>> {
        let root_span_id = self.conversations.get(conversation_id)?.clone();
        let root = self.spans.get(&root_span_id)?.clone();
        Some(self.trace_spans(&root.trace_id))
    }

    /// A single span with its events.
    pub fn get_span(&self, span_id: &str) -> Option<SpanRecord> {
        self.spans.get(span_id).map(|s| s.clone())
    }

    fn trace_spans(&self, trace_id: &str) -> Vec<SpanRecord> {
        let span_ids = match self.traces.get(trace_id) {
            Some(ids) => ids.clone(),
            None => return Vec::new(),
        };

        // An upsert that moves a span id to another trace leaves a stale
        // entry in the old trace's index; drop records whose trace id no
        // longer matches.
        let mut spans: Vec<SpanRecord> = span_ids
            .iter()
            .filter_map(|id| self.spans.get(id).map(|s| s.clone()))
            .filter(|s| s.trace_id == trace_id)
            .collect();
        spans.sort_by(|a, b| {
            a.start_time_unix_nano
                .cmp(&b.start_time_unix_nano)
                .then_with(|| a.span_id.cmp(&b.span_id))
        });
        spans
    }

    pub fn stats(&self) -> StoreStats {
        let events = self.spans.iter().map(|s| s.events.len()).sum();
        StoreStats {
            spans: self.spans.len(),
            events,
            conversations: self.conversations.len(),
            wal_bytes: self.wal.lock().size_bytes(),
        }
    }
}

/// Upsert semantics: scalar fields and attributes take the incoming values;
/// events are append-only, merged by content identity.
fn merge_span(existing: &mut SpanRecord, incoming: &SpanRecord) {
    existing.trace_id = incoming.trace_id.clone();
    existing.parent_span_id = incoming.parent_span_id.clone();
    existing.name = incoming.name.clone();
    existing.start_time_unix_nano = incoming.start_time_unix_nano;
    existing.end_time_unix_nano = incoming.end_time_unix_nano;
    existing.status_code = incoming.status_code;
    existing.status_message = incoming.status_message.clone();
    existing.attributes = incoming.attributes.clone();
    existing.resource = incoming.resource.clone();
    existing.conversation_id = incoming.conversation_id.clone();
    existing.agent = incoming.agent.clone();
    existing.model = incoming.model.clone();

    let known: std::collections::HashSet<u64> =
        existing.events.iter().map(|e| e.identity_hash()).collect();
    for event in &incoming.events {
        if !known.contains(&event.identity_hash()) {
            existing.events.push(event.clone());
        }
    }
    existing
        .events
        .sort_by_key(|e| (e.time_unix_nano, e.identity_hash()));
}

fn dedup_and_sort_events(record: &mut SpanRecord) {
    let mut seen = std::collections::HashSet::new();
    record.events.retain(|e| seen.insert(e.identity_hash()));
    record
        .events
        .sort_by_key(|e| (e.time_unix_nano, e.identity_hash()));
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::EventRecord;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn make_span(trace_id: &str, span_id: &str, start: u64, end: u64) -> SpanRecord {
        SpanRecord {
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            parent_span_id: None,
            name: "span".to_string(),
            start_time_unix_nano: start,
            end_time_unix_nano: end,
            status_code: 0,
            status_message: None,
            attributes: BTreeMap::new(),
            resource: BTreeMap::new(),
            conversation_id: None,
            agent: None,
            model: None,
            events: Vec::new(),
        }
    }

    fn make_root(trace_id: &str, span_id: &str, conv: &str, agent: &str, start: u64) -> SpanRecord {
        let mut span = make_span(trace_id, span_id, start, start + 1000);
        span.conversation_id = Some(conv.to_string());
        span.agent = Some(agent.to_string());
        span
    }

    fn cost_event(time: u64, amount: f64) -> EventRecord {
        let mut attributes = BTreeMap::new();
        attributes.insert("yuu.cost.category".to_string(), serde_json::json!("llm"));
        attributes.insert("yuu.cost.currency".to_string(), serde_json::json!("USD"));
        attributes.insert("yuu.cost.amount".to_string(), serde_json::json!(amount));
        EventRecord {
            name: "yuu.cost".to_string(),
            time_unix_nano: time,
            attributes,
        }
    }

    #[test]
    fn test_reingest_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = SpanStore::open(dir.path()).unwrap();

        let mut span = make_root("t1", "s1", "conv-1", "demo", 1000);
        span.events.push(cost_event(1100, 0.002));

        store.upsert_batch(vec![span.clone()]).unwrap();
        store.upsert_batch(vec![span]).unwrap();

        let stats = store.stats();
        assert_eq!(stats.spans, 1);
        assert_eq!(stats.events, 1);
        assert_eq!(stats.conversations, 1);
    }

    #[test]
    fn test_event_append_without_duplication() {
        let dir = TempDir::new().unwrap();
        let store = SpanStore::open(dir.path()).unwrap();

        let mut first = make_root("t1", "s1", "conv-1", "demo", 1000);
        first.events.push(cost_event(1100, 0.002));
        store.upsert_batch(vec![first.clone()]).unwrap();

        // Same span re-exported with its old event plus a new one.
        first.events.push(cost_event(1200, 0.003));
        store.upsert_batch(vec![first]).unwrap();

        let span = store.get_span("s1").unwrap();
        assert_eq!(span.events.len(), 2);
        assert_eq!(span.events[0].time_unix_nano, 1100);
        assert_eq!(span.events[1].time_unix_nano, 1200);
    }

    #[test]
    fn test_orphan_spans_are_retained() {
        let dir = TempDir::new().unwrap();
        let store = SpanStore::open(dir.path()).unwrap();

        let root = make_root("t1", "root", "conv-1", "demo", 1000);
        let mut orphan = make_span("t1", "orphan", 1500, 1600);
        orphan.parent_span_id = Some("never-arrives".to_string());

        store.upsert_batch(vec![root, orphan]).unwrap();

        let spans = store.get_conversation("conv-1").unwrap();
        assert_eq!(spans.len(), 2);
        assert!(spans.iter().any(|s| s.span_id == "orphan"));
    }

    #[test]
    fn test_span_moved_to_another_trace_leaves_old_conversation() {
        let dir = TempDir::new().unwrap();
        let store = SpanStore::open(dir.path()).unwrap();

        store
            .upsert_batch(vec![
                make_root("t1", "root", "conv-1", "demo", 1000),
                make_span("t1", "shared", 1500, 1600),
            ])
            .unwrap();

        // Same span id re-exported under a different trace clobbers the
        // record; the old trace must not keep serving the foreign span.
        store.upsert_batch(vec![make_span("t2", "shared", 1500, 1600)]).unwrap();

        let spans = store.get_conversation("conv-1").unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].span_id, "root");
    }

    #[test]
    fn test_listing_order_and_tie_break() {
        let dir = TempDir::new().unwrap();
        let store = SpanStore::open(dir.path()).unwrap();

        store
            .upsert_batch(vec![
                make_root("t1", "b", "conv-b", "demo", 2000),
                make_root("t2", "a", "conv-a", "demo", 2000),
                make_root("t3", "c", "conv-c", "demo", 1000),
            ])
            .unwrap();

        let (summaries, total) = store.list_conversations(10, 0, None);
        assert_eq!(total, 3);
        let ids: Vec<&str> = summaries.iter().map(|s| s.id.as_str()).collect();
        // Newest first; equal start times break by span id ascending.
        assert_eq!(ids, vec!["conv-a", "conv-b", "conv-c"]);
    }

    #[test]
    fn test_pagination_covers_all_without_duplicates() {
        let dir = TempDir::new().unwrap();
        let store = SpanStore::open(dir.path()).unwrap();

        let roots: Vec<SpanRecord> = (0..5)
            .map(|i| {
                make_root(
                    &format!("t{}", i),
                    &format!("s{}", i),
                    &format!("conv-{}", i),
                    "demo",
                    1000 * (i as u64 + 1),
                )
            })
            .collect();
        store.upsert_batch(roots).unwrap();

        let mut seen = Vec::new();
        for offset in [0, 2, 4] {
            let (page, total) = store.list_conversations(2, offset, None);
            assert_eq!(total, 5);
            seen.extend(page.into_iter().map(|s| s.id));
        }

        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn test_agent_filter() {
        let dir = TempDir::new().unwrap();
        let store = SpanStore::open(dir.path()).unwrap();

        store
            .upsert_batch(vec![
                make_root("t1", "s1", "conv-1", "alpha", 1000),
                make_root("t2", "s2", "conv-2", "beta", 2000),
            ])
            .unwrap();

        let (summaries, total) = store.list_conversations(10, 0, Some("alpha"));
        assert_eq!(total, 1);
        assert_eq!(summaries[0].agent, "alpha");
    }

    #[test]
    fn test_wal_replay_restores_store() {
        let dir = TempDir::new().unwrap();

        {
            let store = SpanStore::open(dir.path()).unwrap();
            let mut root = make_root("t1", "s1", "conv-1", "demo", 1000);
            root.events.push(cost_event(1100, 0.002));
            store
                .upsert_batch(vec![root, make_span("t1", "s2", 1200, 1300)])
                .unwrap();
        }

        let store = SpanStore::open(dir.path()).unwrap();
        let stats = store.stats();
        assert_eq!(stats.spans, 2);
        assert_eq!(stats.events, 1);

        let spans = store.get_conversation("conv-1").unwrap();
        assert_eq!(spans.len(), 2);
    }

    #[test]
    fn test_arrival_order_does_not_change_aggregation() {
        let mut child = make_span("t1", "tool", 1500, 1600);
        child.parent_span_id = Some("root".to_string());
        child.events.push(cost_event(1550, 0.004));
        let root = make_root("t1", "root", "conv-1", "demo", 1000);

        let dir_a = TempDir::new().unwrap();
        let store_a = SpanStore::open(dir_a.path()).unwrap();
        store_a.upsert_batch(vec![child.clone()]).unwrap();
        store_a.upsert_batch(vec![root.clone()]).unwrap();

        let dir_b = TempDir::new().unwrap();
        let store_b = SpanStore::open(dir_b.path()).unwrap();
        store_b.upsert_batch(vec![root]).unwrap();
        store_b.upsert_batch(vec![child]).unwrap();

        let rollup_a = crate::rollup::aggregate(&store_a.get_conversation("conv-1").unwrap());
        let rollup_b = crate::rollup::aggregate(&store_b.get_conversation("conv-1").unwrap());
        assert!((rollup_a.total_cost - rollup_b.total_cost).abs() < 1e-9);
        assert!((rollup_a.total_cost - 0.004).abs() < 1e-9);
    }
}
