//! Durable span storage
//!
//! A write-ahead log on disk plus concurrent in-memory indexes. Spans are
//! upserted idempotently; events are append-only facts deduplicated by
//! content identity.

mod engine;
mod model;
mod wal;

pub use engine::{ConversationSummary, SpanStore, StoreError, StoreStats};
pub use model::{EventRecord, SpanRecord};
pub use wal::{Wal, WalBatch, WalError};
