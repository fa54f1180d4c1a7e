//! ytrace: OTLP Trace Collector for LLM-Agent Workloads
//!
//! A single-node collector that accepts OTLP/HTTP JSON trace exports,
//! persists spans durably, and answers cost and usage questions about
//! agent conversations.
//!
//! # Features
//!
//! - **OTLP/HTTP Ingest**: Standard `/v1/traces` endpoint with per-span
//!   partial-failure semantics
//! - **Durable Storage**: Write-ahead log plus concurrent in-memory indexes;
//!   ingest is idempotent and crash-safe
//! - **Read-Time Rollups**: Cost, token and tool usage summed from delta
//!   events at query time, never precomputed
//! - **Query API**: Paginated conversation listing, conversation detail with
//!   full span tree, single-span lookup
//!
//! # Example
//!
//! ```no_run
//! use ytrace::store::SpanStore;
//! use ytrace::rollup;
//! use std::path::Path;
//!
//! let store = SpanStore::open(Path::new("./ytrace_data")).unwrap();
//! if let Some(spans) = store.get_conversation("conv-1") {
//!     let rollup = rollup::aggregate(&spans);
//!     println!("total cost: {} {:?}", rollup.total_cost, rollup.currency);
//! }
//! ```

pub mod api;
pub mod otel;
pub mod rollup;
pub mod store;

// Re-export commonly used types
pub use rollup::{aggregate, ConversationRollup};
pub use store::{SpanRecord, SpanStore, StoreError};
