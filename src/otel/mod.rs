//! OTLP trace ingestion
//!
//! Accepts the standard OTLP/HTTP JSON export format on `/v1/traces`:
//!
//! ```bash
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4318
//! OTEL_EXPORTER_OTLP_PROTOCOL=http/json
//! ```
//!
//! Conversation identity rides on span attributes: a root span carries
//! `yuu.conversation.id` (plus optional `yuu.agent`, `yuu.conversation.model`
//! and `yuu.conversation.tags`), and every span sharing its trace id belongs
//! to that conversation.

mod ingest;
mod model;

pub use ingest::handle_otlp_traces;
pub use model::{
    parse_attributes, AnyValue, Event, ExportTraceServiceRequest, KeyValue, ResourceSpans,
    ScopeSpans, Span, Status, ATTR_AGENT, ATTR_CONVERSATION_ID, ATTR_CONVERSATION_MODEL,
    ATTR_CONVERSATION_TAGS,
};
