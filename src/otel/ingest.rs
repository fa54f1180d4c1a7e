//! OTLP ingest handler
//!
//! Endpoint: POST /v1/traces. Validation is per span; a malformed span is
//! rejected individually and never blocks its well-formed siblings. Every
//! accepted span of the request is committed through one atomic store
//! batch.

use axum::{extract::State, Json};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::model::{
    parse_attributes, Event, ExportTraceServiceRequest, Span, ATTR_AGENT, ATTR_CONVERSATION_ID,
    ATTR_CONVERSATION_MODEL,
};
use crate::api::handlers::{ApiError, AppState};
use crate::store::{EventRecord, SpanRecord};

/// Handle OTLP/HTTP trace export (JSON format).
pub async fn handle_otlp_traces(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExportTraceServiceRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut accepted = Vec::new();
    let mut rejections = Vec::new();

    for resource_spans in &payload.resource_spans {
        let resource = parse_attributes(
            resource_spans
                .resource
                .as_ref()
                .and_then(|r| r.attributes.as_ref()),
        );

        for scope_spans in &resource_spans.scope_spans {
            for span in &scope_spans.spans {
                match span_to_record(span, &resource) {
                    Ok(record) => accepted.push(record),
                    Err(reason) => rejections.push(reason),
                }
            }
        }
    }

    let inserted = state
        .store
        .upsert_batch(accepted)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if rejections.is_empty() {
        tracing::debug!("Ingested {} spans", inserted);
        Ok(Json(serde_json::json!({ "partialSuccess": {} })))
    } else {
        tracing::warn!(
            "OTLP ingest rejected {} of {} spans: {}",
            rejections.len(),
            inserted + rejections.len(),
            rejections[0]
        );
        // OTLP semantics: HTTP 200 with partialSuccess on item-level errors.
        Ok(Json(serde_json::json!({
            "partialSuccess": {
                "rejectedSpans": rejections.len(),
                "errorMessage": rejections[0]
            }
        })))
    }
}

/// Validate one wire span and shape it for storage.
fn span_to_record(
    span: &Span,
    resource: &BTreeMap<String, serde_json::Value>,
) -> Result<SpanRecord, String> {
    if span.trace_id.is_empty() {
        return Err("span is missing trace_id".to_string());
    }
    if span.span_id.is_empty() {
        return Err(format!("span in trace {} is missing span_id", span.trace_id));
    }
    if span.name.is_empty() {
        return Err(format!("span {} is missing name", span.span_id));
    }

    let start_time_unix_nano = parse_nanos(span.start_time_unix_nano.as_deref())
        .ok_or_else(|| format!("span {} has invalid start_time_unix_nano", span.span_id))?;
    let end_time_unix_nano = parse_nanos(span.end_time_unix_nano.as_deref())
        .ok_or_else(|| format!("span {} has invalid end_time_unix_nano", span.span_id))?;
    if end_time_unix_nano < start_time_unix_nano {
        return Err(format!("span {} ends before it starts", span.span_id));
    }

    let attributes = parse_attributes(span.attributes.as_ref());
    let conversation_id = attr_string(&attributes, ATTR_CONVERSATION_ID);
    let agent = attr_string(&attributes, ATTR_AGENT);
    let model = attr_string(&attributes, ATTR_CONVERSATION_MODEL);

    let events = span
        .events
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .map(event_to_record)
        .collect();

    Ok(SpanRecord {
        trace_id: span.trace_id.clone(),
        span_id: span.span_id.clone(),
        parent_span_id: span.parent_span_id.clone().filter(|p| !p.is_empty()),
        name: span.name.clone(),
        start_time_unix_nano,
        end_time_unix_nano,
        status_code: span.status.as_ref().and_then(|s| s.code).unwrap_or(0),
        status_message: span.status.as_ref().and_then(|s| s.message.clone()),
        attributes,
        resource: resource.clone(),
        conversation_id,
        agent,
        model,
        events,
    })
}

fn event_to_record(event: &Event) -> EventRecord {
    EventRecord {
        name: event.name.clone(),
        time_unix_nano: parse_nanos(event.time_unix_nano.as_deref()).unwrap_or(0),
        attributes: parse_attributes(event.attributes.as_ref()),
    }
}

fn parse_nanos(value: Option<&str>) -> Option<u64> {
    value?.parse::<u64>().ok()
}

fn attr_string(attrs: &BTreeMap<String, serde_json::Value>, key: &str) -> Option<String> {
    attrs.get(key)?.as_str().map(|s| s.to_string())
}
