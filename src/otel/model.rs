//! OTLP/HTTP-JSON wire structures
//!
//! Mirrors the `ExportTraceServiceRequest` shape that OTLP exporters send
//! over HTTP in JSON encoding. Attribute values arrive as tagged objects
//! (`{"stringValue": "..."}` etc.) and are decoded into plain JSON values
//! for opaque storage; typed interpretation of `yuu.*` keys happens at
//! aggregation time, not here.

use serde::Deserialize;
use std::collections::BTreeMap;

/// Span attributes on conversation roots that the store denormalizes.
pub const ATTR_CONVERSATION_ID: &str = "yuu.conversation.id";
pub const ATTR_AGENT: &str = "yuu.agent";
pub const ATTR_CONVERSATION_MODEL: &str = "yuu.conversation.model";
pub const ATTR_CONVERSATION_TAGS: &str = "yuu.conversation.tags";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTraceServiceRequest {
    #[serde(default)]
    pub resource_spans: Vec<ResourceSpans>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpans {
    pub resource: Option<Resource>,
    #[serde(default)]
    pub scope_spans: Vec<ScopeSpans>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub attributes: Option<Vec<KeyValue>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeSpans {
    pub scope: Option<InstrumentationScope>,
    #[serde(default)]
    pub spans: Vec<Span>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentationScope {
    pub name: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub span_id: String,
    pub parent_span_id: Option<String>,
    #[serde(default)]
    pub name: String,
    pub start_time_unix_nano: Option<String>,
    pub end_time_unix_nano: Option<String>,
    pub attributes: Option<Vec<KeyValue>>,
    pub events: Option<Vec<Event>>,
    pub status: Option<Status>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub name: String,
    pub time_unix_nano: Option<String>,
    pub attributes: Option<Vec<KeyValue>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub code: Option<i32>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValue {
    pub key: String,
    pub value: Option<AnyValue>,
}

/// OTLP JSON encodes attribute values as a one-of object. Integers are
/// transmitted as decimal strings per the proto3 JSON mapping.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyValue {
    pub string_value: Option<String>,
    pub int_value: Option<String>,
    pub double_value: Option<f64>,
    pub bool_value: Option<bool>,
    pub array_value: Option<ArrayValue>,
    pub kvlist_value: Option<KeyValueList>,
    pub bytes_value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<AnyValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValueList {
    #[serde(default)]
    pub values: Vec<KeyValue>,
}

impl AnyValue {
    /// Extract the typed value as plain JSON.
    pub fn to_json(&self) -> serde_json::Value {
        if let Some(s) = &self.string_value {
            return serde_json::Value::String(s.clone());
        }
        if let Some(i) = &self.int_value {
            if let Ok(parsed) = i.parse::<i64>() {
                return serde_json::json!(parsed);
            }
            return serde_json::Value::String(i.clone());
        }
        if let Some(d) = self.double_value {
            return serde_json::json!(d);
        }
        if let Some(b) = self.bool_value {
            return serde_json::Value::Bool(b);
        }
        if let Some(arr) = &self.array_value {
            return serde_json::Value::Array(arr.values.iter().map(AnyValue::to_json).collect());
        }
        if let Some(kvs) = &self.kvlist_value {
            let map: serde_json::Map<String, serde_json::Value> = kvs
                .values
                .iter()
                .map(|kv| {
                    let value = kv
                        .value
                        .as_ref()
                        .map(AnyValue::to_json)
                        .unwrap_or(serde_json::Value::Null);
                    (kv.key.clone(), value)
                })
                .collect();
            return serde_json::Value::Object(map);
        }
        if let Some(bytes) = &self.bytes_value {
            return serde_json::Value::String(bytes.clone());
        }
        serde_json::Value::Null
    }
}

/// Convert an OTLP attribute list into a flat key -> JSON value map.
pub fn parse_attributes(attrs: Option<&Vec<KeyValue>>) -> BTreeMap<String, serde_json::Value> {
    let mut map = BTreeMap::new();
    if let Some(attrs) = attrs {
        for kv in attrs {
            let value = kv
                .value
                .as_ref()
                .map(AnyValue::to_json)
                .unwrap_or(serde_json::Value::Null);
            map.insert(kv.key.clone(), value);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_otlp_request() {
        let json = r#"{
            "resourceSpans": [{
                "resource": {
                    "attributes": [{
                        "key": "service.name",
                        "value": {"stringValue": "weather-agent"}
                    }]
                },
                "scopeSpans": [{
                    "scope": {"name": "yuutrace", "version": "0.1"},
                    "spans": [{
                        "traceId": "5b8aa5a2d2c872e8321cf37308d69df2",
                        "spanId": "051581bf3cb55c13",
                        "name": "conversation",
                        "startTimeUnixNano": "1544712660000000000",
                        "endTimeUnixNano": "1544712661000000000",
                        "status": {"code": 1},
                        "events": [{
                            "name": "yuu.cost",
                            "timeUnixNano": "1544712660500000000",
                            "attributes": [{
                                "key": "yuu.cost.amount",
                                "value": {"doubleValue": 0.002}
                            }]
                        }]
                    }]
                }]
            }]
        }"#;

        let request: ExportTraceServiceRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.resource_spans.len(), 1);

        let span = &request.resource_spans[0].scope_spans[0].spans[0];
        assert_eq!(span.name, "conversation");
        let events = span.events.as_ref().unwrap();
        assert_eq!(events[0].name, "yuu.cost");

        let attrs = parse_attributes(events[0].attributes.as_ref());
        assert_eq!(attrs.get("yuu.cost.amount"), Some(&serde_json::json!(0.002)));
    }

    #[test]
    fn test_attribute_value_decoding() {
        let json = r#"[
            {"key": "s", "value": {"stringValue": "hello"}},
            {"key": "i", "value": {"intValue": "42"}},
            {"key": "d", "value": {"doubleValue": 3.5}},
            {"key": "b", "value": {"boolValue": true}},
            {"key": "arr", "value": {"arrayValue": {"values": [
                {"stringValue": "a"}, {"intValue": "1"}
            ]}}},
            {"key": "kv", "value": {"kvlistValue": {"values": [
                {"key": "nested", "value": {"boolValue": false}}
            ]}}}
        ]"#;

        let kvs: Vec<KeyValue> = serde_json::from_str(json).unwrap();
        let attrs = parse_attributes(Some(&kvs));

        assert_eq!(attrs.get("s"), Some(&serde_json::json!("hello")));
        assert_eq!(attrs.get("i"), Some(&serde_json::json!(42)));
        assert_eq!(attrs.get("d"), Some(&serde_json::json!(3.5)));
        assert_eq!(attrs.get("b"), Some(&serde_json::json!(true)));
        assert_eq!(attrs.get("arr"), Some(&serde_json::json!(["a", 1])));
        assert_eq!(attrs.get("kv"), Some(&serde_json::json!({"nested": false})));
    }

    #[test]
    fn test_unparseable_int_kept_as_string() {
        let value = AnyValue {
            string_value: None,
            int_value: Some("not-a-number".to_string()),
            double_value: None,
            bool_value: None,
            array_value: None,
            kvlist_value: None,
            bytes_value: None,
        };
        assert_eq!(value.to_json(), serde_json::json!("not-a-number"));
    }
}
