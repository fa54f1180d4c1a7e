//! Typed delta records carried by span events
//!
//! The wire contract: producers attach `yuu.cost`, `yuu.llm.usage` and
//! `yuu.tool.usage` events to spans, each carrying flat `yuu.*` attribute
//! keys. Deltas are immutable increments; they are summed at read time,
//! never overwritten. Decoding is lenient: missing optional fields default,
//! and only an unusable load-bearing field (amount, provider+model, tool
//! name) disqualifies a delta.

use std::collections::BTreeMap;

// Event names.
pub const EVENT_COST: &str = "yuu.cost";
pub const EVENT_LLM_USAGE: &str = "yuu.llm.usage";
pub const EVENT_TOOL_USAGE: &str = "yuu.tool.usage";

// yuu.cost attributes.
pub const ATTR_COST_CATEGORY: &str = "yuu.cost.category";
pub const ATTR_COST_CURRENCY: &str = "yuu.cost.currency";
pub const ATTR_COST_AMOUNT: &str = "yuu.cost.amount";
pub const ATTR_COST_SOURCE: &str = "yuu.cost.source";
pub const ATTR_COST_PRICING_ID: &str = "yuu.cost.pricing_id";

// yuu.llm attributes, shared across cost and usage events.
pub const ATTR_LLM_PROVIDER: &str = "yuu.llm.provider";
pub const ATTR_LLM_MODEL: &str = "yuu.llm.model";
pub const ATTR_LLM_REQUEST_ID: &str = "yuu.llm.request_id";

// yuu.llm.usage attributes.
pub const ATTR_LLM_USAGE_INPUT_TOKENS: &str = "yuu.llm.usage.input_tokens";
pub const ATTR_LLM_USAGE_OUTPUT_TOKENS: &str = "yuu.llm.usage.output_tokens";
pub const ATTR_LLM_USAGE_CACHE_READ_TOKENS: &str = "yuu.llm.usage.cache_read_tokens";
pub const ATTR_LLM_USAGE_CACHE_WRITE_TOKENS: &str = "yuu.llm.usage.cache_write_tokens";
pub const ATTR_LLM_USAGE_TOTAL_TOKENS: &str = "yuu.llm.usage.total_tokens";

// yuu.tool attributes, shared across cost and usage events.
pub const ATTR_TOOL_NAME: &str = "yuu.tool.name";
pub const ATTR_TOOL_CALL_ID: &str = "yuu.tool.call_id";

// yuu.tool.usage attributes.
pub const ATTR_TOOL_USAGE_UNIT: &str = "yuu.tool.usage.unit";
pub const ATTR_TOOL_USAGE_QUANTITY: &str = "yuu.tool.usage.quantity";

type Attributes = BTreeMap<String, serde_json::Value>;

/// An incremental cost event. The same span may carry several.
#[derive(Debug, Clone, PartialEq)]
pub struct CostDelta {
    pub category: String,
    pub currency: String,
    pub amount: f64,
    pub source: Option<String>,
    pub pricing_id: Option<String>,
    pub llm_provider: Option<String>,
    pub llm_model: Option<String>,
    pub llm_request_id: Option<String>,
    pub tool_name: Option<String>,
    pub tool_call_id: Option<String>,
}

/// An incremental LLM token usage event. Token counts are per-request
/// deltas, never cross-request accumulations.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmUsageDelta {
    pub provider: String,
    pub model: String,
    pub request_id: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub total_tokens: Option<u64>,
}

/// An incremental tool usage event, recorded only for tools with a
/// meaningful usage metric (bytes, seconds, request count).
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUsageDelta {
    pub name: String,
    pub call_id: Option<String>,
    pub unit: String,
    pub quantity: f64,
}

impl CostDelta {
    /// Decode from event attributes. `None` when the amount is missing or
    /// non-numeric; everything else defaults.
    pub fn from_attributes(attrs: &Attributes) -> Option<Self> {
        let amount = attr_f64(attrs, ATTR_COST_AMOUNT)?;
        Some(Self {
            category: attr_str(attrs, ATTR_COST_CATEGORY).unwrap_or_else(|| "other".to_string()),
            // USD is the only currency producers emit today.
            currency: attr_str(attrs, ATTR_COST_CURRENCY).unwrap_or_else(|| "USD".to_string()),
            amount,
            source: attr_str(attrs, ATTR_COST_SOURCE),
            pricing_id: attr_str(attrs, ATTR_COST_PRICING_ID),
            llm_provider: attr_str(attrs, ATTR_LLM_PROVIDER),
            llm_model: attr_str(attrs, ATTR_LLM_MODEL),
            llm_request_id: attr_str(attrs, ATTR_LLM_REQUEST_ID),
            tool_name: attr_str(attrs, ATTR_TOOL_NAME),
            tool_call_id: attr_str(attrs, ATTR_TOOL_CALL_ID),
        })
    }
}

impl LlmUsageDelta {
    /// Decode from event attributes. `None` when provider or model is
    /// missing; token counters default to zero.
    pub fn from_attributes(attrs: &Attributes) -> Option<Self> {
        let provider = attr_str(attrs, ATTR_LLM_PROVIDER)?;
        let model = attr_str(attrs, ATTR_LLM_MODEL)?;
        Some(Self {
            provider,
            model,
            request_id: attr_str(attrs, ATTR_LLM_REQUEST_ID),
            input_tokens: attr_u64(attrs, ATTR_LLM_USAGE_INPUT_TOKENS).unwrap_or(0),
            output_tokens: attr_u64(attrs, ATTR_LLM_USAGE_OUTPUT_TOKENS).unwrap_or(0),
            cache_read_tokens: attr_u64(attrs, ATTR_LLM_USAGE_CACHE_READ_TOKENS).unwrap_or(0),
            cache_write_tokens: attr_u64(attrs, ATTR_LLM_USAGE_CACHE_WRITE_TOKENS).unwrap_or(0),
            total_tokens: attr_u64(attrs, ATTR_LLM_USAGE_TOTAL_TOKENS),
        })
    }
}

impl ToolUsageDelta {
    /// Decode from event attributes. `None` when the tool name is missing.
    pub fn from_attributes(attrs: &Attributes) -> Option<Self> {
        let name = attr_str(attrs, ATTR_TOOL_NAME)?;
        Some(Self {
            name,
            call_id: attr_str(attrs, ATTR_TOOL_CALL_ID),
            unit: attr_str(attrs, ATTR_TOOL_USAGE_UNIT).unwrap_or_default(),
            quantity: attr_f64(attrs, ATTR_TOOL_USAGE_QUANTITY).unwrap_or(0.0),
        })
    }
}

fn attr_str(attrs: &Attributes, key: &str) -> Option<String> {
    attrs.get(key)?.as_str().map(|s| s.to_string())
}

fn attr_f64(attrs: &Attributes, key: &str) -> Option<f64> {
    attrs.get(key)?.as_f64()
}

fn attr_u64(attrs: &Attributes, key: &str) -> Option<u64> {
    attrs.get(key)?.as_u64()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, serde_json::Value)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_cost_delta_decode() {
        let attrs = attrs(&[
            (ATTR_COST_CATEGORY, serde_json::json!("llm")),
            (ATTR_COST_CURRENCY, serde_json::json!("USD")),
            (ATTR_COST_AMOUNT, serde_json::json!(0.002)),
            (ATTR_LLM_MODEL, serde_json::json!("gpt-4o")),
        ]);

        let delta = CostDelta::from_attributes(&attrs).unwrap();
        assert_eq!(delta.category, "llm");
        assert_eq!(delta.currency, "USD");
        assert!((delta.amount - 0.002).abs() < 1e-12);
        assert_eq!(delta.llm_model.as_deref(), Some("gpt-4o"));
        assert_eq!(delta.tool_name, None);
    }

    #[test]
    fn test_cost_delta_missing_amount_rejected() {
        let missing = attrs(&[(ATTR_COST_CATEGORY, serde_json::json!("llm"))]);
        assert!(CostDelta::from_attributes(&missing).is_none());

        let malformed = attrs(&[(ATTR_COST_AMOUNT, serde_json::json!("not-a-number"))]);
        assert!(CostDelta::from_attributes(&malformed).is_none());
    }

    #[test]
    fn test_llm_usage_decode_defaults() {
        let attrs = attrs(&[
            (ATTR_LLM_PROVIDER, serde_json::json!("anthropic")),
            (ATTR_LLM_MODEL, serde_json::json!("claude-sonnet")),
            (ATTR_LLM_USAGE_INPUT_TOKENS, serde_json::json!(120)),
        ]);

        let delta = LlmUsageDelta::from_attributes(&attrs).unwrap();
        assert_eq!(delta.input_tokens, 120);
        assert_eq!(delta.output_tokens, 0);
        assert_eq!(delta.total_tokens, None);
    }

    #[test]
    fn test_llm_usage_requires_provider_and_model() {
        let attrs = attrs(&[(ATTR_LLM_USAGE_INPUT_TOKENS, serde_json::json!(5))]);
        assert!(LlmUsageDelta::from_attributes(&attrs).is_none());
    }

    #[test]
    fn test_tool_usage_decode() {
        let attrs = attrs(&[
            (ATTR_TOOL_NAME, serde_json::json!("web_search")),
            (ATTR_TOOL_USAGE_UNIT, serde_json::json!("requests")),
            (ATTR_TOOL_USAGE_QUANTITY, serde_json::json!(3.0)),
        ]);

        let delta = ToolUsageDelta::from_attributes(&attrs).unwrap();
        assert_eq!(delta.name, "web_search");
        assert_eq!(delta.unit, "requests");
        assert!((delta.quantity - 3.0).abs() < 1e-12);
    }
}
