//! Read-time aggregation over a conversation's delta events
//!
//! Pure and stateless: one pass over every event of every span, a typed
//! decode, then grouped summation. Nothing here depends on span arrival
//! order or on cross-span timestamp ordering, which is what makes the
//! write path free to accept batches in any interleaving.

use serde::Serialize;
use std::collections::BTreeMap;

use super::delta::{CostDelta, LlmUsageDelta, ToolUsageDelta};
use super::delta::{EVENT_COST, EVENT_LLM_USAGE, EVENT_TOOL_USAGE};
use crate::store::SpanRecord;

/// Cost and usage rollup for one conversation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationRollup {
    /// Sum of all cost delta amounts, assuming one consistent currency.
    pub total_cost: f64,
    /// The currency observed, when any cost delta decoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Set when cost deltas disagree on currency. Amounts are still summed
    /// as-is; no conversion is attempted.
    pub currency_mismatch: bool,
    pub cost_by_category: BTreeMap<String, f64>,
    pub cost_by_model: BTreeMap<String, f64>,
    pub llm_usage: Vec<LlmUsageRollup>,
    pub tool_usage: Vec<ToolUsageRollup>,
    /// Delta events whose attributes didn't match their expected shape.
    /// Excluded from the sums; the rollup stays best-effort.
    pub decode_warnings: usize,
}

/// Token usage summed per (provider, model).
#[derive(Debug, Clone, Serialize)]
pub struct LlmUsageRollup {
    pub provider: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub total_tokens: u64,
    pub requests: u64,
}

/// Tool usage summed per (name, unit).
#[derive(Debug, Clone, Serialize)]
pub struct ToolUsageRollup {
    pub name: String,
    pub unit: String,
    pub quantity: f64,
    pub calls: u64,
}

/// Aggregate a conversation's span set into its rollup.
///
/// O(total events in the conversation), computed at read time.
pub fn aggregate(spans: &[SpanRecord]) -> ConversationRollup {
    let mut rollup = ConversationRollup::default();
    let mut llm_usage: BTreeMap<(String, String), LlmUsageRollup> = BTreeMap::new();
    let mut tool_usage: BTreeMap<(String, String), ToolUsageRollup> = BTreeMap::new();

    for span in spans {
        for event in &span.events {
            match event.name.as_str() {
                EVENT_COST => match CostDelta::from_attributes(&event.attributes) {
                    Some(delta) => fold_cost(&mut rollup, delta),
                    None => rollup.decode_warnings += 1,
                },
                EVENT_LLM_USAGE => match LlmUsageDelta::from_attributes(&event.attributes) {
                    Some(delta) => fold_llm_usage(&mut llm_usage, delta),
                    None => rollup.decode_warnings += 1,
                },
                EVENT_TOOL_USAGE => match ToolUsageDelta::from_attributes(&event.attributes) {
                    Some(delta) => fold_tool_usage(&mut tool_usage, delta),
                    None => rollup.decode_warnings += 1,
                },
                _ => {}
            }
        }
    }

    rollup.llm_usage = llm_usage.into_values().collect();
    rollup.tool_usage = tool_usage.into_values().collect();
    rollup
}

fn fold_cost(rollup: &mut ConversationRollup, delta: CostDelta) {
    rollup.total_cost += delta.amount;

    match &rollup.currency {
        None => rollup.currency = Some(delta.currency.clone()),
        Some(currency) if currency != &delta.currency => rollup.currency_mismatch = true,
        Some(_) => {}
    }

    *rollup.cost_by_category.entry(delta.category).or_insert(0.0) += delta.amount;
    if let Some(model) = delta.llm_model {
        *rollup.cost_by_model.entry(model).or_insert(0.0) += delta.amount;
    }
}

fn fold_llm_usage(groups: &mut BTreeMap<(String, String), LlmUsageRollup>, delta: LlmUsageDelta) {
    let group = groups
        .entry((delta.provider.clone(), delta.model.clone()))
        .or_insert_with(|| LlmUsageRollup {
            provider: delta.provider.clone(),
            model: delta.model.clone(),
            input_tokens: 0,
            output_tokens: 0,
            cache_read_tokens: 0,
            cache_write_tokens: 0,
            total_tokens: 0,
            requests: 0,
        });

    group.input_tokens += delta.input_tokens;
    group.output_tokens += delta.output_tokens;
    group.cache_read_tokens += delta.cache_read_tokens;
    group.cache_write_tokens += delta.cache_write_tokens;
    // A delta that doesn't report its own total contributes input + output.
    group.total_tokens += delta
        .total_tokens
        .unwrap_or(delta.input_tokens + delta.output_tokens);
    group.requests += 1;
}

fn fold_tool_usage(groups: &mut BTreeMap<(String, String), ToolUsageRollup>, delta: ToolUsageDelta) {
    let group = groups
        .entry((delta.name.clone(), delta.unit.clone()))
        .or_insert_with(|| ToolUsageRollup {
            name: delta.name.clone(),
            unit: delta.unit.clone(),
            quantity: 0.0,
            calls: 0,
        });

    group.quantity += delta.quantity;
    group.calls += 1;
}
