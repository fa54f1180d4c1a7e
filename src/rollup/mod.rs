//! Cost and usage aggregation
//!
//! Rollups are derived, never stored: every read recomputes the sums from
//! the delta events on the conversation's spans. Correcting history is done
//! by appending compensating deltas (a negative `yuu.cost` amount), not by
//! editing stored events.

mod delta;
mod engine;

pub use delta::{
    CostDelta, LlmUsageDelta, ToolUsageDelta, EVENT_COST, EVENT_LLM_USAGE, EVENT_TOOL_USAGE,
};
pub use engine::{aggregate, ConversationRollup, LlmUsageRollup, ToolUsageRollup};
