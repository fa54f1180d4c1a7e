use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::rollup::{self, ConversationRollup};
use crate::store::{ConversationSummary, SpanRecord, SpanStore, StoreStats};

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 500;

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<SpanStore>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Conversation Listing
// ============================================================================

#[derive(Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub agent: Option<String>,
}

#[derive(Serialize)]
pub struct ListConversationsResponse {
    pub conversations: Vec<ConversationSummary>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Json<ListConversationsResponse> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0);

    let (conversations, total) =
        state
            .store
            .list_conversations(limit, offset, params.agent.as_deref());

    Json(ListConversationsResponse {
        conversations,
        total,
        limit,
        offset,
    })
}

// ============================================================================
// Conversation Detail
// ============================================================================

#[derive(Serialize)]
pub struct ConversationDetailResponse {
    pub id: String,
    pub agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<serde_json::Value>,
    pub start_time: u64,
    pub end_time: u64,
    pub span_count: usize,
    pub total_cost: f64,
    pub rollup: ConversationRollup,
    pub spans: Vec<SpanRecord>,
}

pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ConversationDetailResponse>, ApiError> {
    let spans = state
        .store
        .get_conversation(&id)
        .ok_or_else(|| ApiError::NotFound(format!("Conversation '{}' not found", id)))?;

    let rollup = rollup::aggregate(&spans);
    let root = spans
        .iter()
        .find(|s| s.conversation_id.as_deref() == Some(id.as_str()))
        .ok_or_else(|| ApiError::NotFound(format!("Conversation '{}' not found", id)))?;

    let start_time = spans
        .iter()
        .map(|s| s.start_time_unix_nano)
        .min()
        .unwrap_or(0);
    let end_time = spans.iter().map(|s| s.end_time_unix_nano).max().unwrap_or(0);

    Ok(Json(ConversationDetailResponse {
        id,
        agent: root.agent.clone().unwrap_or_default(),
        model: root.model.clone(),
        tags: root.tags().cloned(),
        start_time,
        end_time,
        span_count: spans.len(),
        total_cost: rollup.total_cost,
        rollup,
        spans,
    }))
}

// ============================================================================
// Span Detail
// ============================================================================

pub async fn get_span(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SpanRecord>, ApiError> {
    let span = state
        .store
        .get_span(&id)
        .ok_or_else(|| ApiError::NotFound(format!("Span '{}' not found", id)))?;

    Ok(Json(span))
}

// ============================================================================
// Stats
// ============================================================================

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StoreStats> {
    Json(state.store.stats())
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
