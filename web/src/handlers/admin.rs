//! Operator endpoints for throttling a live sale.
//!
//! Read-then-write operations are serialized per event by the admission
//! service's named lock, so two operators cannot interleave.

use crate::WebResult;
use crate::extractors::JsonBody;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use ficket_core::{EventId, SlotUsage};
use ficket_runtime::StoreBackend;
use serde::{Deserialize, Serialize};

/// New capacity for an event.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCapacityRequest {
    /// Working slot cap, at least 1
    pub max_concurrent: u32,
}

/// Result of clearing an override.
#[derive(Debug, Serialize)]
pub struct ClearCapacityResponse {
    /// Whether an override existed
    pub cleared: bool,
}

/// Result of a forced slot release.
#[derive(Debug, Serialize)]
pub struct ForceReleaseResponse {
    /// Whether the counter was above zero
    pub released: bool,
}

/// Slot usage for an event.
///
/// # Errors
///
/// 400 for a malformed event id, 503 when the store is unreachable.
pub async fn slot_usage<B: StoreBackend>(
    State(state): State<AppState<B>>,
    Path(event_id): Path<String>,
) -> WebResult<Json<SlotUsage>> {
    let event = EventId::parse(event_id)?;
    Ok(Json(state.admission().slot_usage(&event).await?))
}

/// Override the working slot cap.
///
/// # Errors
///
/// 422 for a zero cap, 409 when another operator holds the event lock.
pub async fn set_capacity<B: StoreBackend>(
    State(state): State<AppState<B>>,
    Path(event_id): Path<String>,
    JsonBody(request): JsonBody<SetCapacityRequest>,
) -> WebResult<Json<SlotUsage>> {
    let event = EventId::parse(event_id)?;
    let usage = state.admission().set_max_concurrent(&event, request.max_concurrent).await?;
    Ok(Json(usage))
}

/// Fall back to the configured default cap.
///
/// # Errors
///
/// 409 when another operator holds the event lock.
pub async fn clear_capacity<B: StoreBackend>(
    State(state): State<AppState<B>>,
    Path(event_id): Path<String>,
) -> WebResult<Json<ClearCapacityResponse>> {
    let event = EventId::parse(event_id)?;
    let cleared = state.admission().clear_max_concurrent(&event).await?;
    Ok(Json(ClearCapacityResponse { cleared }))
}

/// Decrement the slot counter by one, for leaks an operator has confirmed.
///
/// # Errors
///
/// 409 when another operator holds the event lock.
pub async fn force_release<B: StoreBackend>(
    State(state): State<AppState<B>>,
    Path(event_id): Path<String>,
) -> WebResult<Json<ForceReleaseResponse>> {
    let event = EventId::parse(event_id)?;
    let released = state.admission().release_one_slot(&event).await?;
    Ok(Json(ForceReleaseResponse { released }))
}

/// Remove an event's counters after the sale.
///
/// # Errors
///
/// 409 while working slots are still held.
pub async fn close_event<B: StoreBackend>(
    State(state): State<AppState<B>>,
    Path(event_id): Path<String>,
) -> WebResult<StatusCode> {
    let event = EventId::parse(event_id)?;
    state.admission().close_event(&event).await?;
    Ok(StatusCode::NO_CONTENT)
}
