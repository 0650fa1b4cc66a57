//! Waiting queue and working slot endpoints.
//!
//! - `POST   /api/v1/queue/:event_id/enter` joins the waiting queue
//! - `DELETE /api/v1/queue/:event_id` leaves it
//! - `GET    /api/v1/queue/:event_id/status` reports rank and admission
//! - `POST   /api/v1/queue/:event_id/ticketing` asks for a working slot
//! - `DELETE /api/v1/queue/:event_id/ticketing` gives the slot back
//! - `POST   /api/v1/queue/:event_id/keep-alive` cancels a pending disconnect release
//!
//! A denied admission is a normal `200 {"admitted": false}`; clients retry on
//! their polling cadence. Only queued users near the front are admitted.

use crate::WebResult;
use crate::extractors::UserIdentity;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use ficket_core::{EventId, QueueStatus};
use ficket_runtime::{ChannelKey, StoreBackend};
use serde::Serialize;

// ============================================================================
// Response Types
// ============================================================================

/// Response to joining the queue.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterQueueResponse {
    /// Sequence number; stable until the user leaves
    pub sequence_number: u64,
}

/// Response to leaving the queue.
#[derive(Debug, Serialize)]
pub struct LeaveQueueResponse {
    /// Whether the user was waiting
    pub removed: bool,
}

/// Response to an admission attempt.
#[derive(Debug, Serialize)]
pub struct TicketingResponse {
    /// Whether the user now holds a working slot
    pub admitted: bool,
}

/// Response to giving back a working slot.
#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    /// Whether a slot was held
    pub released: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Join the waiting queue. Idempotent while waiting.
///
/// # Errors
///
/// 400 for a malformed event id, 503 when the store is unreachable.
pub async fn enter_queue<B: StoreBackend>(
    State(state): State<AppState<B>>,
    Path(event_id): Path<String>,
    UserIdentity(user): UserIdentity,
) -> WebResult<Json<EnterQueueResponse>> {
    let event = EventId::parse(event_id)?;
    let sequence_number = state.admission().enter_queue(&event, &user).await?;
    Ok(Json(EnterQueueResponse { sequence_number }))
}

/// Leave the waiting queue.
///
/// # Errors
///
/// 400 for a malformed event id, 503 when the store is unreachable.
pub async fn leave_queue<B: StoreBackend>(
    State(state): State<AppState<B>>,
    Path(event_id): Path<String>,
    UserIdentity(user): UserIdentity,
) -> WebResult<Json<LeaveQueueResponse>> {
    let event = EventId::parse(event_id)?;
    let removed = state.admission().leave_queue(&event, &user).await?;
    Ok(Json(LeaveQueueResponse { removed }))
}

/// Current rank snapshot.
///
/// # Errors
///
/// 400 for a malformed event id, 503 when the store is unreachable.
pub async fn queue_status<B: StoreBackend>(
    State(state): State<AppState<B>>,
    Path(event_id): Path<String>,
    UserIdentity(user): UserIdentity,
) -> WebResult<Json<QueueStatus>> {
    let event = EventId::parse(event_id)?;
    Ok(Json(state.admission().queue_status(&event, &user).await?))
}

/// Ask for a working slot.
///
/// Granted to the head of the queue (within the promotion threshold) and
/// idempotently to a user who already holds a slot. Anyone else is denied.
///
/// # Errors
///
/// 400 for a malformed event id, 503 when the store is unreachable. A full
/// pool is not an error.
pub async fn enter_ticketing<B: StoreBackend>(
    State(state): State<AppState<B>>,
    Path(event_id): Path<String>,
    UserIdentity(user): UserIdentity,
) -> WebResult<Json<TicketingResponse>> {
    let event = EventId::parse(event_id)?;
    let admission = state.admission().request_ticketing(&event, &user).await?;
    Ok(Json(TicketingResponse { admitted: admission.is_granted() }))
}

/// Give back the working slot.
///
/// # Errors
///
/// 400 for a malformed event id, 503 when the store is unreachable.
pub async fn leave_ticketing<B: StoreBackend>(
    State(state): State<AppState<B>>,
    Path(event_id): Path<String>,
    UserIdentity(user): UserIdentity,
) -> WebResult<Json<ReleaseResponse>> {
    let event = EventId::parse(event_id)?;
    let released = state.admission().leave_ticketing(&event, &user).await?;
    Ok(Json(ReleaseResponse { released }))
}

/// Keep-alive from a client whose socket dropped.
///
/// # Errors
///
/// 400 for a malformed event id.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn keep_alive<B: StoreBackend>(
    State(state): State<AppState<B>>,
    Path(event_id): Path<String>,
    UserIdentity(user): UserIdentity,
) -> WebResult<StatusCode> {
    let event = EventId::parse(event_id)?;
    let grace = state.grace();
    let queue = grace.cancel(&user, &ChannelKey::Queue(event.clone()));
    let work = grace.cancel(&user, &ChannelKey::Work(event.clone()));
    if queue || work {
        tracing::debug!(event_id = %event, user_id = %user, "Keep-alive cancelled disconnect release");
    }
    Ok(StatusCode::NO_CONTENT)
}
