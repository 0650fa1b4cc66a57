//! Seat lease endpoints.
//!
//! Locking is all-or-nothing: either every requested seat is leased to the
//! caller, or the request is rejected with 409 naming the contested seat and
//! nothing is written.

use crate::WebResult;
use crate::error::AppError;
use crate::extractors::{JsonBody, UserIdentity};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use ficket_core::{EventScheduleId, PreoccupyOutcome, ReleaseReport, SeatLease, SeatMappingId, SeatRequest};
use ficket_runtime::StoreBackend;
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to lease seats.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockSeatsRequest {
    /// Performance the seats belong to
    pub event_schedule_id: EventScheduleId,
    /// Seats to lease
    pub seats: Vec<SeatRequest>,
    /// Caller's reservation limit; capped by configuration
    #[serde(default)]
    pub reservation_limit: Option<u32>,
}

/// Leases granted.
#[derive(Debug, Serialize)]
pub struct LockSeatsResponse {
    /// One lease per distinct requested seat
    pub leases: Vec<SeatLease>,
}

/// Request to give seats back.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockSeatsRequest {
    /// Performance the seats belong to
    pub event_schedule_id: EventScheduleId,
    /// Seats to release
    pub seat_mapping_ids: Vec<SeatMappingId>,
}

/// The caller's current selection.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionResponse {
    /// Leased seat ids
    pub seat_mapping_ids: Vec<SeatMappingId>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Lease a batch of seats.
///
/// # Errors
///
/// - 409 when any seat is held by someone else
/// - 422 for an empty batch, too many seats, or an existing selection
/// - 503 when the store is unreachable
pub async fn lock_seats<B: StoreBackend>(
    State(state): State<AppState<B>>,
    UserIdentity(user): UserIdentity,
    JsonBody(request): JsonBody<LockSeatsRequest>,
) -> WebResult<Json<LockSeatsResponse>> {
    let limit = request
        .reservation_limit
        .unwrap_or_else(|| state.seats().config().max_seats_per_selection);

    let outcome = state
        .seats()
        .preoccupy_seats(&request.event_schedule_id, &user, request.seats, limit)
        .await?;

    match outcome {
        PreoccupyOutcome::Locked(leases) => Ok(Json(LockSeatsResponse { leases })),
        PreoccupyOutcome::Conflict { seat } => Err(AppError::conflict(
            "SEAT_ALREADY_LOCKED",
            format!("Seat {seat} is held by another user"),
        )),
    }
}

/// Release seats the caller holds. Seats held by others are left alone and
/// turn the response into 409; the report is returned either way.
///
/// # Errors
///
/// 422 for an empty list, 503 when the store is unreachable.
pub async fn unlock_seats<B: StoreBackend>(
    State(state): State<AppState<B>>,
    UserIdentity(user): UserIdentity,
    JsonBody(request): JsonBody<UnlockSeatsRequest>,
) -> WebResult<(StatusCode, Json<ReleaseReport>)> {
    let report = state
        .seats()
        .release_seats(&request.event_schedule_id, request.seat_mapping_ids, &user)
        .await?;

    let status = if report.has_conflicts() { StatusCode::CONFLICT } else { StatusCode::OK };
    Ok((status, Json(report)))
}

/// Seats the caller currently holds for a schedule.
///
/// # Errors
///
/// 400 for a malformed schedule id, 503 when the store is unreachable.
pub async fn my_seats<B: StoreBackend>(
    State(state): State<AppState<B>>,
    Path(schedule_id): Path<String>,
    UserIdentity(user): UserIdentity,
) -> WebResult<Json<SelectionResponse>> {
    let schedule = EventScheduleId::parse(schedule_id)?;
    let seat_mapping_ids = state.seats().selected_seats(&schedule, &user).await?;
    Ok(Json(SelectionResponse { seat_mapping_ids }))
}

/// Current holder of a seat.
///
/// # Errors
///
/// 404 when the seat is free, 400 for malformed ids.
pub async fn get_lease<B: StoreBackend>(
    State(state): State<AppState<B>>,
    Path((schedule_id, seat_id)): Path<(String, String)>,
) -> WebResult<Json<SeatLease>> {
    let schedule = EventScheduleId::parse(schedule_id)?;
    let seat = SeatMappingId::parse(seat_id)?;

    state
        .seats()
        .lease(&schedule, &seat)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Seat lease", &seat))
}

/// Take over a lease for payment. Only one caller gets it.
///
/// # Errors
///
/// 404 when the seat is not leased, 400 for malformed ids.
pub async fn consume_lease<B: StoreBackend>(
    State(state): State<AppState<B>>,
    Path((schedule_id, seat_id)): Path<(String, String)>,
) -> WebResult<Json<SeatLease>> {
    let schedule = EventScheduleId::parse(schedule_id)?;
    let seat = SeatMappingId::parse(seat_id)?;

    state
        .seats()
        .consume(&schedule, &seat)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Seat lease", &seat))
}
