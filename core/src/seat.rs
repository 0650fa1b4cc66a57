//! Seat lease data model.

use crate::ids::{EventScheduleId, SeatMappingId, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One seat in a preoccupy request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatRequest {
    /// Seat to lease.
    pub seat_mapping_id: SeatMappingId,
    /// Price tier, stored with the lease for the payment flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat_grade: Option<String>,
    /// Price, stored with the lease for the payment flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat_price: Option<u64>,
}

impl SeatRequest {
    /// A request without pricing details.
    #[must_use]
    pub const fn new(seat_mapping_id: SeatMappingId) -> Self {
        Self { seat_mapping_id, seat_grade: None, seat_price: None }
    }
}

/// An exclusive, time-limited hold on one seat.
///
/// Stored as JSON under `seatlock:{eventScheduleId}:{seatMappingId}`. The
/// release scripts read `userId` from it, so that field name is fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatLease {
    /// Lease holder.
    pub user_id: UserId,
    /// Leased seat.
    pub seat_mapping_id: SeatMappingId,
    /// Schedule of the seat.
    pub event_schedule_id: EventScheduleId,
    /// Price tier, if supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat_grade: Option<String>,
    /// Price, if supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat_price: Option<u64>,
    /// When the lease was taken.
    pub locked_at: DateTime<Utc>,
    /// When the lease lapses unless consumed or released.
    pub expires_at: DateTime<Utc>,
}

impl SeatLease {
    /// Build a lease for `request` starting at `now`.
    #[must_use]
    pub fn new(
        user_id: UserId,
        event_schedule_id: EventScheduleId,
        request: SeatRequest,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            user_id,
            seat_mapping_id: request.seat_mapping_id,
            event_schedule_id,
            seat_grade: request.seat_grade,
            seat_price: request.seat_price,
            locked_at: now,
            expires_at: now + ttl,
        }
    }
}

/// Store-level result of an atomic batch lease attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatHold {
    /// Every seat was leased.
    Locked,
    /// The user already holds a selection for the schedule. Nothing written.
    SelectionActive,
    /// The seat is leased by someone. Nothing written.
    Conflict(SeatMappingId),
}

impl SeatHold {
    /// Map the preoccupy script reply: `0` locked, `-1` selection active,
    /// `k > 0` conflict on the k-th seat of `seats` (1-based).
    #[must_use]
    pub fn from_reply(reply: i64, seats: &[SeatMappingId]) -> Self {
        match reply {
            0 => Self::Locked,
            -1 => Self::SelectionActive,
            k => usize::try_from(k - 1)
                .ok()
                .and_then(|index| seats.get(index))
                .map_or(Self::SelectionActive, |seat| Self::Conflict(seat.clone())),
        }
    }
}

/// Result of a preoccupy call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreoccupyOutcome {
    /// All requested seats are now leased to the caller.
    Locked(Vec<SeatLease>),
    /// Another user holds `seat`; no seat was leased.
    Conflict {
        /// First seat found held
        seat: SeatMappingId,
    },
}

impl PreoccupyOutcome {
    /// Whether the seats were leased.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        matches!(self, Self::Locked(_))
    }
}

/// Per-seat outcome of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatRelease {
    /// Lease removed.
    Released,
    /// No lease existed.
    NotHeld,
    /// Leased by a different user; left untouched.
    HeldByOther,
}

impl SeatRelease {
    /// Map a per-seat release script code.
    #[must_use]
    pub const fn from_reply(code: i64) -> Self {
        match code {
            1 => Self::Released,
            -1 => Self::HeldByOther,
            _ => Self::NotHeld,
        }
    }
}

/// Summary of a release call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseReport {
    /// Seats whose lease was removed.
    pub released: Vec<SeatMappingId>,
    /// Seats that had no lease.
    pub not_held: Vec<SeatMappingId>,
    /// Seats leased by another user.
    pub held_by_others: Vec<SeatMappingId>,
}

impl ReleaseReport {
    /// Collect per-seat outcomes.
    pub fn from_outcomes(outcomes: impl IntoIterator<Item = (SeatMappingId, SeatRelease)>) -> Self {
        let mut report = Self::default();
        for (seat, outcome) in outcomes {
            match outcome {
                SeatRelease::Released => report.released.push(seat),
                SeatRelease::NotHeld => report.not_held.push(seat),
                SeatRelease::HeldByOther => report.held_by_others.push(seat),
            }
        }
        report
    }

    /// Whether any seat belonged to someone else.
    #[must_use]
    pub fn has_conflicts(&self) -> bool {
        !self.held_by_others.is_empty()
    }
}
