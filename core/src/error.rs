//! Error taxonomy for admission and seat reservation operations.
//!
//! Capacity denial ("no free working slot") and seat contention are expected
//! outcomes and are reported through return values, not through this type.

use crate::ids::{SeatMappingId, UserId};
use thiserror::Error;

/// Result type alias for queue and seat operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Failure modes of the admission core.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    // ═══════════════════════════════════════════════════════════
    // Invalid Request
    // ═══════════════════════════════════════════════════════════

    /// An identifier failed validation.
    #[error("Invalid {kind}: {value:?}")]
    InvalidIdentifier {
        /// Which identifier was malformed
        kind: &'static str,
        /// The rejected value (truncated)
        value: String,
    },

    /// A seat request contained no seats.
    #[error("At least one seat must be requested")]
    EmptySeatSelection,

    /// More seats requested than the caller may hold.
    #[error("Requested {requested} seats but the limit is {limit}")]
    SeatLimitExceeded {
        /// Distinct seats requested
        requested: usize,
        /// Effective reservation limit
        limit: u32,
    },

    /// The user already holds seat leases for this schedule.
    #[error("User already has an active seat selection for this schedule")]
    SelectionAlreadyActive,

    /// Operator supplied a capacity of zero.
    #[error("Maximum concurrent slots must be at least 1")]
    InvalidCapacity,

    // ═══════════════════════════════════════════════════════════
    // Conflict
    // ═══════════════════════════════════════════════════════════

    /// Some seats are leased by another user.
    #[error("Seats held by another user: {}", format_seats(.seats))]
    SeatsHeldByOtherUser {
        /// Seats that were left untouched
        seats: Vec<SeatMappingId>,
    },

    /// Working slots are still in use.
    #[error("{active} working slots are still active")]
    SlotsStillActive {
        /// Current active slot count
        active: u64,
    },

    /// A named lock could not be acquired within the wait budget.
    #[error("Lock busy: {name}")]
    LockBusy {
        /// Lock name
        name: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Store Unavailable
    // ═══════════════════════════════════════════════════════════

    /// The key-value store could not be reached or rejected a command.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A stored value could not be decoded or encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ═══════════════════════════════════════════════════════════
    // Notification Delivery
    // ═══════════════════════════════════════════════════════════

    /// The user has no live connection, or its buffer is full.
    #[error("Notification undeliverable to user {user}")]
    NotificationUndeliverable {
        /// Intended recipient
        user: UserId,
    },
}

fn format_seats(seats: &[SeatMappingId]) -> String {
    seats
        .iter()
        .map(SeatMappingId::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

impl QueueError {
    /// Returns `true` if the caller sent something malformed or disallowed.
    ///
    /// # Examples
    ///
    /// ```
    /// # use ficket_core::QueueError;
    /// assert!(QueueError::EmptySeatSelection.is_invalid_request());
    /// assert!(!QueueError::StoreUnavailable("down".into()).is_invalid_request());
    /// ```
    #[must_use]
    pub const fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdentifier { .. }
                | Self::EmptySeatSelection
                | Self::SeatLimitExceeded { .. }
                | Self::SelectionAlreadyActive
                | Self::InvalidCapacity
        )
    }

    /// Returns `true` if the request lost a race or hit a state conflict.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::SeatsHeldByOtherUser { .. } | Self::SlotsStillActive { .. } | Self::LockBusy { .. }
        )
    }

    /// Returns `true` if retrying the same call later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::LockBusy { .. })
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
