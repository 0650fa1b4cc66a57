//! Key schema shared by every store binding.
//!
//! ```text
//! queue:{eventId}:next                  sequence counter
//! queue:{eventId}:waiting               sorted set, score = sequence number
//! queue:{eventId}:current               active working slot count
//! queue:{eventId}:working:{userId}      working lease (TTL)
//! queue:{eventId}:lease:{userId}        lease marker, outlives the lease
//! queue:{eventId}:maxConcurrent         operator capacity override
//! seatlock:{eventScheduleId}:{seatId}   seat lease JSON (TTL)
//! seatuser:{eventScheduleId}:{userId}   set of the user's leased seats (TTL)
//! lock:{name}                           named lock token (TTL)
//! ```

use crate::ids::{EventId, EventScheduleId, SeatMappingId, UserId};

const QUEUE: &str = "queue";
const SEAT_LOCK: &str = "seatlock";
const SEAT_USER: &str = "seatuser";
const LOCK: &str = "lock";

/// Keys of one event's waiting queue and slot pool.
#[derive(Debug, Clone, Copy)]
pub struct QueueKeys<'a> {
    event: &'a EventId,
}

impl<'a> QueueKeys<'a> {
    /// Keys for `event`.
    #[must_use]
    pub const fn new(event: &'a EventId) -> Self {
        Self { event }
    }

    /// Monotonic sequence counter.
    #[must_use]
    pub fn next(&self) -> String {
        format!("{QUEUE}:{}:next", self.event)
    }

    /// Waiting set ordered by sequence number.
    #[must_use]
    pub fn waiting(&self) -> String {
        format!("{QUEUE}:{}:waiting", self.event)
    }

    /// Active slot counter.
    #[must_use]
    pub fn current(&self) -> String {
        format!("{QUEUE}:{}:current", self.event)
    }

    /// Working lease of `user`.
    #[must_use]
    pub fn working(&self, user: &UserId) -> String {
        format!("{QUEUE}:{}:working:{user}", self.event)
    }

    /// Lease marker of `user`.
    #[must_use]
    pub fn lease_marker(&self, user: &UserId) -> String {
        format!("{QUEUE}:{}:lease:{user}", self.event)
    }

    /// Operator override of the slot capacity.
    #[must_use]
    pub fn max_concurrent(&self) -> String {
        format!("{QUEUE}:{}:maxConcurrent", self.event)
    }
}

/// Match pattern for every lease marker of every event.
#[must_use]
pub fn lease_marker_pattern() -> String {
    format!("{QUEUE}:*:lease:*")
}

/// Seat lease key.
#[must_use]
pub fn seat_lock(schedule: &EventScheduleId, seat: &SeatMappingId) -> String {
    format!("{}{seat}", seat_lock_prefix(schedule))
}

/// Prefix shared by every seat lease of a schedule.
#[must_use]
pub fn seat_lock_prefix(schedule: &EventScheduleId) -> String {
    format!("{SEAT_LOCK}:{schedule}:")
}

/// The user's seat selection set for a schedule.
#[must_use]
pub fn seat_selection(schedule: &EventScheduleId, user: &UserId) -> String {
    format!("{}{user}", seat_selection_prefix(schedule))
}

/// Prefix shared by every seat selection set of a schedule.
#[must_use]
pub fn seat_selection_prefix(schedule: &EventScheduleId) -> String {
    format!("{SEAT_USER}:{schedule}:")
}

/// Named lock key.
#[must_use]
pub fn named_lock(name: &str) -> String {
    format!("{LOCK}:{name}")
}

/// Classification of an expired key name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiredKey {
    /// A working lease lapsed.
    WorkingLease {
        /// Event of the lease
        event: EventId,
        /// Lease holder
        user: UserId,
    },

    /// A lease marker lapsed.
    LeaseMarker {
        /// Event of the marker
        event: EventId,
        /// Marker owner
        user: UserId,
    },

    /// A user's seat selection lapsed, taking its seat leases with it.
    SeatSelection {
        /// Schedule of the selection
        schedule: EventScheduleId,
        /// Selection owner
        user: UserId,
    },

    /// Anything else, including individual seat leases.
    Other,
}

impl ExpiredKey {
    /// Classify `key`. Malformed keys are [`ExpiredKey::Other`].
    #[must_use]
    pub fn parse(key: &str) -> Self {
        let parts: Vec<&str> = key.split(':').collect();

        match parts.as_slice() {
            [QUEUE, event, "working", user] => match (EventId::parse(*event), UserId::parse(*user)) {
                (Ok(event), Ok(user)) => Self::WorkingLease { event, user },
                _ => Self::Other,
            },
            [QUEUE, event, "lease", user] => match (EventId::parse(*event), UserId::parse(*user)) {
                (Ok(event), Ok(user)) => Self::LeaseMarker { event, user },
                _ => Self::Other,
            },
            [SEAT_USER, schedule, user] => {
                match (EventScheduleId::parse(*schedule), UserId::parse(*user)) {
                    (Ok(schedule), Ok(user)) => Self::SeatSelection { schedule, user },
                    _ => Self::Other,
                }
            }
            _ => Self::Other,
        }
    }
}
