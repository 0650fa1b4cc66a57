//! Waiting queue and working slot data model.

use crate::ids::{EventId, UserId};
use serde::{Deserialize, Serialize};

/// Snapshot of a user's place in an event's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    /// Zero-based rank in the waiting set, `-1` if the user is not waiting.
    pub position: i64,
    /// Number of users currently waiting.
    pub total_waiting: u64,
    /// Whether the user holds a live working lease.
    pub is_admitted: bool,
}

impl QueueStatus {
    /// Build a snapshot from a raw rank lookup.
    #[must_use]
    pub fn from_rank(rank: Option<u64>, total_waiting: u64, is_admitted: bool) -> Self {
        Self {
            position: rank.map_or(-1, |r| i64::try_from(r).unwrap_or(i64::MAX)),
            total_waiting,
            is_admitted,
        }
    }

    /// Whether the user is present in the waiting set.
    #[must_use]
    pub const fn is_waiting(&self) -> bool {
        self.position >= 0
    }
}

/// Client-facing phase of a queue session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatusKind {
    /// Waiting behind more than the "almost done" threshold.
    Waiting,
    /// Close to the front of the queue.
    AlmostDone,
    /// Admitted to the purchase screen.
    Completed,
    /// Neither waiting nor admitted.
    Cancelled,
}

impl QueueStatusKind {
    /// Classify a snapshot. `almost_done_threshold` is inclusive.
    #[must_use]
    pub const fn classify(status: &QueueStatus, almost_done_threshold: u64) -> Self {
        if status.is_admitted {
            return Self::Completed;
        }
        if status.position < 0 {
            return Self::Cancelled;
        }
        if status.position.unsigned_abs() <= almost_done_threshold {
            Self::AlmostDone
        } else {
            Self::Waiting
        }
    }
}

/// Real-time status message pushed to queue sockets.
///
/// The field names are a wire contract with existing clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatusMessage {
    /// Recipient.
    pub user_id: UserId,
    /// Event of the queue.
    pub event_id: EventId,
    /// The user's rank, `-1` once admitted or when absent.
    pub my_waiting_number: i64,
    /// Total number of waiting users.
    pub total_waiting_number: i64,
    /// Phase of the session.
    pub queue_status: QueueStatusKind,
}

impl QueueStatusMessage {
    /// Render a snapshot as a message.
    #[must_use]
    pub fn new(user_id: UserId, event_id: EventId, status: &QueueStatus, almost_done_threshold: u64) -> Self {
        let queue_status = QueueStatusKind::classify(status, almost_done_threshold);
        let my_waiting_number = if queue_status == QueueStatusKind::Completed {
            -1
        } else {
            status.position
        };

        Self {
            user_id,
            event_id,
            my_waiting_number,
            total_waiting_number: i64::try_from(status.total_waiting).unwrap_or(i64::MAX),
            queue_status,
        }
    }

    /// The message sent once a user is admitted.
    #[must_use]
    pub fn completed(user_id: UserId, event_id: EventId, total_waiting: u64) -> Self {
        Self {
            user_id,
            event_id,
            my_waiting_number: -1,
            total_waiting_number: i64::try_from(total_waiting).unwrap_or(i64::MAX),
            queue_status: QueueStatusKind::Completed,
        }
    }
}

/// Outcome of an admission attempt. Denial is expected under load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    /// The user holds a working lease (new or already existing).
    Granted,
    /// Every slot is taken.
    Denied,
}

impl Admission {
    /// Map the admission script's integer reply.
    #[must_use]
    pub const fn from_reply(reply: i64) -> Self {
        if reply == 1 { Self::Granted } else { Self::Denied }
    }

    /// Whether the user was admitted.
    #[must_use]
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Result of reaping an expired working lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapOutcome {
    /// The slot was returned to the pool by this call.
    Reaped,
    /// The lease is live again (re-admitted), nothing to do.
    StillActive,
    /// Another reaper, or an explicit leave, got there first.
    AlreadyReaped,
}

impl ReapOutcome {
    /// Map the reap script's integer reply.
    #[must_use]
    pub const fn from_reply(reply: i64) -> Self {
        match reply {
            1 => Self::Reaped,
            -1 => Self::StillActive,
            _ => Self::AlreadyReaped,
        }
    }
}

/// Raw slot counters of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotCounters {
    /// Active working slots.
    pub current: u64,
    /// Operator override, if any.
    pub max_override: Option<u32>,
    /// Users waiting.
    pub waiting: u64,
}

/// Slot usage as shown to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotUsage {
    /// Active working slots.
    pub current: u64,
    /// Effective capacity.
    pub max_concurrent: u32,
    /// Whether the capacity comes from an operator override.
    pub overridden: bool,
    /// Users waiting.
    pub waiting: u64,
    /// Users that could be admitted right now: `min(max - current, waiting)`.
    pub available: u64,
}

impl SlotUsage {
    /// Combine raw counters with the configured default capacity.
    #[must_use]
    pub fn new(counters: SlotCounters, default_max: u32) -> Self {
        let max_concurrent = counters.max_override.unwrap_or(default_max);
        let free = u64::from(max_concurrent).saturating_sub(counters.current);

        Self {
            current: counters.current,
            max_concurrent,
            overridden: counters.max_override.is_some(),
            waiting: counters.waiting,
            available: free.min(counters.waiting),
        }
    }
}
