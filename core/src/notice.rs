//! Messages pushed to connected clients.

use crate::ids::{EventId, EventScheduleId, UserId};
use crate::queue::QueueStatusMessage;
use serde::{Deserialize, Serialize};

/// Purchase-screen notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkStatus {
    /// The working lease lapsed; the user must queue again to buy.
    OrderRightLost,
    /// The user's seat leases lapsed.
    SeatReservationReleased,
}

/// A [`WorkStatus`] addressed to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkStatusMessage {
    /// Recipient.
    pub user_id: UserId,
    /// What happened.
    pub work_status: WorkStatus,
    /// Event whose working lease was lost.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,
    /// Schedule whose seats were released.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_schedule_id: Option<EventScheduleId>,
}

impl WorkStatusMessage {
    /// Working lease lost for `event`.
    #[must_use]
    pub const fn order_right_lost(user_id: UserId, event: EventId) -> Self {
        Self {
            user_id,
            work_status: WorkStatus::OrderRightLost,
            event_id: Some(event),
            event_schedule_id: None,
        }
    }

    /// Seat selection released for `schedule`.
    #[must_use]
    pub const fn seats_released(user_id: UserId, schedule: EventScheduleId) -> Self {
        Self {
            user_id,
            work_status: WorkStatus::SeatReservationReleased,
            event_id: None,
            event_schedule_id: Some(schedule),
        }
    }
}

/// Anything the notifier can deliver. Serialized without a wrapper so each
/// variant keeps its own wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Notice {
    /// Queue progress.
    QueueStatus(QueueStatusMessage),
    /// Purchase-screen event.
    Work(WorkStatusMessage),
}

impl Notice {
    /// Recipient of the notice.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        match self {
            Self::QueueStatus(message) => &message.user_id,
            Self::Work(message) => &message.user_id,
        }
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::QueueStatus(_) => "queue_status",
            Self::Work(WorkStatusMessage { work_status: WorkStatus::OrderRightLost, .. }) => {
                "order_right_lost"
            }
            Self::Work(WorkStatusMessage { work_status: WorkStatus::SeatReservationReleased, .. }) => {
                "seat_reservation_released"
            }
        }
    }
}

impl From<QueueStatusMessage> for Notice {
    fn from(message: QueueStatusMessage) -> Self {
        Self::QueueStatus(message)
    }
}

impl From<WorkStatusMessage> for Notice {
    fn from(message: WorkStatusMessage) -> Self {
        Self::Work(message)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn work_notice_wire_format() {
        let notice = Notice::from(WorkStatusMessage::order_right_lost(
            UserId::parse("u1").unwrap(),
            EventId::parse("e1").unwrap(),
        ));

        assert_eq!(
            serde_json::to_value(&notice).unwrap(),
            serde_json::json!({
                "userId": "u1",
                "workStatus": "ORDER_RIGHT_LOST",
                "eventId": "e1"
            })
        );
        assert_eq!(notice.kind(), "order_right_lost");
    }

    #[test]
    fn untagged_notice_round_trips_both_shapes() {
        let work = Notice::from(WorkStatusMessage::seats_released(
            UserId::parse("u2").unwrap(),
            EventScheduleId::parse("s3").unwrap(),
        ));
        let text = serde_json::to_string(&work).unwrap();
        let back: Notice = serde_json::from_str(&text).unwrap();
        assert_eq!(back, work);
        assert_eq!(back.user_id().as_str(), "u2");
    }
}
