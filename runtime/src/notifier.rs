//! Notifier backed by the connection registry.

use crate::metrics::RealtimeMetrics;
use crate::registry::ConnectionRegistry;
use ficket_core::providers::Notifier;
use ficket_core::{Notice, QueueError, Result, UserId};
use tokio::sync::mpsc::error::TrySendError;

/// Pushes notices onto the user's live connections without waiting.
///
/// Queue status goes to the waiting room of its event and work notices to the
/// purchase screen. Delivery succeeds if at least one channel took the notice;
/// a missing connection, a full buffer and a closed socket all fail with
/// `QueueError::NotificationUndeliverable`.
#[derive(Debug, Clone)]
pub struct ClientNotifier {
    registry: ConnectionRegistry,
}

impl ClientNotifier {
    /// Create a notifier over `registry`.
    #[must_use]
    pub const fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }
}

impl Notifier for ClientNotifier {
    async fn notify(&self, user: &UserId, notice: Notice) -> Result<()> {
        let kind = notice.kind();
        let senders = self.registry.senders(user, &notice).await;
        if senders.is_empty() {
            RealtimeMetrics::record_notice(false);
            tracing::debug!(user_id = %user, kind, "No live connection for notice");
            return Err(QueueError::NotificationUndeliverable { user: user.clone() });
        }

        let mut delivered = false;
        for sender in senders {
            match sender.try_send(notice.clone()) {
                Ok(()) => delivered = true,
                Err(e) => {
                    let reason = match e {
                        TrySendError::Full(_) => "buffer full",
                        TrySendError::Closed(_) => "connection closed",
                    };
                    tracing::warn!(user_id = %user, kind, reason, "Notice dropped");
                }
            }
        }

        RealtimeMetrics::record_notice(delivered);
        if delivered {
            tracing::debug!(user_id = %user, kind, "Notice queued");
            Ok(())
        } else {
            Err(QueueError::NotificationUndeliverable { user: user.clone() })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::registry::ChannelKey;
    use ficket_core::{EventId, EventScheduleId, QueueStatusMessage, WorkStatusMessage};

    fn user() -> UserId {
        UserId::parse("u1").unwrap()
    }

    fn event(id: &str) -> EventId {
        EventId::parse(id).unwrap()
    }

    fn work() -> ChannelKey {
        ChannelKey::Work(event("e1"))
    }

    fn notice() -> Notice {
        WorkStatusMessage::seats_released(user(), EventScheduleId::parse("s1").unwrap()).into()
    }

    #[tokio::test]
    async fn delivers_to_registered_user() {
        let registry = ConnectionRegistry::new(4);
        let mut registration = registry.register(&user(), &work()).await;

        ClientNotifier::new(registry).notify(&user(), notice()).await.unwrap();
        assert_eq!(registration.receiver.recv().await.unwrap(), notice());
    }

    #[tokio::test]
    async fn unknown_user_is_undeliverable() {
        let err = ClientNotifier::new(ConnectionRegistry::new(4))
            .notify(&user(), notice())
            .await
            .unwrap_err();
        assert_eq!(err, QueueError::NotificationUndeliverable { user: user() });
    }

    #[tokio::test]
    async fn queue_notice_skips_work_channel() {
        let registry = ConnectionRegistry::new(4);
        let mut registration = registry.register(&user(), &work()).await;
        let completed = QueueStatusMessage::completed(user(), event("e1"), 0);

        let err = ClientNotifier::new(registry).notify(&user(), completed.into()).await.unwrap_err();
        assert_eq!(err, QueueError::NotificationUndeliverable { user: user() });
        assert!(registration.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_buffer_is_undeliverable() {
        let registry = ConnectionRegistry::new(1);
        let _registration = registry.register(&user(), &work()).await;
        let notifier = ClientNotifier::new(registry);

        notifier.notify(&user(), notice()).await.unwrap();
        assert!(notifier.notify(&user(), notice()).await.is_err());
    }

    #[tokio::test]
    async fn closed_connection_is_undeliverable() {
        let registry = ConnectionRegistry::new(4);
        let registration = registry.register(&user(), &work()).await;
        drop(registration.receiver);

        assert!(ClientNotifier::new(registry).notify(&user(), notice()).await.is_err());
    }
}
