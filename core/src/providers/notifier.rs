//! Client notification.

use crate::error::Result;
use crate::ids::UserId;
use crate::notice::Notice;

/// Best-effort push to a user's live connection.
pub trait Notifier: Send + Sync {
    /// Deliver `notice` to `user`.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::NotificationUndeliverable` if the user has no live
    /// connection or it cannot accept the notice. Callers log and continue.
    fn notify(
        &self,
        user: &UserId,
        notice: Notice,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}
