//! Key expiration feed.

use crate::error::Result;
use futures::stream::BoxStream;

/// Stream of expired key names.
pub type ExpiredKeyStream = BoxStream<'static, String>;

/// Source of key expiration notifications.
///
/// Delivery is at-most-once per subscription: consumers must tolerate both
/// duplicates and gaps.
pub trait ExpiryFeed: Send + Sync {
    /// Subscribe to expirations. The stream ends if the subscription drops.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the subscription fails.
    fn subscribe(&self) -> impl std::future::Future<Output = Result<ExpiredKeyStream>> + Send;
}
