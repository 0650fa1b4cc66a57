//! Named lock store.

use crate::error::Result;
use std::time::Duration;

/// Expiring mutual-exclusion tokens.
///
/// The lock is only released by the holder of `token`, and lapses on its own
/// after `ttl` if the holder dies.
pub trait NamedLockStore: Send + Sync {
    /// Try once to take the lock.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    fn try_acquire(
        &self,
        name: &str,
        token: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Release the lock if `token` still holds it.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    fn release(
        &self,
        name: &str,
        token: &str,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;
}
