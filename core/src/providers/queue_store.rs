//! Waiting queue and working slot store.

use crate::error::Result;
use crate::ids::{EventId, UserId};
use crate::queue::{Admission, QueueStatus, ReapOutcome, SlotCounters};
use std::time::Duration;

/// Atomic operations on one event's queue keys.
pub trait QueueStore: Send + Sync {
    /// Append the user to the waiting set.
    ///
    /// Returns the user's sequence number. Re-entering returns the existing
    /// number without consuming a new one.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    fn enter_queue(
        &self,
        event: &EventId,
        user: &UserId,
    ) -> impl std::future::Future<Output = Result<u64>> + Send;

    /// Remove the user from the waiting set.
    ///
    /// Returns `true` if the user was waiting.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    fn leave_queue(
        &self,
        event: &EventId,
        user: &UserId,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Read rank, waiting total and admission flag as one consistent snapshot.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    fn queue_status(
        &self,
        event: &EventId,
        user: &UserId,
    ) -> impl std::future::Future<Output = Result<QueueStatus>> + Send;

    /// Admit the user if fewer than `max_concurrent` slots are active.
    ///
    /// Idempotent for a user who already holds a lease. A lease that lapsed but
    /// was not yet reaped is re-issued without taking another slot.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    fn enter_ticketing(
        &self,
        event: &EventId,
        user: &UserId,
        max_concurrent: u32,
        lease_ttl: Duration,
    ) -> impl std::future::Future<Output = Result<Admission>> + Send;

    /// Release the user's working lease.
    ///
    /// Returns `true` if a lease was removed and the slot returned. A second
    /// call returns `false` and does not decrement again.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    fn leave_ticketing(
        &self,
        event: &EventId,
        user: &UserId,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Return the slot of a lapsed lease to the pool, exactly once.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    fn reap_working_lease(
        &self,
        event: &EventId,
        user: &UserId,
    ) -> impl std::future::Future<Output = Result<ReapOutcome>> + Send;

    /// Decrement the active slot count, bounded at zero.
    ///
    /// Returns `false` if the count was already zero.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    fn release_slot(&self, event: &EventId) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Read the active count, capacity override and waiting total.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    fn slot_counters(
        &self,
        event: &EventId,
    ) -> impl std::future::Future<Output = Result<SlotCounters>> + Send;

    /// Set the capacity override.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    fn set_max_concurrent(
        &self,
        event: &EventId,
        max: u32,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Remove the capacity override. Returns `true` if one existed.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    fn clear_max_concurrent(
        &self,
        event: &EventId,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Delete the slot counter and capacity override of a finished event.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    fn delete_slot_counters(
        &self,
        event: &EventId,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// List leases that lapsed without being reaped.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    fn orphaned_leases(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<(EventId, UserId)>>> + Send;

    /// Check connectivity.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    fn ping(&self) -> impl std::future::Future<Output = Result<()>> + Send;
}
