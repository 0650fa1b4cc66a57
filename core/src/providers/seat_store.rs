//! Seat lease store.

use crate::error::Result;
use crate::ids::{EventScheduleId, SeatMappingId, UserId};
use crate::seat::{SeatHold, SeatLease, SeatRelease};
use std::time::Duration;

/// Atomic operations on seat leases and per-user selections.
pub trait SeatLockStore: Send + Sync {
    /// Whether the user holds any seat lease for the schedule.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    fn has_selection(
        &self,
        schedule: &EventScheduleId,
        user: &UserId,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Lease every seat in `leases` to `user`, or none of them.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached,
    /// `QueueError::Serialization` if a lease cannot be encoded.
    fn preoccupy(
        &self,
        schedule: &EventScheduleId,
        user: &UserId,
        leases: &[SeatLease],
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<SeatHold>> + Send;

    /// Release the listed seats if `user` holds them.
    ///
    /// The returned outcomes follow the order of `seats`.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    fn release(
        &self,
        schedule: &EventScheduleId,
        user: &UserId,
        seats: &[SeatMappingId],
    ) -> impl std::future::Future<Output = Result<Vec<SeatRelease>>> + Send;

    /// Release every seat the user holds for the schedule.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    fn release_all(
        &self,
        schedule: &EventScheduleId,
        user: &UserId,
    ) -> impl std::future::Future<Output = Result<Vec<SeatMappingId>>> + Send;

    /// Read a seat's lease.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached,
    /// `QueueError::Serialization` if the stored lease is malformed.
    fn lease(
        &self,
        schedule: &EventScheduleId,
        seat: &SeatMappingId,
    ) -> impl std::future::Future<Output = Result<Option<SeatLease>>> + Send;

    /// Take a seat's lease out of the store.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached,
    /// `QueueError::Serialization` if the stored lease is malformed.
    fn consume(
        &self,
        schedule: &EventScheduleId,
        seat: &SeatMappingId,
    ) -> impl std::future::Future<Output = Result<Option<SeatLease>>> + Send;

    /// Seats currently in the user's selection.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    fn selected_seats(
        &self,
        schedule: &EventScheduleId,
        user: &UserId,
    ) -> impl std::future::Future<Output = Result<Vec<SeatMappingId>>> + Send;
}
