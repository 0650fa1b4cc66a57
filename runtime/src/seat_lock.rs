//! Seat lease service.
//!
//! A preoccupy call leases every requested seat or none. Request validation
//! happens before the store is touched; contention is decided by the store's
//! atomic script and reported as [`PreoccupyOutcome::Conflict`].

use crate::config::SeatLockConfig;
use crate::metrics::SeatMetrics;
use ficket_core::environment::Clock;
use ficket_core::providers::SeatLockStore;
use ficket_core::{
    EventScheduleId, PreoccupyOutcome, QueueError, ReleaseReport, Result, SeatHold, SeatLease, SeatMappingId,
    SeatRequest, UserId,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Owns per-seat exclusivity during the purchase screen.
#[derive(Clone)]
pub struct SeatLockCoordinator<S> {
    store: S,
    clock: Arc<dyn Clock>,
    config: SeatLockConfig,
}

impl<S> std::fmt::Debug for SeatLockCoordinator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeatLockCoordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: SeatLockStore> SeatLockCoordinator<S> {
    /// Create the coordinator.
    #[must_use]
    pub fn new(store: S, clock: Arc<dyn Clock>, config: SeatLockConfig) -> Self {
        Self { store, clock, config }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &SeatLockConfig {
        &self.config
    }

    /// Lease `requests` to `user`, all or nothing.
    ///
    /// Duplicate seat ids are collapsed, keeping the first occurrence. The
    /// effective limit is the smaller of `reservation_limit` and the
    /// configured per-selection maximum.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::EmptySeatSelection`, `QueueError::SeatLimitExceeded`
    /// or `QueueError::SelectionAlreadyActive` for rejected requests, and
    /// `QueueError::StoreUnavailable` if the store cannot be reached.
    pub async fn preoccupy_seats(
        &self,
        schedule: &EventScheduleId,
        user: &UserId,
        requests: Vec<SeatRequest>,
        reservation_limit: u32,
    ) -> Result<PreoccupyOutcome> {
        let requests = dedupe(requests);
        let limit = reservation_limit.min(self.config.max_seats_per_selection);

        if requests.is_empty() {
            SeatMetrics::record_preoccupy("rejected");
            return Err(QueueError::EmptySeatSelection);
        }
        if requests.len() > usize::try_from(limit).unwrap_or(usize::MAX) {
            SeatMetrics::record_preoccupy("rejected");
            return Err(QueueError::SeatLimitExceeded { requested: requests.len(), limit });
        }
        if self.store.has_selection(schedule, user).await? {
            SeatMetrics::record_preoccupy("rejected");
            return Err(QueueError::SelectionAlreadyActive);
        }

        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(self.config.lease_ttl)
            .map_err(|e| QueueError::Serialization(format!("lease ttl out of range: {e}")))?;
        let leases: Vec<SeatLease> = requests
            .into_iter()
            .map(|request| SeatLease::new(user.clone(), schedule.clone(), request, now, ttl))
            .collect();

        match self
            .store
            .preoccupy(schedule, user, &leases, self.config.lease_ttl)
            .await?
        {
            SeatHold::Locked => {
                SeatMetrics::record_preoccupy("locked");
                tracing::info!(
                    event_schedule_id = %schedule,
                    user_id = %user,
                    seats = leases.len(),
                    "Seats preoccupied"
                );
                Ok(PreoccupyOutcome::Locked(leases))
            }
            SeatHold::Conflict(seat) => {
                SeatMetrics::record_preoccupy("conflict");
                tracing::info!(event_schedule_id = %schedule, user_id = %user, seat = %seat, "Seat already leased");
                Ok(PreoccupyOutcome::Conflict { seat })
            }
            SeatHold::SelectionActive => {
                // Lost a race against the user's own concurrent request.
                SeatMetrics::record_preoccupy("rejected");
                Err(QueueError::SelectionAlreadyActive)
            }
        }
    }

    /// Release the listed seats held by `user`.
    ///
    /// Seats leased by someone else are left untouched and listed in
    /// [`ReleaseReport::held_by_others`]; the caller decides whether that is
    /// a conflict.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::EmptySeatSelection` for an empty list and
    /// `QueueError::StoreUnavailable` if the store cannot be reached.
    pub async fn release_seats(
        &self,
        schedule: &EventScheduleId,
        seats: Vec<SeatMappingId>,
        user: &UserId,
    ) -> Result<ReleaseReport> {
        let mut seen = HashSet::new();
        let seats: Vec<SeatMappingId> = seats.into_iter().filter(|seat| seen.insert(seat.clone())).collect();
        if seats.is_empty() {
            return Err(QueueError::EmptySeatSelection);
        }

        let outcomes = self.store.release(schedule, user, &seats).await?;
        let report = ReleaseReport::from_outcomes(seats.into_iter().zip(outcomes));
        SeatMetrics::record_released(report.released.len());

        if report.has_conflicts() {
            tracing::warn!(
                event_schedule_id = %schedule,
                user_id = %user,
                held_by_others = report.held_by_others.len(),
                "Release attempted on seats held by another user"
            );
        }
        tracing::info!(
            event_schedule_id = %schedule,
            user_id = %user,
            released = report.released.len(),
            "Seats released"
        );
        Ok(report)
    }

    /// Release every seat `user` holds for the schedule.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    pub async fn release_all(&self, schedule: &EventScheduleId, user: &UserId) -> Result<Vec<SeatMappingId>> {
        let released = self.store.release_all(schedule, user).await?;
        SeatMetrics::record_released(released.len());
        tracing::info!(
            event_schedule_id = %schedule,
            user_id = %user,
            released = released.len(),
            "Seat selection released"
        );
        Ok(released)
    }

    /// Current lease of a seat.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` or `QueueError::Serialization`.
    pub async fn lease(&self, schedule: &EventScheduleId, seat: &SeatMappingId) -> Result<Option<SeatLease>> {
        self.store.lease(schedule, seat).await
    }

    /// Hand a seat's lease over to the payment flow.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` or `QueueError::Serialization`.
    pub async fn consume(&self, schedule: &EventScheduleId, seat: &SeatMappingId) -> Result<Option<SeatLease>> {
        let lease = self.store.consume(schedule, seat).await?;
        if let Some(lease) = &lease {
            SeatMetrics::record_consumed();
            tracing::info!(
                event_schedule_id = %schedule,
                seat = %seat,
                user_id = %lease.user_id,
                "Seat lease consumed"
            );
        }
        Ok(lease)
    }

    /// Seats in the user's active selection.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    pub async fn selected_seats(&self, schedule: &EventScheduleId, user: &UserId) -> Result<Vec<SeatMappingId>> {
        self.store.selected_seats(schedule, user).await
    }
}

fn dedupe(requests: Vec<SeatRequest>) -> Vec<SeatRequest> {
    let mut seen = HashSet::new();
    requests
        .into_iter()
        .filter(|request| seen.insert(request.seat_mapping_id.clone()))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use ficket_testing::InMemoryStore;
    use std::time::Duration;

    fn coordinator(store: &InMemoryStore) -> SeatLockCoordinator<InMemoryStore> {
        SeatLockCoordinator::new(store.clone(), Arc::new(store.clock()), SeatLockConfig::default())
    }

    fn schedule() -> EventScheduleId {
        EventScheduleId::parse("s1").unwrap()
    }

    fn user(n: u32) -> UserId {
        UserId::parse(format!("u{n}")).unwrap()
    }

    fn seats(ids: &[&str]) -> Vec<SeatRequest> {
        ids.iter().map(|id| SeatRequest::new(SeatMappingId::parse(*id).unwrap())).collect()
    }

    #[tokio::test]
    async fn empty_request_is_rejected() {
        let store = InMemoryStore::new();
        let err = coordinator(&store)
            .preoccupy_seats(&schedule(), &user(1), Vec::new(), 4)
            .await
            .unwrap_err();
        assert_eq!(err, QueueError::EmptySeatSelection);
    }

    #[tokio::test]
    async fn limit_is_capped_by_config() {
        let store = InMemoryStore::new();
        let err = coordinator(&store)
            .preoccupy_seats(&schedule(), &user(1), seats(&["A1", "A2", "A3", "A4", "A5"]), 10)
            .await
            .unwrap_err();
        assert_eq!(err, QueueError::SeatLimitExceeded { requested: 5, limit: 4 });
    }

    #[tokio::test]
    async fn duplicates_count_once() {
        let store = InMemoryStore::new();
        let outcome = coordinator(&store)
            .preoccupy_seats(&schedule(), &user(1), seats(&["A1", "A1", "A2"]), 2)
            .await
            .unwrap();

        let PreoccupyOutcome::Locked(leases) = outcome else {
            panic!("expected lock, got {outcome:?}");
        };
        assert_eq!(leases.len(), 2);
    }

    #[tokio::test]
    async fn second_selection_is_rejected() {
        let store = InMemoryStore::new();
        let coordinator = coordinator(&store);
        coordinator
            .preoccupy_seats(&schedule(), &user(1), seats(&["A1"]), 4)
            .await
            .unwrap();

        let err = coordinator
            .preoccupy_seats(&schedule(), &user(1), seats(&["B1"]), 4)
            .await
            .unwrap_err();
        assert_eq!(err, QueueError::SelectionAlreadyActive);
        assert!(coordinator.lease(&schedule(), &SeatMappingId::parse("B1").unwrap()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lease_carries_pricing_and_expiry() {
        let store = InMemoryStore::new();
        let coordinator = coordinator(&store);
        let request = SeatRequest {
            seat_mapping_id: SeatMappingId::parse("VIP-1").unwrap(),
            seat_grade: Some("VIP".into()),
            seat_price: Some(150_000),
        };

        coordinator
            .preoccupy_seats(&schedule(), &user(1), vec![request.clone()], 4)
            .await
            .unwrap();

        let lease = coordinator
            .lease(&schedule(), &request.seat_mapping_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lease.user_id, user(1));
        assert_eq!(lease.seat_grade.as_deref(), Some("VIP"));
        assert_eq!(lease.seat_price, Some(150_000));
        assert_eq!((lease.expires_at - lease.locked_at).num_seconds(), 480);
    }

    #[tokio::test]
    async fn leases_lapse_after_ttl() {
        let store = InMemoryStore::new();
        let coordinator = coordinator(&store);
        coordinator
            .preoccupy_seats(&schedule(), &user(1), seats(&["A1"]), 4)
            .await
            .unwrap();

        store.advance(Duration::from_secs(480));

        assert!(coordinator.selected_seats(&schedule(), &user(1)).await.unwrap().is_empty());
        let outcome = coordinator
            .preoccupy_seats(&schedule(), &user(2), seats(&["A1"]), 4)
            .await
            .unwrap();
        assert!(outcome.is_locked());
    }

    #[tokio::test]
    async fn consume_removes_from_selection() {
        let store = InMemoryStore::new();
        let coordinator = coordinator(&store);
        coordinator
            .preoccupy_seats(&schedule(), &user(1), seats(&["A1", "A2"]), 4)
            .await
            .unwrap();

        let a1 = SeatMappingId::parse("A1").unwrap();
        let lease = coordinator.consume(&schedule(), &a1).await.unwrap().unwrap();
        assert_eq!(lease.user_id, user(1));
        assert!(coordinator.consume(&schedule(), &a1).await.unwrap().is_none());
        assert_eq!(
            coordinator.selected_seats(&schedule(), &user(1)).await.unwrap(),
            vec![SeatMappingId::parse("A2").unwrap()]
        );
    }

    #[tokio::test]
    async fn release_all_frees_selection() {
        let store = InMemoryStore::new();
        let coordinator = coordinator(&store);
        coordinator
            .preoccupy_seats(&schedule(), &user(1), seats(&["A1", "A2"]), 4)
            .await
            .unwrap();

        let released = coordinator.release_all(&schedule(), &user(1)).await.unwrap();
        assert_eq!(released.len(), 2);
        assert!(!store.contains_key("seatuser:s1:u1"));
        assert!(!store.contains_key("seatlock:s1:A1"));
    }
}
