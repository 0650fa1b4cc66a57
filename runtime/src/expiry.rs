//! Expiration handling.
//!
//! Each tracked lease moves Active → Expired → Reaped. The store drives the
//! first transition by TTL; [`ExpiryReactor`] drives the second. Reaping goes
//! through the store's reap script, which deletes the lease marker, so a
//! duplicate notification, a notification racing an explicit leave, and the
//! orphan sweep all reclaim a slot at most once.
//!
//! Errors for one key are logged and swallowed; the reactor keeps going.

use crate::metrics::{AdmissionMetrics, ExpiryMetrics};
use crate::retry::RetryPolicy;
use ficket_core::keys::ExpiredKey;
use ficket_core::providers::{ExpiryFeed, Notifier, QueueStore};
use ficket_core::{EventId, EventScheduleId, ReapOutcome, Result, UserId, WorkStatusMessage};
use futures::StreamExt;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// What handling one expired key did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryOutcome {
    /// A working slot was returned to the pool and the user notified.
    Reaped,
    /// The user was re-admitted before the reaper ran.
    StillActive,
    /// The slot had already been returned.
    AlreadyReaped,
    /// A seat selection lapsed and the user was notified.
    SelectionReleased,
    /// Not a key this reactor tracks.
    Ignored,
}

impl ExpiryOutcome {
    const fn from_reap(outcome: ReapOutcome) -> Self {
        match outcome {
            ReapOutcome::Reaped => Self::Reaped,
            ReapOutcome::StillActive => Self::StillActive,
            ReapOutcome::AlreadyReaped => Self::AlreadyReaped,
        }
    }
}

/// Reacts to key expirations.
#[derive(Debug, Clone)]
pub struct ExpiryReactor<Q, N> {
    store: Q,
    notifier: N,
    backoff: RetryPolicy,
}

impl<Q: QueueStore, N: Notifier> ExpiryReactor<Q, N> {
    /// Create a reactor with a 100ms to 30s re-subscribe backoff.
    #[must_use]
    pub const fn new(store: Q, notifier: N) -> Self {
        Self {
            store,
            notifier,
            backoff: RetryPolicy::builder()
                .initial_delay(Duration::from_millis(100))
                .max_delay(Duration::from_secs(30))
                .build(),
        }
    }

    /// Set the re-subscribe backoff.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: RetryPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Handle one expired key name.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the reap script cannot run.
    /// Notification failures are logged, not returned.
    pub async fn handle_expired_key(&self, key: &str) -> Result<ExpiryOutcome> {
        match ExpiredKey::parse(key) {
            ExpiredKey::WorkingLease { event, user } => {
                ExpiryMetrics::record_event("working_lease");
                self.reap(event, user, "notification").await
            }
            ExpiredKey::SeatSelection { schedule, user } => {
                ExpiryMetrics::record_event("seat_selection");
                self.selection_lapsed(schedule, user).await;
                Ok(ExpiryOutcome::SelectionReleased)
            }
            ExpiredKey::LeaseMarker { event, user } => {
                // The marker outlived its lease by the whole margin without a
                // reap; the slot has to be repaired by an operator.
                ExpiryMetrics::record_event("lease_marker");
                tracing::error!(event_id = %event, user_id = %user, "Lease marker lapsed unreaped");
                Ok(ExpiryOutcome::Ignored)
            }
            ExpiredKey::Other => {
                ExpiryMetrics::record_event("ignored");
                tracing::trace!(key, "Ignoring expired key");
                Ok(ExpiryOutcome::Ignored)
            }
        }
    }

    /// Reap every lease whose expiry notification was missed.
    ///
    /// Returns the number of slots returned to the pool. Individual failures
    /// are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the marker scan fails.
    pub async fn sweep_orphans(&self) -> Result<usize> {
        let orphans = self.store.orphaned_leases().await?;
        let mut reaped = 0;

        for (event, user) in orphans {
            match self.reap(event, user, "sweep").await {
                Ok(ExpiryOutcome::Reaped) => reaped += 1,
                Ok(_) => {}
                Err(e) => {
                    ExpiryMetrics::record_error();
                    tracing::warn!(error = %e, "Failed to reap orphaned lease");
                }
            }
        }

        if reaped > 0 {
            tracing::info!(reaped, "Orphan sweep reclaimed working slots");
        }
        Ok(reaped)
    }

    /// Consume `feed` until `shutdown` fires.
    ///
    /// Keys are handled one at a time in arrival order. When the subscription
    /// fails or ends the reactor re-subscribes with backoff, then sweeps for
    /// leases that expired while it was detached.
    pub async fn run<F: ExpiryFeed>(&self, feed: &F, shutdown: CancellationToken) {
        let mut attempt = 0;

        loop {
            let subscription = tokio::select! {
                () = shutdown.cancelled() => break,
                subscription = feed.subscribe() => subscription,
            };

            match subscription {
                Ok(mut keys) => {
                    if attempt > 0 {
                        tracing::info!(attempt, "Expiry feed re-subscribed");
                        self.sweep_logged().await;
                    } else {
                        tracing::info!("Expiry feed subscribed");
                    }
                    attempt = 0;

                    loop {
                        tokio::select! {
                            () = shutdown.cancelled() => {
                                tracing::info!("Expiry reactor stopped");
                                return;
                            }
                            key = keys.next() => match key {
                                Some(key) => self.process(&key).await,
                                None => {
                                    tracing::warn!("Expiry feed ended");
                                    break;
                                }
                            },
                        }
                    }
                }
                Err(e) => tracing::error!(attempt, error = %e, "Failed to subscribe to expiry feed"),
            }

            let delay = self.backoff.jittered_delay(attempt);
            attempt += 1;
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Expiry reactor stopped");
    }

    /// Run [`sweep_orphans`](Self::sweep_orphans) every `interval` until
    /// `shutdown` fires.
    pub async fn run_sweeper(&self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => self.sweep_logged().await,
            }
        }
    }

    async fn process(&self, key: &str) {
        match self.handle_expired_key(key).await {
            Ok(outcome) => tracing::debug!(key, ?outcome, "Expired key handled"),
            Err(e) => {
                ExpiryMetrics::record_error();
                tracing::error!(key, error = %e, "Failed to handle expired key");
            }
        }
    }

    async fn sweep_logged(&self) {
        if let Err(e) = self.sweep_orphans().await {
            tracing::error!(error = %e, "Orphan sweep failed");
        }
    }

    async fn reap(&self, event: EventId, user: UserId, source: &'static str) -> Result<ExpiryOutcome> {
        let outcome = ExpiryOutcome::from_reap(self.store.reap_working_lease(&event, &user).await?);
        if outcome != ExpiryOutcome::Reaped {
            tracing::debug!(event_id = %event, user_id = %user, ?outcome, "Nothing to reap");
            return Ok(outcome);
        }

        ExpiryMetrics::record_reaped(source);
        AdmissionMetrics::record_slot_released("expired");
        tracing::info!(event_id = %event, user_id = %user, source, "Working lease reaped");

        let notice = WorkStatusMessage::order_right_lost(user.clone(), event);
        if let Err(e) = self.notifier.notify(&user, notice.into()).await {
            tracing::warn!(user_id = %user, error = %e, "Order-right-lost notice not delivered");
        }
        Ok(outcome)
    }

    async fn selection_lapsed(&self, schedule: EventScheduleId, user: UserId) {
        tracing::info!(event_schedule_id = %schedule, user_id = %user, "Seat selection lapsed");

        let notice = WorkStatusMessage::seats_released(user.clone(), schedule);
        if let Err(e) = self.notifier.notify(&user, notice.into()).await {
            tracing::warn!(user_id = %user, error = %e, "Seat-release notice not delivered");
        }
    }
}
