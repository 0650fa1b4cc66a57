//! Waiting queue and working slot service.
//!
//! Position in the queue is advisory. Admission is decided by the store's
//! atomic script, so a promotion offer may still be denied under contention.
//! Denial is a normal outcome and is returned as [`Admission::Denied`].

use crate::config::AdmissionConfig;
use crate::lock::NamedLock;
use crate::metrics::AdmissionMetrics;
use ficket_core::providers::{NamedLockStore, Notifier, QueueStore};
use ficket_core::{
    Admission, EventId, QueueError, QueueStatus, QueueStatusMessage, Result, SlotUsage, UserId,
};
use std::time::{Duration, Instant};

/// Result of one status tick for a connected client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTick {
    /// Message describing the user's state after the tick.
    pub message: QueueStatusMessage,
    /// Whether the message already went out through the notifier.
    pub notified: bool,
}

/// Owns the waiting line and the working slot pool of every event.
#[derive(Debug, Clone)]
pub struct QueueAdmissionService<Q, L, N> {
    store: Q,
    lock: NamedLock<L>,
    notifier: N,
    config: AdmissionConfig,
}

impl<Q, L, N> QueueAdmissionService<Q, L, N>
where
    Q: QueueStore,
    L: NamedLockStore,
    N: Notifier,
{
    /// Create the service.
    #[must_use]
    pub const fn new(store: Q, lock: NamedLock<L>, notifier: N, config: AdmissionConfig) -> Self {
        Self { store, lock, notifier, config }
    }

    /// Service configuration.
    #[must_use]
    pub const fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Join the queue. Re-entering returns the same sequence number.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    pub async fn enter_queue(&self, event: &EventId, user: &UserId) -> Result<u64> {
        let sequence = self.store.enter_queue(event, user).await?;
        AdmissionMetrics::record_entry();
        tracing::info!(event_id = %event, user_id = %user, sequence, "User entered queue");
        Ok(sequence)
    }

    /// Leave the queue. `false` means the user was not waiting.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    pub async fn leave_queue(&self, event: &EventId, user: &UserId) -> Result<bool> {
        let removed = self.store.leave_queue(event, user).await?;
        tracing::info!(event_id = %event, user_id = %user, removed, "User left queue");
        Ok(removed)
    }

    /// Current rank, waiting total and admission flag.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    pub async fn queue_status(&self, event: &EventId, user: &UserId) -> Result<QueueStatus> {
        self.store.queue_status(event, user).await
    }

    /// Try to take a working slot.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    /// An unreachable store never admits.
    pub async fn enter_ticketing(&self, event: &EventId, user: &UserId) -> Result<Admission> {
        let max = self.max_concurrent(event).await?;
        let started = Instant::now();
        let admission = self
            .store
            .enter_ticketing(event, user, max, self.config.working_lease_ttl)
            .await?;
        AdmissionMetrics::record_admission(admission.is_granted(), started.elapsed());

        if admission.is_granted() {
            tracing::info!(event_id = %event, user_id = %user, max_concurrent = max, "Working slot granted");
        } else {
            tracing::debug!(event_id = %event, user_id = %user, max_concurrent = max, "Working slot denied");
        }
        Ok(admission)
    }

    /// Client-initiated admission request.
    ///
    /// Only a user already holding a slot or waiting within the promotion
    /// threshold reaches the store; everyone else is denied without touching
    /// the pool.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    pub async fn request_ticketing(&self, event: &EventId, user: &UserId) -> Result<Admission> {
        let status = self.store.queue_status(event, user).await?;

        if status.is_admitted || self.is_promotable(&status) {
            return self.enter_ticketing(event, user).await;
        }

        AdmissionMetrics::record_admission(false, Duration::ZERO);
        tracing::debug!(
            event_id = %event,
            user_id = %user,
            position = status.position,
            "Working slot request outside promotion range"
        );
        Ok(Admission::Denied)
    }

    /// Give the working slot back. A second call is a no-op returning `false`.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    pub async fn leave_ticketing(&self, event: &EventId, user: &UserId) -> Result<bool> {
        let released = self.store.leave_ticketing(event, user).await?;
        if released {
            AdmissionMetrics::record_slot_released("leave");
            tracing::info!(event_id = %event, user_id = %user, "Working slot released");
        }
        Ok(released)
    }

    /// One status tick: report the position and promote the user if they are
    /// close enough to the front.
    ///
    /// On admission the `COMPLETED` message is pushed through the notifier;
    /// a failed push is logged and reported as `notified: false`.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    pub async fn advance(&self, event: &EventId, user: &UserId) -> Result<QueueTick> {
        let status = self.store.queue_status(event, user).await?;

        if !self.is_promotable(&status) {
            return Ok(QueueTick { message: self.render(event, user, &status), notified: false });
        }

        match self.enter_ticketing(event, user).await? {
            Admission::Denied => Ok(QueueTick { message: self.render(event, user, &status), notified: false }),
            Admission::Granted => {
                let message =
                    QueueStatusMessage::completed(user.clone(), event.clone(), status.total_waiting.saturating_sub(1));
                let notified = match self.notifier.notify(user, message.clone().into()).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(event_id = %event, user_id = %user, error = %e, "Admission notice not delivered");
                        false
                    }
                };
                Ok(QueueTick { message, notified })
            }
        }
    }

    /// The real-time status message for the user.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    pub async fn status_message(&self, event: &EventId, user: &UserId) -> Result<QueueStatusMessage> {
        let status = self.store.queue_status(event, user).await?;
        Ok(self.render(event, user, &status))
    }

    /// Effective capacity: the operator override, else the configured default.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    pub async fn max_concurrent(&self, event: &EventId) -> Result<u32> {
        let counters = self.store.slot_counters(event).await?;
        Ok(counters.max_override.unwrap_or(self.config.default_max_concurrent))
    }

    /// Current slot usage.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the store cannot be reached.
    pub async fn slot_usage(&self, event: &EventId) -> Result<SlotUsage> {
        let counters = self.store.slot_counters(event).await?;
        Ok(SlotUsage::new(counters, self.config.default_max_concurrent))
    }

    /// Override the capacity of one event.
    ///
    /// Lowering the capacity below the active count does not evict anyone;
    /// admissions stay closed until enough slots are released.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::InvalidCapacity` for zero, `QueueError::LockBusy`
    /// if another operator holds the event, or `QueueError::StoreUnavailable`.
    pub async fn set_max_concurrent(&self, event: &EventId, max: u32) -> Result<SlotUsage> {
        if max == 0 {
            return Err(QueueError::InvalidCapacity);
        }

        self.lock
            .with_lock(&admin_lock(event), || async {
                self.store.set_max_concurrent(event, max).await?;
                tracing::info!(event_id = %event, max_concurrent = max, "Capacity override set");
                self.slot_usage(event).await
            })
            .await
    }

    /// Remove the capacity override. Returns `false` if none was set.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::LockBusy` or `QueueError::StoreUnavailable`.
    pub async fn clear_max_concurrent(&self, event: &EventId) -> Result<bool> {
        self.lock
            .with_lock(&admin_lock(event), || async {
                let cleared = self.store.clear_max_concurrent(event).await?;
                tracing::info!(event_id = %event, cleared, "Capacity override cleared");
                Ok(cleared)
            })
            .await
    }

    /// Return one slot to the pool without touching any lease.
    ///
    /// For operators repairing a counter after an incident. Returns `false`
    /// if the counter was already zero.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::LockBusy` or `QueueError::StoreUnavailable`.
    pub async fn release_one_slot(&self, event: &EventId) -> Result<bool> {
        self.lock
            .with_lock(&admin_lock(event), || async {
                let released = self.store.release_slot(event).await?;
                if released {
                    AdmissionMetrics::record_slot_released("operator");
                }
                tracing::warn!(event_id = %event, released, "Operator released a working slot");
                Ok(released)
            })
            .await
    }

    /// Delete the slot counter and capacity override of a finished sale.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::SlotsStillActive` while any slot is held,
    /// `QueueError::LockBusy` or `QueueError::StoreUnavailable`.
    pub async fn close_event(&self, event: &EventId) -> Result<()> {
        self.lock
            .with_lock(&admin_lock(event), || async {
                let counters = self.store.slot_counters(event).await?;
                if counters.current > 0 {
                    return Err(QueueError::SlotsStillActive { active: counters.current });
                }

                self.store.delete_slot_counters(event).await?;
                tracing::info!(event_id = %event, "Event slot counters deleted");
                Ok(())
            })
            .await
    }

    const fn is_promotable(&self, status: &QueueStatus) -> bool {
        !status.is_admitted && status.is_waiting() && status.position.unsigned_abs() <= self.config.promote_threshold
    }

    fn render(&self, event: &EventId, user: &UserId, status: &QueueStatus) -> QueueStatusMessage {
        QueueStatusMessage::new(user.clone(), event.clone(), status, self.config.almost_done_threshold)
    }
}

fn admin_lock(event: &EventId) -> String {
    format!("queue-admin:{event}")
}
