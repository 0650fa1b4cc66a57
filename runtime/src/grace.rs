//! Disconnect grace window.
//!
//! A dropped socket is treated as an implicit cancellation only after the
//! grace window, so a page reload or a flaky network does not cost the user
//! their place. [`DisconnectGrace::schedule`] starts a cancellable delayed
//! task; a reconnect or keep-alive cancels it. When the window elapses and the
//! user is still gone, the [`ReleasePlan`] runs through a [`ReleaseSession`].

use crate::admission::QueueAdmissionService;
use crate::metrics::RealtimeMetrics;
use crate::registry::{ChannelKey, ConnectionRegistry};
use crate::retry::{RetryPolicy, retry_with_predicate};
use crate::seat_lock::SeatLockCoordinator;
use ficket_core::providers::{NamedLockStore, Notifier, QueueStore, SeatLockStore};
use ficket_core::{EventId, EventScheduleId, QueueError, UserId};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What to release once the window elapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleasePlan {
    /// Drop the user's place in the waiting queue.
    LeaveQueue {
        /// Event of the queue
        event: EventId,
    },
    /// Give back the working slot and, if known, every seat lease.
    ReleaseWork {
        /// Event of the working slot
        event: EventId,
        /// Schedule whose seat leases to release
        schedule: Option<EventScheduleId>,
    },
}

impl ReleasePlan {
    /// The channel whose disconnect this plan cleans up after.
    #[must_use]
    pub fn channel(&self) -> ChannelKey {
        match self {
            Self::LeaveQueue { event } => ChannelKey::Queue(event.clone()),
            Self::ReleaseWork { event, .. } => ChannelKey::Work(event.clone()),
        }
    }
}

/// Executes a [`ReleasePlan`].
pub trait ReleaseSession: Send + Sync + 'static {
    /// Release the user's resources. Failures are handled inside.
    fn release(&self, user: UserId, plan: ReleasePlan) -> BoxFuture<'static, ()>;
}

/// [`ReleaseSession`] over the admission and seat services.
///
/// Transient store failures are retried; anything left behind lapses by TTL.
pub struct SessionReleaser<Q, L, N, S> {
    admission: Arc<QueueAdmissionService<Q, L, N>>,
    seats: Arc<SeatLockCoordinator<S>>,
    retry: RetryPolicy,
}

impl<Q, L, N, S> SessionReleaser<Q, L, N, S> {
    /// Create a releaser with three retries.
    #[must_use]
    pub fn new(admission: Arc<QueueAdmissionService<Q, L, N>>, seats: Arc<SeatLockCoordinator<S>>) -> Self {
        Self { admission, seats, retry: RetryPolicy::builder().max_retries(3).build() }
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl<Q, L, N, S> ReleaseSession for SessionReleaser<Q, L, N, S>
where
    Q: QueueStore + 'static,
    L: NamedLockStore + 'static,
    N: Notifier + 'static,
    S: SeatLockStore + 'static,
{
    fn release(&self, user: UserId, plan: ReleasePlan) -> BoxFuture<'static, ()> {
        let admission = Arc::clone(&self.admission);
        let seats = Arc::clone(&self.seats);
        let retry = self.retry.clone();

        Box::pin(async move {
            match plan {
                ReleasePlan::LeaveQueue { event } => {
                    let result = retry_with_predicate(
                        retry,
                        || admission.leave_queue(&event, &user),
                        QueueError::is_retryable,
                    )
                    .await;
                    if let Err(e) = result {
                        tracing::error!(event_id = %event, user_id = %user, error = %e, "Failed to leave queue after disconnect");
                    }
                }
                ReleasePlan::ReleaseWork { event, schedule } => {
                    let result = retry_with_predicate(
                        retry.clone(),
                        || admission.leave_ticketing(&event, &user),
                        QueueError::is_retryable,
                    )
                    .await;
                    if let Err(e) = result {
                        tracing::error!(event_id = %event, user_id = %user, error = %e, "Failed to release working slot after disconnect");
                    }

                    if let Some(schedule) = schedule {
                        let result = retry_with_predicate(
                            retry,
                            || seats.release_all(&schedule, &user),
                            QueueError::is_retryable,
                        )
                        .await;
                        if let Err(e) = result {
                            tracing::error!(event_schedule_id = %schedule, user_id = %user, error = %e, "Failed to release seats after disconnect");
                        }
                    }
                }
            }
        })
    }
}

struct Pending {
    generation: u64,
    token: CancellationToken,
}

type PendingKey = (UserId, ChannelKey);

struct Inner {
    registry: ConnectionRegistry,
    window: Duration,
    releaser: Arc<dyn ReleaseSession>,
    pending: Mutex<HashMap<PendingKey, Pending>>,
    generation: AtomicU64,
}

/// Delayed, cancellable release of a disconnected user's resources.
#[derive(Clone)]
pub struct DisconnectGrace {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DisconnectGrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisconnectGrace")
            .field("window", &self.inner.window)
            .finish_non_exhaustive()
    }
}

impl DisconnectGrace {
    /// Create the grace handler.
    #[must_use]
    pub fn new(registry: ConnectionRegistry, window: Duration, releaser: Arc<dyn ReleaseSession>) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                window,
                releaser,
                pending: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Start the window for `user` on the plan's channel, replacing any window
    /// already running there.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule(&self, user: &UserId, plan: ReleasePlan) {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let key = (user.clone(), plan.channel());

        if let Some(previous) = self.pending().insert(key, Pending { generation, token: token.clone() }) {
            previous.token.cancel();
        }
        tracing::debug!(user_id = %user, ?plan, "Disconnect grace window started");

        let this = self.clone();
        let user = user.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => return,
                () = tokio::time::sleep(this.inner.window) => {}
            }
            this.expire(user, generation, plan).await;
        });
    }

    /// Stop the window for `user` on `channel`. Returns `true` if one was running.
    pub fn cancel(&self, user: &UserId, channel: &ChannelKey) -> bool {
        match self.pending().remove(&(user.clone(), channel.clone())) {
            Some(pending) => {
                pending.token.cancel();
                tracing::debug!(user_id = %user, %channel, "Disconnect grace window cancelled");
                true
            }
            None => false,
        }
    }

    /// Whether a window is running for `user` on `channel`.
    #[must_use]
    pub fn is_pending(&self, user: &UserId, channel: &ChannelKey) -> bool {
        self.pending().contains_key(&(user.clone(), channel.clone()))
    }

    async fn expire(&self, user: UserId, generation: u64, plan: ReleasePlan) {
        let channel = plan.channel();
        {
            let mut pending = self.pending();
            let key = (user.clone(), channel.clone());
            if pending.get(&key).is_none_or(|p| p.generation != generation) {
                return;
            }
            pending.remove(&key);
        }

        if self.inner.registry.is_connected(&user, &channel).await {
            tracing::debug!(user_id = %user, %channel, "User reconnected during grace window");
            return;
        }

        tracing::info!(user_id = %user, ?plan, "Grace window elapsed, releasing session");
        RealtimeMetrics::record_disconnect_release();
        self.inner.releaser.release(user, plan).await;
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<PendingKey, Pending>> {
        self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
