//! Application state shared by every handler.
//!
//! Cloned per request; everything inside is behind an `Arc` or is itself a
//! cheap handle.

use ficket_core::environment::Clock;
use ficket_runtime::metrics::MetricsRecorder;
use ficket_runtime::{
    AdmissionConfig, ClientNotifier, ConnectionRegistry, DisconnectGrace, LockConfig, NamedLock,
    QueueAdmissionService, RealtimeConfig, ReleaseSession, SeatLockConfig, SeatLockCoordinator,
    SessionReleaser, StoreBackend,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Admission service as wired into the web layer.
pub type Admission<B> = QueueAdmissionService<B, B, ClientNotifier>;

/// Service configuration for [`AppState::new`].
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    /// Waiting queue and working slots
    pub admission: AdmissionConfig,
    /// Seat leases
    pub seats: SeatLockConfig,
    /// WebSocket channels
    pub realtime: RealtimeConfig,
    /// Operator locks
    pub lock: LockConfig,
}

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState<B> {
    store: B,
    admission: Arc<Admission<B>>,
    seats: Arc<SeatLockCoordinator<B>>,
    registry: ConnectionRegistry,
    grace: DisconnectGrace,
    releaser: Arc<dyn ReleaseSession>,
    realtime: RealtimeConfig,
    metrics: Option<MetricsRecorder>,
    active_connections: Arc<AtomicUsize>,
}

impl<B> std::fmt::Debug for AppState<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("realtime", &self.realtime)
            .field("active_connections", &self.active_connections.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<B: StoreBackend> AppState<B> {
    /// Wire every service over `store`.
    #[must_use]
    pub fn new(store: B, clock: Arc<dyn Clock>, config: ServiceConfig) -> Self {
        let registry = ConnectionRegistry::new(config.realtime.notice_buffer);

        let admission = Arc::new(QueueAdmissionService::new(
            store.clone(),
            NamedLock::new(store.clone(), config.lock),
            ClientNotifier::new(registry.clone()),
            config.admission,
        ));
        let seats = Arc::new(SeatLockCoordinator::new(store.clone(), clock, config.seats));

        let releaser: Arc<dyn ReleaseSession> =
            Arc::new(SessionReleaser::new(Arc::clone(&admission), Arc::clone(&seats)));
        let grace = DisconnectGrace::new(registry.clone(), config.realtime.disconnect_grace, Arc::clone(&releaser));

        Self {
            store,
            admission,
            seats,
            registry,
            grace,
            releaser,
            realtime: config.realtime,
            metrics: None,
            active_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Serve `recorder` at `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, recorder: MetricsRecorder) -> Self {
        self.metrics = Some(recorder);
        self
    }

    /// Whether the store answers.
    pub async fn is_ready(&self) -> bool {
        match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Readiness check failed");
                false
            }
        }
    }
}

impl<B> AppState<B> {
    /// Queue admission service.
    #[must_use]
    pub fn admission(&self) -> &Admission<B> {
        &self.admission
    }

    /// Seat lease service.
    #[must_use]
    pub fn seats(&self) -> &SeatLockCoordinator<B> {
        &self.seats
    }

    /// Live connection table.
    #[must_use]
    pub const fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Disconnect grace handler.
    #[must_use]
    pub const fn grace(&self) -> &DisconnectGrace {
        &self.grace
    }

    /// Immediate release, used for explicit leaves.
    #[must_use]
    pub fn releaser(&self) -> &dyn ReleaseSession {
        self.releaser.as_ref()
    }

    /// WebSocket settings.
    #[must_use]
    pub const fn realtime(&self) -> &RealtimeConfig {
        &self.realtime
    }

    /// Installed metrics recorder, if any.
    #[must_use]
    pub const fn metrics(&self) -> Option<&MetricsRecorder> {
        self.metrics.as_ref()
    }

    /// Take a WebSocket slot, or `None` at the connection limit.
    #[must_use]
    pub fn try_acquire_connection(&self) -> Option<ConnectionPermit> {
        let max = self.realtime.max_connections;
        self.active_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| ConnectionPermit { counter: Arc::clone(&self.active_connections) })
    }

    /// Open WebSocket channels.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }
}

/// One WebSocket slot; returned on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    counter: Arc<AtomicUsize>,
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use ficket_testing::InMemoryStore;

    fn state(max_connections: usize) -> AppState<InMemoryStore> {
        let store = InMemoryStore::new();
        let clock = Arc::new(store.clock());
        let config = ServiceConfig {
            realtime: RealtimeConfig::default().with_max_connections(max_connections),
            ..ServiceConfig::default()
        };
        AppState::new(store, clock, config)
    }

    #[tokio::test]
    async fn connection_limit_is_enforced_and_released() {
        let state = state(2);

        let first = state.try_acquire_connection().unwrap();
        let _second = state.try_acquire_connection().unwrap();
        assert!(state.try_acquire_connection().is_none());

        drop(first);
        assert_eq!(state.active_connections(), 1);
        assert!(state.try_acquire_connection().is_some());
    }

    #[tokio::test]
    async fn readiness_follows_store() {
        let store = InMemoryStore::new();
        let state = AppState::new(store.clone(), Arc::new(store.clock()), ServiceConfig::default());
        assert!(state.is_ready().await);

        store.set_unavailable(true);
        assert!(!state.is_ready().await);
    }
}
