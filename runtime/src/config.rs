//! Service configuration.
//!
//! Values are provided by the application (see the server's `Config::from_env`);
//! the defaults below match a single mid-sized sale.

use crate::retry::RetryPolicy;
use std::time::Duration;

/// Waiting queue and working slot configuration.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Lifetime of a working lease.
    ///
    /// Default: 20 minutes
    pub working_lease_ttl: Duration,

    /// Slot capacity when no operator override is set.
    ///
    /// Default: 100
    pub default_max_concurrent: u32,

    /// Highest zero-based rank that is offered admission on a status tick.
    ///
    /// Default: 1
    pub promote_threshold: u64,

    /// Highest rank reported as `ALMOST_DONE`.
    ///
    /// Default: 100
    pub almost_done_threshold: u64,
}

impl AdmissionConfig {
    /// Set working lease lifetime.
    #[must_use]
    pub const fn with_working_lease_ttl(mut self, ttl: Duration) -> Self {
        self.working_lease_ttl = ttl;
        self
    }

    /// Set default slot capacity.
    #[must_use]
    pub const fn with_default_max_concurrent(mut self, max: u32) -> Self {
        self.default_max_concurrent = max;
        self
    }

    /// Set promotion rank threshold.
    #[must_use]
    pub const fn with_promote_threshold(mut self, rank: u64) -> Self {
        self.promote_threshold = rank;
        self
    }

    /// Set the `ALMOST_DONE` rank threshold.
    #[must_use]
    pub const fn with_almost_done_threshold(mut self, rank: u64) -> Self {
        self.almost_done_threshold = rank;
        self
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            working_lease_ttl: Duration::from_secs(20 * 60),
            default_max_concurrent: 100,
            promote_threshold: 1,
            almost_done_threshold: 100,
        }
    }
}

/// Seat lease configuration.
#[derive(Debug, Clone)]
pub struct SeatLockConfig {
    /// Lifetime of a seat lease.
    ///
    /// Default: 8 minutes
    pub lease_ttl: Duration,

    /// Upper bound on seats per selection regardless of the caller's limit.
    ///
    /// Default: 4
    pub max_seats_per_selection: u32,
}

impl SeatLockConfig {
    /// Set seat lease lifetime.
    #[must_use]
    pub const fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    /// Set the per-selection seat cap.
    #[must_use]
    pub const fn with_max_seats_per_selection(mut self, max: u32) -> Self {
        self.max_seats_per_selection = max;
        self
    }
}

impl Default for SeatLockConfig {
    fn default() -> Self {
        Self {
            lease_ttl: Duration::from_secs(8 * 60),
            max_seats_per_selection: 4,
        }
    }
}

/// Real-time connection configuration.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Interval between queue status pushes.
    ///
    /// Default: 5 seconds
    pub status_interval: Duration,

    /// How long a dropped connection may take to come back before its
    /// resources are released.
    ///
    /// Default: 5 seconds
    pub disconnect_grace: Duration,

    /// Per-connection notice buffer.
    ///
    /// Default: 32
    pub notice_buffer: usize,

    /// Maximum concurrent connections per process.
    ///
    /// Default: 10,000
    pub max_connections: usize,

    /// Close sockets that send nothing for this long.
    ///
    /// Default: 5 minutes
    pub idle_timeout: Duration,
}

impl RealtimeConfig {
    /// Set status push interval.
    #[must_use]
    pub const fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    /// Set disconnect grace window.
    #[must_use]
    pub const fn with_disconnect_grace(mut self, grace: Duration) -> Self {
        self.disconnect_grace = grace;
        self
    }

    /// Set per-connection notice buffer.
    #[must_use]
    pub const fn with_notice_buffer(mut self, buffer: usize) -> Self {
        self.notice_buffer = buffer;
        self
    }

    /// Set connection limit.
    #[must_use]
    pub const fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set idle timeout.
    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_secs(5),
            disconnect_grace: Duration::from_secs(5),
            notice_buffer: 32,
            max_connections: 10_000,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// Named lock configuration.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Lock lifetime; bounds how long a crashed holder blocks others.
    ///
    /// Default: 10 seconds
    pub lease: Duration,

    /// Total time spent waiting for a busy lock.
    ///
    /// Default: 3 seconds
    pub wait: Duration,

    /// Delay schedule between acquisition attempts.
    pub backoff: RetryPolicy,
}

impl LockConfig {
    /// Set lock lifetime.
    #[must_use]
    pub const fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Set acquisition wait budget.
    #[must_use]
    pub const fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(10),
            wait: Duration::from_secs(3),
            backoff: RetryPolicy::builder()
                .initial_delay(Duration::from_millis(20))
                .max_delay(Duration::from_millis(250))
                .multiplier(2.0)
                .build(),
        }
    }
}
