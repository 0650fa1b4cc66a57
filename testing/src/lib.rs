//! # Ficket Testing
//!
//! Test doubles for the Ficket store and notifier traits.
//!
//! This crate provides:
//! - [`InMemoryStore`]: every store trait plus the expiry feed, with TTLs driven
//!   by a [`ManualClock`] and injectable outages
//! - [`RecordingNotifier`]: captures notices, can simulate undeliverable users
//!
//! ## Example
//!
//! ```
//! use ficket_testing::InMemoryStore;
//! use std::time::Duration;
//!
//! let store = InMemoryStore::new();
//! let expired = store.advance(Duration::from_secs(60));
//! assert!(expired.is_empty());
//! ```

use chrono::{DateTime, Utc};
use ficket_core::environment::Clock;

mod memory_store;

pub use memory_store::InMemoryStore;

/// Mock implementations of environment and notifier traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use ficket_core::providers::Notifier;
    use ficket_core::{Notice, QueueError, Result, UserId};
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    /// Clock that only moves when told to.
    ///
    /// Clones share the same time, so a store and the services under test can
    /// observe one timeline.
    ///
    /// # Example
    ///
    /// ```
    /// use ficket_testing::mocks::test_clock;
    /// use ficket_core::environment::Clock;
    /// use std::time::Duration;
    ///
    /// let clock = test_clock();
    /// let before = clock.now();
    /// clock.advance(Duration::from_secs(5));
    /// assert_eq!((clock.now() - before).num_seconds(), 5);
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        now: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock stopped at `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self { now: Arc::new(Mutex::new(time)) }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: Duration) {
            let delta = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::days(3650));
            let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
            *now += delta;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a clock stopped at 2026-01-01 00:00:00 UTC.
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which cannot happen.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> ManualClock {
        ManualClock::new(
            DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Notifier that records every notice.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingNotifier {
        sent: Arc<Mutex<Vec<Notice>>>,
        unreachable: Arc<Mutex<HashSet<UserId>>>,
    }

    impl RecordingNotifier {
        /// Create an empty recorder.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Treat `user` as disconnected from now on.
        pub fn disconnect(&self, user: &UserId) {
            self.unreachable
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(user.clone());
        }

        /// Every delivered notice, in order.
        #[must_use]
        pub fn notices(&self) -> Vec<Notice> {
            self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        /// Delivered notices addressed to `user`.
        #[must_use]
        pub fn notices_for(&self, user: &UserId) -> Vec<Notice> {
            self.notices()
                .into_iter()
                .filter(|notice| notice.user_id() == user)
                .collect()
        }
    }

    impl Notifier for RecordingNotifier {
        async fn notify(&self, user: &UserId, notice: Notice) -> Result<()> {
            if self
                .unreachable
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(user)
            {
                return Err(QueueError::NotificationUndeliverable { user: user.clone() });
            }

            self.sent.lock().unwrap_or_else(PoisonError::into_inner).push(notice);
            Ok(())
        }
    }
}

pub use mocks::{ManualClock, RecordingNotifier, test_clock};
