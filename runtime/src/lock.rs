//! Scoped named locks.
//!
//! [`NamedLock::with_lock`] acquires, runs the operation, and releases on every
//! exit path, panics included. The lock also carries a TTL so a crashed holder
//! cannot block others forever.

use crate::config::LockConfig;
use ficket_core::providers::NamedLockStore;
use ficket_core::{QueueError, Result};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::time::Instant;

/// Named lock helper over a [`NamedLockStore`].
#[derive(Debug, Clone)]
pub struct NamedLock<L> {
    store: L,
    config: LockConfig,
}

impl<L: NamedLockStore> NamedLock<L> {
    /// Create a lock helper.
    #[must_use]
    pub const fn new(store: L, config: LockConfig) -> Self {
        Self { store, config }
    }

    /// Run `op` while holding the lock `name`.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::LockBusy` if the lock stays taken for the whole
    /// wait budget, store errors from acquisition, or the error of `op`.
    pub async fn with_lock<F, Fut, T>(&self, name: &str, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let token = self.acquire(name).await?;
        tracing::debug!(lock = name, "Acquired named lock");

        let outcome = AssertUnwindSafe(op()).catch_unwind().await;

        if let Err(e) = self.store.release(name, &token).await {
            tracing::error!(lock = name, error = %e, "Failed to release named lock; it will lapse by TTL");
        }

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn acquire(&self, name: &str) -> Result<String> {
        let token = uuid::Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.config.wait;
        let mut attempt = 0;

        loop {
            if self.store.try_acquire(name, &token, self.config.lease).await? {
                return Ok(token);
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(lock = name, attempts = attempt + 1, "Named lock busy");
                return Err(QueueError::LockBusy { name: name.to_string() });
            }

            let delay = self.config.backoff.jittered_delay(attempt).min(deadline - now);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
