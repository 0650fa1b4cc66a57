//! Connection handling shared by the store implementations.

use crate::scripts::Scripts;
use ficket_core::{QueueError, Result};
use redis::Client;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;

/// How long a lease marker outlives its working lease.
const DEFAULT_MARKER_MARGIN: Duration = Duration::from_secs(3600);

/// Redis-backed queue, seat lease and named lock store.
///
/// Cheap to clone: clones share the connection manager and compiled scripts.
#[derive(Clone)]
pub struct RedisStore {
    /// Connection manager for connection pooling.
    pub(crate) conn_manager: ConnectionManager,
    pub(crate) scripts: Arc<Scripts>,
    pub(crate) marker_margin: Duration,
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the connection fails.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| QueueError::StoreUnavailable(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            QueueError::StoreUnavailable(format!("Failed to create Redis connection manager: {e}"))
        })?;

        Ok(Self::from_connection(conn_manager))
    }

    /// Wrap an existing connection manager.
    #[must_use]
    pub fn from_connection(conn_manager: ConnectionManager) -> Self {
        Self {
            conn_manager,
            scripts: Arc::new(Scripts::load()),
            marker_margin: DEFAULT_MARKER_MARGIN,
        }
    }

    /// Override how long lease markers outlive working leases.
    ///
    /// The margin bounds how long a lapsed lease can wait for the reactor or
    /// the orphan sweep before its slot leaks.
    #[must_use]
    pub const fn with_marker_margin(mut self, margin: Duration) -> Self {
        self.marker_margin = margin;
        self
    }

    /// A connection handle for one operation.
    pub(crate) fn conn(&self) -> ConnectionManager {
        self.conn_manager.clone()
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("marker_margin", &self.marker_margin)
            .finish_non_exhaustive()
    }
}

/// Map a Redis error to `StoreUnavailable` with context.
pub(crate) fn store_err(action: &'static str) -> impl FnOnce(redis::RedisError) -> QueueError {
    move |e| QueueError::StoreUnavailable(format!("Failed to {action}: {e}"))
}

/// TTL in whole seconds, at least one.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
