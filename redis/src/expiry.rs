//! Keyspace expiration feed.
//!
//! Redis publishes `__keyevent@{db}__:expired` with the key name as payload
//! when notifications include `E` and `x`. Delivery is fire-and-forget: events
//! emitted while no subscriber is connected are lost, which the orphan sweep
//! in the expiry reactor makes up for.

use ficket_core::providers::{ExpiredKeyStream, ExpiryFeed};
use ficket_core::{QueueError, Result};
use futures::StreamExt;
use redis::Client;

/// Subscribes to expired-key events of one logical database.
#[derive(Clone)]
pub struct RedisExpiryFeed {
    client: Client,
    database: i64,
    configure_notifications: bool,
}

impl RedisExpiryFeed {
    /// Create a feed for the database selected by `redis_url`.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreUnavailable` if the URL is invalid.
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| QueueError::StoreUnavailable(format!("Failed to create Redis client: {e}")))?;
        let database = client.get_connection_info().redis.db;

        Ok(Self { client, database, configure_notifications: false })
    }

    /// Issue `CONFIG SET notify-keyspace-events Ex` before each subscription.
    ///
    /// Managed Redis offerings often reject `CONFIG`; leave this off there and
    /// set the parameter out of band.
    #[must_use]
    pub const fn with_configure_notifications(mut self, enabled: bool) -> Self {
        self.configure_notifications = enabled;
        self
    }

    /// The channel carrying expired key names.
    #[must_use]
    pub fn channel(&self) -> String {
        format!("__keyevent@{}__:expired", self.database)
    }

    async fn enable_notifications(&self) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(|e| {
            QueueError::StoreUnavailable(format!("Failed to connect for CONFIG SET: {e}"))
        })?;

        let _: () = redis::cmd("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg("Ex")
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::StoreUnavailable(format!("Failed to enable keyspace notifications: {e}")))?;

        Ok(())
    }
}

impl std::fmt::Debug for RedisExpiryFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisExpiryFeed")
            .field("database", &self.database)
            .field("configure_notifications", &self.configure_notifications)
            .finish_non_exhaustive()
    }
}

impl ExpiryFeed for RedisExpiryFeed {
    async fn subscribe(&self) -> Result<ExpiredKeyStream> {
        if self.configure_notifications {
            self.enable_notifications().await?;
        }

        let channel = self.channel();
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| QueueError::StoreUnavailable(format!("Failed to open pub/sub connection: {e}")))?;

        pubsub
            .subscribe(&channel)
            .await
            .map_err(|e| QueueError::StoreUnavailable(format!("Failed to subscribe to {channel}: {e}")))?;

        tracing::info!(channel = %channel, "Subscribed to key expirations");

        let stream = pubsub.into_on_message().filter_map(|message| async move {
            match message.get_payload::<String>() {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping undecodable expiration payload");
                    None
                }
            }
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn channel_follows_selected_database() {
        let feed = RedisExpiryFeed::new("redis://127.0.0.1:6379/3").unwrap();
        assert_eq!(feed.channel(), "__keyevent@3__:expired");

        let feed = RedisExpiryFeed::new("redis://127.0.0.1:6379").unwrap();
        assert_eq!(feed.channel(), "__keyevent@0__:expired");
    }
}
