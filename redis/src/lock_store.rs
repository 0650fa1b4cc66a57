//! `NamedLockStore` over Redis: `SET NX PX` to acquire, compare-and-delete to release.

use crate::store::{RedisStore, store_err};
use ficket_core::keys;
use ficket_core::providers::NamedLockStore;
use ficket_core::Result;
use std::time::Duration;

impl NamedLockStore for RedisStore {
    async fn try_acquire(&self, name: &str, token: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let reply: Option<String> = redis::cmd("SET")
            .arg(keys::named_lock(name))
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(store_err("acquire named lock"))?;

        Ok(reply.is_some())
    }

    async fn release(&self, name: &str, token: &str) -> Result<bool> {
        let mut conn = self.conn();

        let deleted: i64 = self
            .scripts
            .release_named_lock
            .key(keys::named_lock(name))
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err("release named lock"))?;

        if deleted == 0 {
            tracing::warn!(lock = name, "Named lock was no longer held at release");
        }

        Ok(deleted == 1)
    }
}
