//! `QueueStore` over Redis.

use crate::store::{RedisStore, store_err, ttl_secs};
use ficket_core::keys::{self, ExpiredKey, QueueKeys};
use ficket_core::providers::QueueStore;
use ficket_core::{Admission, EventId, QueueStatus, ReapOutcome, Result, SlotCounters, UserId};
use redis::AsyncCommands;
use std::time::Duration;

/// Keys fetched per SCAN round trip.
const SCAN_BATCH: usize = 500;

impl QueueStore for RedisStore {
    async fn enter_queue(&self, event: &EventId, user: &UserId) -> Result<u64> {
        let mut conn = self.conn();
        let keys = QueueKeys::new(event);

        let sequence: u64 = self
            .scripts
            .enter_queue
            .key(keys.next())
            .key(keys.waiting())
            .arg(user.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(store_err("enter queue"))?;

        tracing::debug!(event_id = %event, user_id = %user, sequence, "Entered waiting queue");

        Ok(sequence)
    }

    async fn leave_queue(&self, event: &EventId, user: &UserId) -> Result<bool> {
        let mut conn = self.conn();

        let removed: i64 = conn
            .zrem(QueueKeys::new(event).waiting(), user.as_str())
            .await
            .map_err(store_err("leave queue"))?;

        Ok(removed > 0)
    }

    async fn queue_status(&self, event: &EventId, user: &UserId) -> Result<QueueStatus> {
        let mut conn = self.conn();
        let keys = QueueKeys::new(event);
        let waiting = keys.waiting();

        let (rank, total, admitted): (Option<u64>, u64, bool) = redis::pipe()
            .atomic()
            .zrank(&waiting, user.as_str())
            .zcard(&waiting)
            .exists(keys.working(user))
            .query_async(&mut conn)
            .await
            .map_err(store_err("read queue status"))?;

        Ok(QueueStatus::from_rank(rank, total, admitted))
    }

    async fn enter_ticketing(
        &self,
        event: &EventId,
        user: &UserId,
        max_concurrent: u32,
        lease_ttl: Duration,
    ) -> Result<Admission> {
        let mut conn = self.conn();
        let keys = QueueKeys::new(event);
        let ttl = ttl_secs(lease_ttl);

        let reply: i64 = self
            .scripts
            .enter_ticketing
            .key(keys.waiting())
            .key(keys.current())
            .key(keys.working(user))
            .key(keys.lease_marker(user))
            .arg(user.as_str())
            .arg(max_concurrent)
            .arg(ttl)
            .arg(ttl + ttl_secs(self.marker_margin))
            .invoke_async(&mut conn)
            .await
            .map_err(store_err("enter ticketing"))?;

        Ok(Admission::from_reply(reply))
    }

    async fn leave_ticketing(&self, event: &EventId, user: &UserId) -> Result<bool> {
        let mut conn = self.conn();
        let keys = QueueKeys::new(event);

        let reply: i64 = self
            .scripts
            .leave_ticketing
            .key(keys.current())
            .key(keys.working(user))
            .key(keys.lease_marker(user))
            .invoke_async(&mut conn)
            .await
            .map_err(store_err("leave ticketing"))?;

        Ok(reply == 1)
    }

    async fn reap_working_lease(&self, event: &EventId, user: &UserId) -> Result<ReapOutcome> {
        let mut conn = self.conn();
        let keys = QueueKeys::new(event);

        let reply: i64 = self
            .scripts
            .reap_working_lease
            .key(keys.current())
            .key(keys.working(user))
            .key(keys.lease_marker(user))
            .invoke_async(&mut conn)
            .await
            .map_err(store_err("reap working lease"))?;

        Ok(ReapOutcome::from_reply(reply))
    }

    async fn release_slot(&self, event: &EventId) -> Result<bool> {
        let mut conn = self.conn();

        let reply: i64 = self
            .scripts
            .leave_screen
            .key(QueueKeys::new(event).current())
            .invoke_async(&mut conn)
            .await
            .map_err(store_err("release slot"))?;

        Ok(reply == 1)
    }

    async fn slot_counters(&self, event: &EventId) -> Result<SlotCounters> {
        let mut conn = self.conn();
        let keys = QueueKeys::new(event);

        let (current, max_override, waiting): (Option<i64>, Option<u32>, u64) = redis::pipe()
            .get(keys.current())
            .get(keys.max_concurrent())
            .zcard(keys.waiting())
            .query_async(&mut conn)
            .await
            .map_err(store_err("read slot counters"))?;

        Ok(SlotCounters {
            current: current.and_then(|c| u64::try_from(c).ok()).unwrap_or(0),
            max_override,
            waiting,
        })
    }

    async fn set_max_concurrent(&self, event: &EventId, max: u32) -> Result<()> {
        let mut conn = self.conn();

        let _: () = conn
            .set(QueueKeys::new(event).max_concurrent(), max)
            .await
            .map_err(store_err("set max concurrent"))?;

        Ok(())
    }

    async fn clear_max_concurrent(&self, event: &EventId) -> Result<bool> {
        let mut conn = self.conn();

        let removed: i64 = conn
            .del(QueueKeys::new(event).max_concurrent())
            .await
            .map_err(store_err("clear max concurrent"))?;

        Ok(removed > 0)
    }

    async fn delete_slot_counters(&self, event: &EventId) -> Result<()> {
        let mut conn = self.conn();
        let keys = QueueKeys::new(event);

        let _: () = redis::pipe()
            .atomic()
            .del(keys.current())
            .ignore()
            .del(keys.max_concurrent())
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(store_err("delete slot counters"))?;

        Ok(())
    }

    async fn orphaned_leases(&self) -> Result<Vec<(EventId, UserId)>> {
        let mut conn = self.conn();
        let pattern = keys::lease_marker_pattern();

        let mut markers = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(store_err("scan lease markers"))?;

            markers.extend(batch.iter().filter_map(|key| match ExpiredKey::parse(key) {
                ExpiredKey::LeaseMarker { event, user } => Some((event, user)),
                _ => None,
            }));

            if next == 0 {
                break;
            }
            cursor = next;
        }

        if markers.is_empty() {
            return Ok(markers);
        }

        let mut pipe = redis::pipe();
        for (event, user) in &markers {
            pipe.exists(QueueKeys::new(event).working(user));
        }
        let live: Vec<bool> = pipe
            .query_async(&mut conn)
            .await
            .map_err(store_err("check working leases"))?;

        Ok(markers
            .into_iter()
            .zip(live)
            .filter_map(|(lease, live)| (!live).then_some(lease))
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn();

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(store_err("ping Redis"))?;

        Ok(())
    }
}
