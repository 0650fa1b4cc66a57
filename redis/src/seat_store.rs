//! `SeatLockStore` over Redis.
//!
//! Leases are JSON so the release scripts can check ownership with `cjson`
//! without a round trip to the client.
//!
//! Bulk release and consume read the keys they need first, then pass them to
//! a script that re-checks the snapshot and reports a mismatch instead of
//! guessing key names. A mismatch is retried a few times.

use crate::store::{RedisStore, store_err, ttl_secs};
use ficket_core::keys;
use ficket_core::providers::SeatLockStore;
use ficket_core::{
    EventScheduleId, QueueError, Result, SeatHold, SeatLease, SeatMappingId, SeatRelease, UserId,
};
use redis::AsyncCommands;
use std::time::Duration;

/// Read-then-verify rounds before a concurrently changing key is reported busy.
const SNAPSHOT_ATTEMPTS: usize = 3;

const CONSUMED: i64 = 1;
const HOLDER_CHANGED: i64 = 2;

fn decode_lease(raw: Option<String>) -> Result<Option<SeatLease>> {
    raw.map(|json| serde_json::from_str(&json)).transpose().map_err(Into::into)
}

impl SeatLockStore for RedisStore {
    async fn has_selection(&self, schedule: &EventScheduleId, user: &UserId) -> Result<bool> {
        let mut conn = self.conn();

        conn.exists(keys::seat_selection(schedule, user))
            .await
            .map_err(store_err("check seat selection"))
    }

    async fn preoccupy(
        &self,
        schedule: &EventScheduleId,
        user: &UserId,
        leases: &[SeatLease],
        ttl: Duration,
    ) -> Result<SeatHold> {
        let mut conn = self.conn();
        let seats: Vec<SeatMappingId> = leases.iter().map(|l| l.seat_mapping_id.clone()).collect();

        let mut invocation = self.scripts.preoccupy_seats.prepare_invoke();
        invocation.key(keys::seat_selection(schedule, user));
        for seat in &seats {
            invocation.key(keys::seat_lock(schedule, seat));
        }
        invocation.arg(ttl_secs(ttl));
        for lease in leases {
            invocation.arg(serde_json::to_string(lease)?);
        }
        for seat in &seats {
            invocation.arg(seat.as_str());
        }

        let reply: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(store_err("preoccupy seats"))?;

        Ok(SeatHold::from_reply(reply, &seats))
    }

    async fn release(
        &self,
        schedule: &EventScheduleId,
        user: &UserId,
        seats: &[SeatMappingId],
    ) -> Result<Vec<SeatRelease>> {
        let mut conn = self.conn();

        let mut invocation = self.scripts.release_seats.prepare_invoke();
        invocation.key(keys::seat_selection(schedule, user));
        for seat in seats {
            invocation.key(keys::seat_lock(schedule, seat));
        }
        invocation.arg(user.as_str());
        for seat in seats {
            invocation.arg(seat.as_str());
        }

        let codes: Vec<i64> = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(store_err("release seats"))?;

        Ok(codes.into_iter().map(SeatRelease::from_reply).collect())
    }

    async fn release_all(&self, schedule: &EventScheduleId, user: &UserId) -> Result<Vec<SeatMappingId>> {
        let selection = keys::seat_selection(schedule, user);

        for _ in 0..SNAPSHOT_ATTEMPTS {
            let seats = self.selected_seats(schedule, user).await?;
            let mut conn = self.conn();

            let mut invocation = self.scripts.release_all_seats.prepare_invoke();
            invocation.key(&selection);
            for seat in &seats {
                invocation.key(keys::seat_lock(schedule, seat));
            }
            invocation.arg(user.as_str());
            for seat in &seats {
                invocation.arg(seat.as_str());
            }

            let released: Option<Vec<String>> = invocation
                .invoke_async(&mut conn)
                .await
                .map_err(store_err("release user seats"))?;

            match released {
                Some(released) => return released.into_iter().map(SeatMappingId::parse).collect(),
                None => tracing::debug!(%schedule, user_id = %user, "Seat selection changed while releasing, retrying"),
            }
        }

        Err(QueueError::LockBusy { name: selection })
    }

    async fn lease(&self, schedule: &EventScheduleId, seat: &SeatMappingId) -> Result<Option<SeatLease>> {
        let mut conn = self.conn();

        let raw: Option<String> = conn
            .get(keys::seat_lock(schedule, seat))
            .await
            .map_err(store_err("read seat lease"))?;

        decode_lease(raw)
    }

    async fn consume(&self, schedule: &EventScheduleId, seat: &SeatMappingId) -> Result<Option<SeatLease>> {
        let lease_key = keys::seat_lock(schedule, seat);

        for _ in 0..SNAPSHOT_ATTEMPTS {
            let Some(lease) = self.lease(schedule, seat).await? else {
                return Ok(None);
            };
            let mut conn = self.conn();

            let (outcome, raw): (i64, Option<String>) = self
                .scripts
                .consume_seat_lease
                .key(&lease_key)
                .key(keys::seat_selection(schedule, &lease.user_id))
                .arg(lease.user_id.as_str())
                .arg(seat.as_str())
                .invoke_async(&mut conn)
                .await
                .map_err(store_err("consume seat lease"))?;

            match outcome {
                CONSUMED => return decode_lease(raw),
                HOLDER_CHANGED => {
                    tracing::debug!(%schedule, %seat, "Seat lease changed hands while consuming, retrying");
                }
                _ => return Ok(None),
            }
        }

        Err(QueueError::LockBusy { name: lease_key })
    }

    async fn selected_seats(&self, schedule: &EventScheduleId, user: &UserId) -> Result<Vec<SeatMappingId>> {
        let mut conn = self.conn();

        let members: Vec<String> = conn
            .smembers(keys::seat_selection(schedule, user))
            .await
            .map_err(store_err("read seat selection"))?;

        let mut seats = members
            .into_iter()
            .map(SeatMappingId::parse)
            .collect::<Result<Vec<_>>>()?;
        seats.sort();
        Ok(seats)
    }
}
