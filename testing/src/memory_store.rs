//! In-memory store.
//!
//! Keys and values mirror the Redis layout, so expired key names and lease
//! JSON look exactly like production. Each operation runs under one mutex,
//! which gives the same atomicity as a server-side script.

use crate::mocks::{ManualClock, test_clock};
use chrono::{DateTime, Utc};
use ficket_core::environment::Clock;
use ficket_core::keys::{self, ExpiredKey, QueueKeys};
use ficket_core::providers::{ExpiredKeyStream, ExpiryFeed, NamedLockStore, QueueStore, SeatLockStore};
use ficket_core::{
    Admission, EventId, EventScheduleId, QueueError, QueueStatus, ReapOutcome, Result, SeatHold, SeatLease,
    SeatMappingId, SeatRelease, SlotCounters, UserId,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;

const MARKER_MARGIN: Duration = Duration::from_secs(3600);
const FEED_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
enum Scalar {
    Int(i64),
    Str(String),
}

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, u64>,
    ordered: BTreeSet<(u64, String)>,
}

impl SortedSet {
    fn score(&self, member: &str) -> Option<u64> {
        self.scores.get(member).copied()
    }

    fn add(&mut self, member: &str, score: u64) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.ordered.remove(&(old, member.to_string()));
        }
        self.ordered.insert((score, member.to_string()));
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => self.ordered.remove(&(score, member.to_string())),
            None => false,
        }
    }

    fn rank(&self, member: &str) -> Option<u64> {
        let score = self.score(member)?;
        let ahead = self.ordered.range(..(score, member.to_string())).count();
        u64::try_from(ahead).ok()
    }

    fn len(&self) -> u64 {
        u64::try_from(self.scores.len()).unwrap_or(u64::MAX)
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    scalars: HashMap<String, Entry<Scalar>>,
    sets: HashMap<String, Entry<BTreeSet<String>>>,
    sorted: HashMap<String, SortedSet>,
}

impl Keyspace {
    fn purge(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let lapsed = |at: Option<DateTime<Utc>>| at.is_some_and(|at| at <= now);

        let mut expired: Vec<String> = self
            .scalars
            .iter()
            .filter(|(_, entry)| lapsed(entry.expires_at))
            .map(|(key, _)| key.clone())
            .chain(
                self.sets
                    .iter()
                    .filter(|(_, entry)| lapsed(entry.expires_at))
                    .map(|(key, _)| key.clone()),
            )
            .collect();
        expired.sort();

        for key in &expired {
            self.scalars.remove(key);
            self.sets.remove(key);
        }
        expired
    }

    fn exists(&self, key: &str) -> bool {
        self.scalars.contains_key(key) || self.sets.contains_key(key) || self.sorted.contains_key(key)
    }

    fn int(&self, key: &str) -> i64 {
        match self.scalars.get(key) {
            Some(Entry { value: Scalar::Int(n), .. }) => *n,
            Some(Entry { value: Scalar::Str(s), .. }) => s.parse().unwrap_or(0),
            None => 0,
        }
    }

    fn text(&self, key: &str) -> Option<&str> {
        match self.scalars.get(key) {
            Some(Entry { value: Scalar::Str(s), .. }) => Some(s),
            _ => None,
        }
    }

    fn put(&mut self, key: String, value: Scalar, expires_at: Option<DateTime<Utc>>) {
        self.scalars.insert(key, Entry { value, expires_at });
    }

    fn incr(&mut self, key: &str, delta: i64) -> i64 {
        let next = self.int(key) + delta;
        let expires_at = self.scalars.get(key).and_then(|e| e.expires_at);
        self.put(key.to_string(), Scalar::Int(next), expires_at);
        next
    }

    fn decr_bounded(&mut self, key: &str) -> bool {
        if self.int(key) > 0 {
            self.incr(key, -1);
            true
        } else {
            false
        }
    }

    fn del(&mut self, key: &str) -> bool {
        self.scalars.remove(key).is_some() | self.sets.remove(key).is_some() | self.sorted.remove(key).is_some()
    }

    fn zrem(&mut self, key: &str, member: &str) -> bool {
        let Some(set) = self.sorted.get_mut(key) else {
            return false;
        };
        let removed = set.remove(member);
        if set.scores.is_empty() {
            self.sorted.remove(key);
        }
        removed
    }

    fn srem(&mut self, key: &str, member: &str) {
        if let Some(entry) = self.sets.get_mut(key) {
            entry.value.remove(member);
            if entry.value.is_empty() {
                self.sets.remove(key);
            }
        }
    }

    fn lease_owner(&self, key: &str) -> Result<Option<UserId>> {
        self.text(key)
            .map(|raw| serde_json::from_str::<SeatLease>(raw).map(|lease| lease.user_id))
            .transpose()
            .map_err(Into::into)
    }
}

struct Inner {
    keyspace: Mutex<Keyspace>,
    clock: ManualClock,
    feed: Mutex<broadcast::Sender<String>>,
    unavailable: AtomicBool,
}

/// In-memory implementation of every store trait and of [`ExpiryFeed`].
///
/// Time only moves through [`advance`](Self::advance) (or the shared
/// [`ManualClock`]). Lapsed keys are purged at the start of every operation
/// and published on the expiry feed, like Redis' lazy and active expiry.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("now", &self.inner.clock.now())
            .finish_non_exhaustive()
    }
}

impl InMemoryStore {
    /// Create an empty store on [`test_clock`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(test_clock())
    }

    /// Create an empty store on `clock`.
    #[must_use]
    pub fn with_clock(clock: ManualClock) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                keyspace: Mutex::new(Keyspace::default()),
                clock,
                feed: Mutex::new(feed),
                unavailable: AtomicBool::new(false),
            }),
        }
    }

    /// The store's clock.
    #[must_use]
    pub fn clock(&self) -> ManualClock {
        self.inner.clock.clone()
    }

    /// Move time forward, expire lapsed keys, and return their names.
    pub fn advance(&self, by: Duration) -> Vec<String> {
        self.inner.clock.advance(by);
        let mut keyspace = self.keyspace();
        self.expire(&mut keyspace)
    }

    /// Publish `key` on the expiry feed without touching data.
    ///
    /// Simulates duplicate or late notifications.
    pub fn emit_expired(&self, key: impl Into<String>) {
        let _ = self.sender().send(key.into());
    }

    /// End every open feed subscription, as a dropped pub/sub connection would.
    pub fn disconnect_feed(&self) {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        *self.inner.feed.lock().unwrap_or_else(PoisonError::into_inner) = feed;
    }

    /// Make every operation fail with `StoreUnavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Whether `key` currently exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        let mut keyspace = self.keyspace();
        self.expire(&mut keyspace);
        keyspace.exists(key)
    }

    fn keyspace(&self) -> MutexGuard<'_, Keyspace> {
        self.inner.keyspace.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sender(&self) -> broadcast::Sender<String> {
        self.inner.feed.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn expire(&self, keyspace: &mut Keyspace) -> Vec<String> {
        let expired = keyspace.purge(self.inner.clock.now());
        let sender = self.sender();
        for key in &expired {
            let _ = sender.send(key.clone());
        }
        expired
    }

    /// Lock the keyspace for one operation.
    fn begin(&self) -> Result<MutexGuard<'_, Keyspace>> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::StoreUnavailable("in-memory store marked unavailable".into()));
        }
        let mut keyspace = self.keyspace();
        self.expire(&mut keyspace);
        Ok(keyspace)
    }

    fn deadline(&self, ttl: Duration) -> DateTime<Utc> {
        self.inner.clock.now() + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(3650))
    }
}

impl QueueStore for InMemoryStore {
    async fn enter_queue(&self, event: &EventId, user: &UserId) -> Result<u64> {
        let keys = QueueKeys::new(event);
        let mut ks = self.begin()?;

        let waiting = keys.waiting();
        if let Some(score) = ks.sorted.get(&waiting).and_then(|set| set.score(user.as_str())) {
            return Ok(score);
        }

        let sequence = u64::try_from(ks.incr(&keys.next(), 1)).unwrap_or(0);
        ks.sorted.entry(waiting).or_default().add(user.as_str(), sequence);
        Ok(sequence)
    }

    async fn leave_queue(&self, event: &EventId, user: &UserId) -> Result<bool> {
        let mut ks = self.begin()?;
        Ok(ks.zrem(&QueueKeys::new(event).waiting(), user.as_str()))
    }

    async fn queue_status(&self, event: &EventId, user: &UserId) -> Result<QueueStatus> {
        let keys = QueueKeys::new(event);
        let ks = self.begin()?;

        let waiting = ks.sorted.get(&keys.waiting());
        Ok(QueueStatus::from_rank(
            waiting.and_then(|set| set.rank(user.as_str())),
            waiting.map_or(0, SortedSet::len),
            ks.exists(&keys.working(user)),
        ))
    }

    async fn enter_ticketing(
        &self,
        event: &EventId,
        user: &UserId,
        max_concurrent: u32,
        lease_ttl: Duration,
    ) -> Result<Admission> {
        let keys = QueueKeys::new(event);
        let (working, marker) = (keys.working(user), keys.lease_marker(user));
        let lease_until = self.deadline(lease_ttl);
        let marker_until = self.deadline(lease_ttl + MARKER_MARGIN);
        let mut ks = self.begin()?;

        if ks.exists(&working) {
            return Ok(Admission::Granted);
        }

        if !ks.exists(&marker) {
            if ks.int(&keys.current()) >= i64::from(max_concurrent) {
                return Ok(Admission::Denied);
            }
            ks.incr(&keys.current(), 1);
        }

        ks.zrem(&keys.waiting(), user.as_str());
        ks.put(working, Scalar::Int(1), Some(lease_until));
        ks.put(marker, Scalar::Int(1), Some(marker_until));
        Ok(Admission::Granted)
    }

    async fn leave_ticketing(&self, event: &EventId, user: &UserId) -> Result<bool> {
        let keys = QueueKeys::new(event);
        let mut ks = self.begin()?;

        if !ks.del(&keys.working(user)) {
            return Ok(false);
        }
        ks.del(&keys.lease_marker(user));
        ks.decr_bounded(&keys.current());
        Ok(true)
    }

    async fn reap_working_lease(&self, event: &EventId, user: &UserId) -> Result<ReapOutcome> {
        let keys = QueueKeys::new(event);
        let mut ks = self.begin()?;

        if ks.exists(&keys.working(user)) {
            return Ok(ReapOutcome::StillActive);
        }
        if !ks.del(&keys.lease_marker(user)) {
            return Ok(ReapOutcome::AlreadyReaped);
        }
        ks.decr_bounded(&keys.current());
        Ok(ReapOutcome::Reaped)
    }

    async fn release_slot(&self, event: &EventId) -> Result<bool> {
        let mut ks = self.begin()?;
        Ok(ks.decr_bounded(&QueueKeys::new(event).current()))
    }

    async fn slot_counters(&self, event: &EventId) -> Result<SlotCounters> {
        let keys = QueueKeys::new(event);
        let ks = self.begin()?;

        let max_override = ks
            .scalars
            .contains_key(&keys.max_concurrent())
            .then(|| u32::try_from(ks.int(&keys.max_concurrent())).ok())
            .flatten();

        Ok(SlotCounters {
            current: u64::try_from(ks.int(&keys.current())).unwrap_or(0),
            max_override,
            waiting: ks.sorted.get(&keys.waiting()).map_or(0, SortedSet::len),
        })
    }

    async fn set_max_concurrent(&self, event: &EventId, max: u32) -> Result<()> {
        let mut ks = self.begin()?;
        ks.put(QueueKeys::new(event).max_concurrent(), Scalar::Int(i64::from(max)), None);
        Ok(())
    }

    async fn clear_max_concurrent(&self, event: &EventId) -> Result<bool> {
        let mut ks = self.begin()?;
        Ok(ks.del(&QueueKeys::new(event).max_concurrent()))
    }

    async fn delete_slot_counters(&self, event: &EventId) -> Result<()> {
        let keys = QueueKeys::new(event);
        let mut ks = self.begin()?;
        ks.del(&keys.current());
        ks.del(&keys.max_concurrent());
        Ok(())
    }

    async fn orphaned_leases(&self) -> Result<Vec<(EventId, UserId)>> {
        let ks = self.begin()?;

        let mut orphans: Vec<(EventId, UserId)> = ks
            .scalars
            .keys()
            .filter_map(|key| match ExpiredKey::parse(key) {
                ExpiredKey::LeaseMarker { event, user } => {
                    (!ks.exists(&QueueKeys::new(&event).working(&user))).then_some((event, user))
                }
                _ => None,
            })
            .collect();
        orphans.sort();
        Ok(orphans)
    }

    async fn ping(&self) -> Result<()> {
        self.begin().map(drop)
    }
}

impl SeatLockStore for InMemoryStore {
    async fn has_selection(&self, schedule: &EventScheduleId, user: &UserId) -> Result<bool> {
        let ks = self.begin()?;
        Ok(ks.sets.contains_key(&keys::seat_selection(schedule, user)))
    }

    async fn preoccupy(
        &self,
        schedule: &EventScheduleId,
        user: &UserId,
        leases: &[SeatLease],
        ttl: Duration,
    ) -> Result<SeatHold> {
        let encoded = leases
            .iter()
            .map(|lease| {
                Ok((
                    keys::seat_lock(schedule, &lease.seat_mapping_id),
                    serde_json::to_string(lease)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        let selection = keys::seat_selection(schedule, user);
        let until = self.deadline(ttl);
        let mut ks = self.begin()?;

        if ks.sets.contains_key(&selection) {
            return Ok(SeatHold::SelectionActive);
        }
        if let Some(lease) = leases
            .iter()
            .find(|lease| ks.exists(&keys::seat_lock(schedule, &lease.seat_mapping_id)))
        {
            return Ok(SeatHold::Conflict(lease.seat_mapping_id.clone()));
        }

        for (key, json) in encoded {
            ks.put(key, Scalar::Str(json), Some(until));
        }
        let seats = leases.iter().map(|lease| lease.seat_mapping_id.to_string()).collect();
        ks.sets.insert(selection, Entry { value: seats, expires_at: Some(until) });
        Ok(SeatHold::Locked)
    }

    async fn release(
        &self,
        schedule: &EventScheduleId,
        user: &UserId,
        seats: &[SeatMappingId],
    ) -> Result<Vec<SeatRelease>> {
        let selection = keys::seat_selection(schedule, user);
        let mut ks = self.begin()?;

        let mut outcomes = Vec::with_capacity(seats.len());
        for seat in seats {
            let key = keys::seat_lock(schedule, seat);
            let outcome = match ks.lease_owner(&key)? {
                None => SeatRelease::NotHeld,
                Some(owner) if &owner == user => SeatRelease::Released,
                Some(_) => SeatRelease::HeldByOther,
            };

            if outcome != SeatRelease::HeldByOther {
                ks.del(&key);
                ks.srem(&selection, seat.as_str());
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn release_all(&self, schedule: &EventScheduleId, user: &UserId) -> Result<Vec<SeatMappingId>> {
        let prefix = keys::seat_lock_prefix(schedule);
        let mut ks = self.begin()?;

        let members = ks
            .sets
            .remove(&keys::seat_selection(schedule, user))
            .map(|entry| entry.value)
            .unwrap_or_default();

        let mut released = Vec::new();
        for seat in members {
            let key = format!("{prefix}{seat}");
            if ks.lease_owner(&key)?.as_ref() == Some(user) {
                ks.del(&key);
                released.push(SeatMappingId::parse(seat)?);
            }
        }
        Ok(released)
    }

    async fn lease(&self, schedule: &EventScheduleId, seat: &SeatMappingId) -> Result<Option<SeatLease>> {
        let ks = self.begin()?;
        ks.text(&keys::seat_lock(schedule, seat))
            .map(serde_json::from_str)
            .transpose()
            .map_err(Into::into)
    }

    async fn consume(&self, schedule: &EventScheduleId, seat: &SeatMappingId) -> Result<Option<SeatLease>> {
        let key = keys::seat_lock(schedule, seat);
        let mut ks = self.begin()?;

        let Some(raw) = ks.text(&key).map(str::to_string) else {
            return Ok(None);
        };
        let lease: SeatLease = serde_json::from_str(&raw)?;
        ks.del(&key);
        ks.srem(&keys::seat_selection(schedule, &lease.user_id), seat.as_str());
        Ok(Some(lease))
    }

    async fn selected_seats(&self, schedule: &EventScheduleId, user: &UserId) -> Result<Vec<SeatMappingId>> {
        let ks = self.begin()?;
        ks.sets
            .get(&keys::seat_selection(schedule, user))
            .map(|entry| entry.value.iter().map(SeatMappingId::parse).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

impl NamedLockStore for InMemoryStore {
    async fn try_acquire(&self, name: &str, token: &str, ttl: Duration) -> Result<bool> {
        let key = keys::named_lock(name);
        let until = self.deadline(ttl);
        let mut ks = self.begin()?;

        if ks.exists(&key) {
            return Ok(false);
        }
        ks.put(key, Scalar::Str(token.to_string()), Some(until));
        Ok(true)
    }

    async fn release(&self, name: &str, token: &str) -> Result<bool> {
        let key = keys::named_lock(name);
        let mut ks = self.begin()?;

        if ks.text(&key) == Some(token) {
            Ok(ks.del(&key))
        } else {
            Ok(false)
        }
    }
}

impl ExpiryFeed for InMemoryStore {
    async fn subscribe(&self) -> Result<ExpiredKeyStream> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::StoreUnavailable("in-memory store marked unavailable".into()));
        }
        let mut receiver = self.sender().subscribe();

        Ok(Box::pin(async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(key) => yield key,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn event() -> EventId {
        EventId::parse("e1").unwrap()
    }

    fn user(n: u32) -> UserId {
        UserId::parse(format!("u{n}")).unwrap()
    }

    #[tokio::test]
    async fn working_lease_expires_with_clock() {
        let store = InMemoryStore::new();
        store
            .enter_ticketing(&event(), &user(1), 1, Duration::from_secs(60))
            .await
            .unwrap();

        assert!(store.advance(Duration::from_secs(59)).is_empty());
        let expired = store.advance(Duration::from_secs(1));
        assert_eq!(expired, vec!["queue:e1:working:u1".to_string()]);
        assert!(store.contains_key("queue:e1:lease:u1"));
    }

    #[tokio::test]
    async fn expirations_reach_subscribers() {
        let store = InMemoryStore::new();
        let mut feed = store.subscribe().await.unwrap();

        store
            .enter_ticketing(&event(), &user(1), 1, Duration::from_secs(1))
            .await
            .unwrap();
        store.advance(Duration::from_secs(2));

        assert_eq!(feed.next().await.unwrap(), "queue:e1:working:u1");
    }

    #[tokio::test]
    async fn disconnect_ends_subscriptions() {
        let store = InMemoryStore::new();
        let mut feed = store.subscribe().await.unwrap();

        store.disconnect_feed();
        assert!(feed.next().await.is_none());
    }

    #[tokio::test]
    async fn outage_fails_every_operation() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);

        let err = store.enter_queue(&event(), &user(1)).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(store.ping().await.is_err());

        store.set_unavailable(false);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn waiting_rank_follows_sequence() {
        let store = InMemoryStore::new();
        for n in 1..=3 {
            store.enter_queue(&event(), &user(n)).await.unwrap();
        }
        store.leave_queue(&event(), &user(1)).await.unwrap();

        let status = store.queue_status(&event(), &user(3)).await.unwrap();
        assert_eq!(status.position, 1);
        assert_eq!(status.total_waiting, 2);
    }
}
