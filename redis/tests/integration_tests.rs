//! Integration tests for [`RedisStore`] and [`RedisExpiryFeed`] against a real Redis.
//!
//! # Running These Tests
//!
//! Marked `#[ignore]` because they need Docker (testcontainers starts a Redis
//! container per test). To run explicitly:
//!
//! ```bash
//! cargo test -p ficket-redis --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use chrono::Utc;
use ficket_core::providers::{ExpiryFeed, NamedLockStore, QueueStore, SeatLockStore};
use ficket_core::{
    Admission, EventId, EventScheduleId, ReapOutcome, SeatHold, SeatLease, SeatMappingId, SeatRelease,
    SeatRequest, UserId,
};
use ficket_redis::{RedisExpiryFeed, RedisStore};
use futures::StreamExt;
use std::time::Duration;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::{REDIS_PORT, Redis};

const LEASE_TTL: Duration = Duration::from_secs(60);

/// Start a Redis container.
///
/// Returns the container (to keep it alive) and its URL.
///
/// # Panics
/// Panics if container setup fails (test environment issue).
async fn start_redis() -> (ContainerAsync<Redis>, String) {
    let container = Redis::default().start().await.expect("Failed to start Redis container");
    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(REDIS_PORT)
        .await
        .expect("Failed to get port");

    (container, format!("redis://{host}:{port}"))
}

async fn setup() -> (ContainerAsync<Redis>, RedisStore) {
    let (container, url) = start_redis().await;
    let store = RedisStore::new(&url).await.expect("Failed to connect");
    (container, store)
}

fn user(n: usize) -> UserId {
    UserId::parse(format!("user-{n}")).unwrap()
}

fn event() -> EventId {
    EventId::parse("concert-1").unwrap()
}

fn schedule() -> EventScheduleId {
    EventScheduleId::parse("schedule-1").unwrap()
}

fn seat(id: &str) -> SeatMappingId {
    SeatMappingId::parse(id).unwrap()
}

fn lease(user: &UserId, id: &str) -> SeatLease {
    SeatLease::new(
        user.clone(),
        schedule(),
        SeatRequest::new(seat(id)),
        Utc::now(),
        chrono::Duration::minutes(8),
    )
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn enter_queue_is_idempotent_and_ordered() {
    let (_container, store) = setup().await;
    let event = event();

    let first = store.enter_queue(&event, &user(1)).await.unwrap();
    let second = store.enter_queue(&event, &user(2)).await.unwrap();
    let again = store.enter_queue(&event, &user(1)).await.unwrap();

    assert!(first < second);
    assert_eq!(first, again);

    let status = store.queue_status(&event, &user(2)).await.unwrap();
    assert_eq!(status.position, 1);
    assert_eq!(status.total_waiting, 2);
    assert!(!status.is_admitted);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn concurrent_admissions_never_exceed_capacity() {
    let (_container, store) = setup().await;
    let event = event();

    let attempts = (0..50).map(|n| {
        let store = store.clone();
        let event = event.clone();
        tokio::spawn(async move {
            store.enter_queue(&event, &user(n)).await.unwrap();
            store.enter_ticketing(&event, &user(n), 5, LEASE_TTL).await.unwrap()
        })
    });

    let results = futures::future::join_all(attempts).await;
    let granted = results
        .into_iter()
        .filter(|r| matches!(r, Ok(Admission::Granted)))
        .count();

    assert_eq!(granted, 5);
    let counters = store.slot_counters(&event).await.unwrap();
    assert_eq!(counters.current, 5);
    assert_eq!(counters.waiting, 45);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn leave_ticketing_twice_decrements_once() {
    let (_container, store) = setup().await;
    let event = event();

    assert!(store.enter_ticketing(&event, &user(1), 2, LEASE_TTL).await.unwrap().is_granted());
    assert!(store.enter_ticketing(&event, &user(1), 2, LEASE_TTL).await.unwrap().is_granted());
    assert_eq!(store.slot_counters(&event).await.unwrap().current, 1);

    assert!(store.leave_ticketing(&event, &user(1)).await.unwrap());
    assert!(!store.leave_ticketing(&event, &user(1)).await.unwrap());
    assert_eq!(store.slot_counters(&event).await.unwrap().current, 0);
    assert!(!store.release_slot(&event).await.unwrap());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn lapsed_lease_is_reaped_exactly_once() {
    let (_container, store) = setup().await;
    let event = event();

    store
        .enter_ticketing(&event, &user(1), 1, Duration::from_secs(1))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(2100)).await;

    let orphans = store.orphaned_leases().await.unwrap();
    assert_eq!(orphans, vec![(event.clone(), user(1))]);

    assert_eq!(store.reap_working_lease(&event, &user(1)).await.unwrap(), ReapOutcome::Reaped);
    assert_eq!(store.reap_working_lease(&event, &user(1)).await.unwrap(), ReapOutcome::AlreadyReaped);
    assert_eq!(store.slot_counters(&event).await.unwrap().current, 0);
    assert!(store.orphaned_leases().await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn batch_preoccupy_is_all_or_nothing() {
    let (_container, store) = setup().await;
    let schedule = schedule();

    let held = store
        .preoccupy(&schedule, &user(2), &[lease(&user(2), "B")], LEASE_TTL)
        .await
        .unwrap();
    assert_eq!(held, SeatHold::Locked);

    let outcome = store
        .preoccupy(&schedule, &user(1), &[lease(&user(1), "A"), lease(&user(1), "B")], LEASE_TTL)
        .await
        .unwrap();
    assert_eq!(outcome, SeatHold::Conflict(seat("B")));
    assert!(store.lease(&schedule, &seat("A")).await.unwrap().is_none());
    assert!(!store.has_selection(&schedule, &user(1)).await.unwrap());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn one_winner_per_seat_under_contention() {
    let (_container, store) = setup().await;
    let schedule = schedule();

    let attempts = (0..200).map(|n| {
        let store = store.clone();
        let schedule = schedule.clone();
        tokio::spawn(async move {
            store
                .preoccupy(&schedule, &user(n), &[lease(&user(n), "A1")], LEASE_TTL)
                .await
                .unwrap()
        })
    });

    let winners = futures::future::join_all(attempts)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(SeatHold::Locked)))
        .count();
    assert_eq!(winners, 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn release_respects_ownership() {
    let (_container, store) = setup().await;
    let schedule = schedule();

    store
        .preoccupy(&schedule, &user(1), &[lease(&user(1), "A1"), lease(&user(1), "A2")], LEASE_TTL)
        .await
        .unwrap();

    let outcomes = SeatLockStore::release(&store, &schedule, &user(2), &[seat("A1")])
        .await
        .unwrap();
    assert_eq!(outcomes, vec![SeatRelease::HeldByOther]);

    let outcomes = SeatLockStore::release(&store, &schedule, &user(1), &[seat("A1"), seat("Z9")])
        .await
        .unwrap();
    assert_eq!(outcomes, vec![SeatRelease::Released, SeatRelease::NotHeld]);
    assert_eq!(store.selected_seats(&schedule, &user(1)).await.unwrap(), vec![seat("A2")]);

    let released = store.release_all(&schedule, &user(1)).await.unwrap();
    assert_eq!(released, vec![seat("A2")]);
    assert!(!store.has_selection(&schedule, &user(1)).await.unwrap());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn consume_takes_lease_and_clears_selection() {
    let (_container, store) = setup().await;
    let schedule = schedule();

    store
        .preoccupy(&schedule, &user(1), &[lease(&user(1), "C3")], LEASE_TTL)
        .await
        .unwrap();

    let taken = store.consume(&schedule, &seat("C3")).await.unwrap().unwrap();
    assert_eq!(taken.user_id, user(1));
    assert!(store.consume(&schedule, &seat("C3")).await.unwrap().is_none());
    assert!(!store.has_selection(&schedule, &user(1)).await.unwrap());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn consume_keeps_the_rest_of_the_selection() {
    let (_container, store) = setup().await;
    let schedule = schedule();

    store
        .preoccupy(&schedule, &user(1), &[lease(&user(1), "D1"), lease(&user(1), "D2")], LEASE_TTL)
        .await
        .unwrap();

    store.consume(&schedule, &seat("D1")).await.unwrap().unwrap();
    assert_eq!(store.selected_seats(&schedule, &user(1)).await.unwrap(), vec![seat("D2")]);

    let released = store.release_all(&schedule, &user(1)).await.unwrap();
    assert_eq!(released, vec![seat("D2")]);
    assert!(store.release_all(&schedule, &user(1)).await.unwrap().is_empty());
    assert!(store.lease(&schedule, &seat("D2")).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn named_lock_is_exclusive_and_token_checked() {
    let (_container, store) = setup().await;
    let ttl = Duration::from_secs(5);

    assert!(store.try_acquire("admin:e1", "token-a", ttl).await.unwrap());
    assert!(!store.try_acquire("admin:e1", "token-b", ttl).await.unwrap());
    assert!(!NamedLockStore::release(&store, "admin:e1", "token-b").await.unwrap());
    assert!(NamedLockStore::release(&store, "admin:e1", "token-a").await.unwrap());
    assert!(store.try_acquire("admin:e1", "token-b", ttl).await.unwrap());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn expiry_feed_reports_lapsed_working_lease() {
    let (_container, url) = start_redis().await;
    let store = RedisStore::new(&url).await.unwrap();
    let feed = RedisExpiryFeed::new(&url)
        .unwrap()
        .with_configure_notifications(true);

    let mut expired = feed.subscribe().await.unwrap();
    store
        .enter_ticketing(&event(), &user(1), 1, Duration::from_secs(1))
        .await
        .unwrap();

    let key = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let key = expired.next().await.expect("feed ended");
            if key.contains(":working:") {
                return key;
            }
        }
    })
    .await
    .expect("no expiration within timeout");

    assert_eq!(key, "queue:concert-1:working:user-1");
}
