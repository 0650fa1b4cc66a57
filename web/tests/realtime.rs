//! WebSocket channel tests over a real listener.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use ficket_core::providers::{Notifier, QueueStore};
use ficket_core::{EventId, EventScheduleId, Notice, SeatMappingId, SeatRequest, UserId, WorkStatusMessage};
use ficket_runtime::{AdmissionConfig, ChannelKey, ClientNotifier, RealtimeConfig};
use ficket_testing::InMemoryStore;
use ficket_web::{AppState, ServiceConfig, USER_ID_HEADER, build_router};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// Test Fixtures
// ============================================================================

struct Server {
    addr: SocketAddr,
    store: InMemoryStore,
    state: AppState<InMemoryStore>,
}

fn fast_realtime() -> RealtimeConfig {
    RealtimeConfig::default()
        .with_status_interval(Duration::from_millis(50))
        .with_disconnect_grace(Duration::from_millis(200))
}

async fn serve(max_concurrent: u32, max_connections: usize) -> Server {
    serve_with(max_concurrent, fast_realtime().with_max_connections(max_connections)).await
}

async fn serve_with(max_concurrent: u32, realtime: RealtimeConfig) -> Server {
    let store = InMemoryStore::new();
    let config = ServiceConfig {
        admission: AdmissionConfig::default().with_default_max_concurrent(max_concurrent),
        realtime,
        ..ServiceConfig::default()
    };
    let state = AppState::new(store.clone(), Arc::new(store.clock()), config);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state.clone());
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    Server { addr, store, state }
}

async fn connect(addr: SocketAddr, path: &str, user: &str) -> Result<Client, WsError> {
    let mut request = format!("ws://{addr}{path}").into_client_request().unwrap();
    request.headers_mut().insert(USER_ID_HEADER, HeaderValue::from_str(user).unwrap());
    tokio_tungstenite::connect_async(request).await.map(|(client, _)| client)
}

async fn next_json(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("no message in time")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn next_matching(client: &mut Client, predicate: impl Fn(&Value) -> bool) -> Value {
    for _ in 0..50 {
        let message = next_json(client).await;
        if predicate(&message) {
            return message;
        }
    }
    panic!("expected message never arrived");
}

async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met in time");
}

fn event() -> EventId {
    EventId::parse("E1").unwrap()
}

fn user(id: &str) -> UserId {
    UserId::parse(id).unwrap()
}

// ============================================================================
// Queue Channel
// ============================================================================

#[tokio::test]
async fn head_of_queue_is_promoted_and_told() {
    let server = serve(1, 100).await;
    let mut first = connect(server.addr, "/api/v1/ws/queue/E1", "u1").await.unwrap();

    let completed = next_matching(&mut first, |m| m["queueStatus"] == "COMPLETED").await;
    assert_eq!(completed["userId"], "u1");
    assert_eq!(completed["myWaitingNumber"], -1);
    assert_eq!(server.store.slot_counters(&event()).await.unwrap().current, 1);

    let mut second = connect(server.addr, "/api/v1/ws/queue/E1", "u2").await.unwrap();
    let waiting = next_json(&mut second).await;
    assert_eq!(
        waiting,
        json!({
            "userId": "u2",
            "eventId": "E1",
            "myWaitingNumber": 0,
            "totalWaitingNumber": 1,
            "queueStatus": "ALMOST_DONE"
        })
    );
}

#[tokio::test]
async fn ping_is_answered_with_pong() {
    let server = serve(1, 100).await;
    let mut client = connect(server.addr, "/api/v1/ws/queue/E1", "u1").await.unwrap();

    client.send(Message::Text(json!({ "type": "ping" }).to_string())).await.unwrap();

    let pong = next_matching(&mut client, |m| m["type"] == "pong").await;
    assert_eq!(pong, json!({ "type": "pong" }));
}

#[tokio::test]
async fn passive_listener_outlives_idle_timeout() {
    let server = serve_with(1, fast_realtime().with_idle_timeout(Duration::from_millis(400))).await;
    server.state.admission().enter_ticketing(&event(), &user("u1")).await.unwrap();
    let mut listener = connect(server.addr, "/api/v1/ws/queue/E1", "u2").await.unwrap();

    // Only read; the client library answers server pings on its own.
    let deadline = tokio::time::Instant::now() + Duration::from_millis(1200);
    let mut pings = 0;
    loop {
        match tokio::time::timeout_at(deadline, listener.next()).await {
            Err(_) => break,
            Ok(Some(Ok(Message::Ping(_)))) => pings += 1,
            Ok(Some(Ok(Message::Close(_)) | Err(_)) | None) => panic!("passive listener was disconnected"),
            Ok(Some(Ok(_))) => {}
        }
    }

    assert!(pings > 0);
    let status = server.state.admission().queue_status(&event(), &user("u2")).await.unwrap();
    assert!(status.is_waiting());
}

#[tokio::test]
async fn explicit_leave_releases_immediately() {
    let server = serve(1, 100).await;
    let _holder = connect(server.addr, "/api/v1/ws/queue/E1", "u1").await.unwrap();
    let mut waiter = connect(server.addr, "/api/v1/ws/queue/E1", "u2").await.unwrap();
    next_json(&mut waiter).await;

    waiter.send(Message::Text(json!({ "type": "leave" }).to_string())).await.unwrap();

    let state = &server.state;
    eventually(move || async move {
        !state.admission().queue_status(&event(), &user("u2")).await.unwrap().is_waiting()
    })
    .await;
}

#[tokio::test]
async fn silent_disconnect_releases_after_grace() {
    let server = serve(1, 100).await;
    let _holder = connect(server.addr, "/api/v1/ws/queue/E1", "u1").await.unwrap();
    let mut waiter = connect(server.addr, "/api/v1/ws/queue/E1", "u2").await.unwrap();
    next_json(&mut waiter).await;

    waiter.close(None).await.unwrap();
    drop(waiter);

    let state = &server.state;
    eventually(move || async move {
        !state.admission().queue_status(&event(), &user("u2")).await.unwrap().is_waiting()
    })
    .await;
}

#[tokio::test]
async fn reconnect_keeps_queue_place() {
    let server = serve(1, 100).await;
    let _holder = connect(server.addr, "/api/v1/ws/queue/E1", "u1").await.unwrap();
    let mut waiter = connect(server.addr, "/api/v1/ws/queue/E1", "u2").await.unwrap();
    let before = next_json(&mut waiter).await;

    waiter.close(None).await.unwrap();
    drop(waiter);
    let mut again = connect(server.addr, "/api/v1/ws/queue/E1", "u2").await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let after = next_json(&mut again).await;
    assert_eq!(after["myWaitingNumber"], before["myWaitingNumber"]);
    assert!(server.state.admission().queue_status(&event(), &user("u2")).await.unwrap().is_waiting());
}

#[tokio::test]
async fn connection_limit_refuses_with_503() {
    let server = serve(1, 1).await;
    let _first = connect(server.addr, "/api/v1/ws/queue/E1", "u1").await.unwrap();

    match connect(server.addr, "/api/v1/ws/queue/E1", "u2").await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), 503),
        Err(other) => panic!("expected 503, got {other}"),
        Ok(_) => panic!("expected 503, connection was accepted"),
    }
}

// ============================================================================
// Work Channel
// ============================================================================

#[tokio::test]
async fn work_channel_forwards_notices() {
    let server = serve(1, 100).await;
    let mut client = connect(server.addr, "/api/v1/ws/work/E1", "u1").await.unwrap();

    let registry = server.state.registry();
    eventually(move || async move { registry.is_connected(&user("u1"), &ChannelKey::Work(event())).await }).await;

    ClientNotifier::new(server.state.registry().clone())
        .notify(&user("u1"), Notice::from(WorkStatusMessage::order_right_lost(user("u1"), event())))
        .await
        .unwrap();

    let notice = next_json(&mut client).await;
    assert_eq!(notice, json!({ "userId": "u1", "workStatus": "ORDER_RIGHT_LOST", "eventId": "E1" }));
}

#[tokio::test]
async fn dropped_work_channel_releases_slot_and_seats() {
    let server = serve(1, 100).await;
    let schedule = EventScheduleId::parse("ES1").unwrap();
    server.state.admission().enter_ticketing(&event(), &user("u1")).await.unwrap();
    server
        .state
        .seats()
        .preoccupy_seats(&schedule, &user("u1"), vec![SeatRequest::new(SeatMappingId::parse("A1").unwrap())], 4)
        .await
        .unwrap();

    let client = connect(server.addr, "/api/v1/ws/work/E1?eventScheduleId=ES1", "u1").await.unwrap();
    let registry = server.state.registry();
    eventually(move || async move { registry.is_connected(&user("u1"), &ChannelKey::Work(event())).await }).await;
    drop(client);

    let store = &server.store;
    eventually(move || async move { store.slot_counters(&event()).await.unwrap().current == 0 }).await;
    assert!(!server.store.contains_key("seatlock:ES1:A1"));
}

#[tokio::test]
async fn queue_socket_for_another_event_leaves_work_channel_open() {
    let server = serve(1, 100).await;
    server.state.admission().enter_ticketing(&event(), &user("u1")).await.unwrap();
    let mut work = connect(server.addr, "/api/v1/ws/work/E1", "u1").await.unwrap();
    let registry = server.state.registry();
    eventually(move || async move { registry.is_connected(&user("u1"), &ChannelKey::Work(event())).await }).await;

    let mut queue = connect(server.addr, "/api/v1/ws/queue/E2", "u1").await.unwrap();
    let status = next_json(&mut queue).await;
    assert_eq!(status["eventId"], "E2");

    ClientNotifier::new(server.state.registry().clone())
        .notify(&user("u1"), Notice::from(WorkStatusMessage::order_right_lost(user("u1"), event())))
        .await
        .unwrap();
    let notice = next_json(&mut work).await;
    assert_eq!(notice["workStatus"], "ORDER_RIGHT_LOST");
    assert_eq!(server.store.slot_counters(&event()).await.unwrap().current, 1);
}
