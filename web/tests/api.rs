//! HTTP surface tests against the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use ficket_core::{EventId, UserId};
use ficket_runtime::{AdmissionConfig, SeatLockConfig};
use ficket_testing::InMemoryStore;
use ficket_web::{AppState, CORRELATION_ID_HEADER, ServiceConfig, USER_ID_HEADER, build_router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

// ============================================================================
// Test Fixtures
// ============================================================================

struct TestApp {
    router: Router,
    store: InMemoryStore,
    state: AppState<InMemoryStore>,
}

impl TestApp {
    fn new() -> Self {
        Self::with_max_concurrent(1)
    }

    fn with_max_concurrent(max: u32) -> Self {
        let store = InMemoryStore::new();
        let config = ServiceConfig {
            admission: AdmissionConfig::default().with_default_max_concurrent(max),
            seats: SeatLockConfig::default().with_max_seats_per_selection(4),
            ..ServiceConfig::default()
        };
        let state = AppState::new(store.clone(), Arc::new(store.clock()), config);
        Self { router: build_router(state.clone()), store, state }
    }

    async fn call(&self, method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
        (status, json)
    }

    async fn lock(&self, user: &str, seats: &[&str]) -> (StatusCode, Value) {
        let seats: Vec<Value> = seats.iter().map(|id| json!({ "seatMappingId": id })).collect();
        self.call(
            Method::POST,
            "/api/v1/seats/lock",
            Some(user),
            Some(json!({ "eventScheduleId": "ES1", "seats": seats })),
        )
        .await
    }
}

// ============================================================================
// Queue
// ============================================================================

#[tokio::test]
async fn entering_twice_returns_same_sequence_number() {
    let app = TestApp::new();

    let (status, first) = app.call(Method::POST, "/api/v1/queue/E1/enter", Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = app.call(Method::POST, "/api/v1/queue/E1/enter", Some("u1"), None).await;

    assert_eq!(first["sequenceNumber"], second["sequenceNumber"]);
}

#[tokio::test]
async fn status_reports_rank_and_total() {
    let app = TestApp::new();
    app.call(Method::POST, "/api/v1/queue/E1/enter", Some("u1"), None).await;
    app.call(Method::POST, "/api/v1/queue/E1/enter", Some("u2"), None).await;

    let (status, body) = app.call(Method::GET, "/api/v1/queue/E1/status", Some("u2"), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "position": 1, "totalWaiting": 2, "isAdmitted": false }));
}

#[tokio::test]
async fn full_pool_denies_without_error() {
    let app = TestApp::new();
    app.call(Method::POST, "/api/v1/queue/E1/enter", Some("u1"), None).await;
    app.call(Method::POST, "/api/v1/queue/E1/enter", Some("u2"), None).await;

    let (_, first) = app.call(Method::POST, "/api/v1/queue/E1/ticketing", Some("u1"), None).await;
    let (status, second) = app.call(Method::POST, "/api/v1/queue/E1/ticketing", Some("u2"), None).await;

    assert_eq!(first, json!({ "admitted": true }));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second, json!({ "admitted": false }));

    let (_, released) = app.call(Method::DELETE, "/api/v1/queue/E1/ticketing", Some("u1"), None).await;
    assert_eq!(released, json!({ "released": true }));
    let (_, retry) = app.call(Method::POST, "/api/v1/queue/E1/ticketing", Some("u2"), None).await;
    assert_eq!(retry, json!({ "admitted": true }));
}

#[tokio::test]
async fn only_the_head_of_the_queue_is_admitted() {
    let app = TestApp::with_max_concurrent(1);
    for user in ["u1", "u2", "u3", "u4"] {
        app.call(Method::POST, "/api/v1/queue/E1/enter", Some(user), None).await;
    }

    let (status, intruder) = app.call(Method::POST, "/api/v1/queue/E1/ticketing", Some("u9"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(intruder, json!({ "admitted": false }));

    let (_, far_back) = app.call(Method::POST, "/api/v1/queue/E1/ticketing", Some("u4"), None).await;
    assert_eq!(far_back, json!({ "admitted": false }));

    let (_, usage) = app.call(Method::GET, "/api/v1/admin/events/E1/slots", None, None).await;
    assert_eq!(usage["current"], 0);

    let (_, head) = app.call(Method::POST, "/api/v1/queue/E1/ticketing", Some("u1"), None).await;
    assert_eq!(head, json!({ "admitted": true }));
    let (_, again) = app.call(Method::POST, "/api/v1/queue/E1/ticketing", Some("u1"), None).await;
    assert_eq!(again, json!({ "admitted": true }));

    let (_, usage) = app.call(Method::GET, "/api/v1/admin/events/E1/slots", None, None).await;
    assert_eq!(usage["current"], 1);
}

#[tokio::test]
async fn leaving_twice_reports_second_as_no_op() {
    let app = TestApp::new();
    app.call(Method::POST, "/api/v1/queue/E1/enter", Some("u1"), None).await;

    let (_, first) = app.call(Method::DELETE, "/api/v1/queue/E1", Some("u1"), None).await;
    let (_, second) = app.call(Method::DELETE, "/api/v1/queue/E1", Some("u1"), None).await;

    assert_eq!(first, json!({ "removed": true }));
    assert_eq!(second, json!({ "removed": false }));
}

#[tokio::test]
async fn keep_alive_is_no_content() {
    let app = TestApp::new();
    let (status, _) = app.call(Method::POST, "/api/v1/queue/E1/keep-alive", Some("u1"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

// ============================================================================
// Seats
// ============================================================================

#[tokio::test]
async fn contested_seat_is_409_and_batch_leaves_nothing() {
    let app = TestApp::new();

    let (status, body) = app.lock("u2", &["B"]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["leases"][0]["userId"], "u2");

    let (status, body) = app.lock("u1", &["A", "B"]).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "SEAT_ALREADY_LOCKED");

    let (status, _) = app.call(Method::GET, "/api/v1/seats/ES1/A", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, mine) = app.call(Method::GET, "/api/v1/seats/ES1/mine", Some("u1"), None).await;
    assert_eq!(mine, json!({ "seatMappingIds": [] }));
}

#[tokio::test]
async fn invalid_seat_requests_are_422() {
    let app = TestApp::new();

    let (status, body) = app.lock("u1", &["A", "B", "C", "D", "E"]).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "SEAT_LIMIT_EXCEEDED");

    let (status, body) = app.lock("u1", &[]).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "EMPTY_SEAT_SELECTION");

    let (status, body) = app.lock("u1", &["bad:seat"]).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_BODY");
}

#[tokio::test]
async fn second_selection_is_rejected_until_released() {
    let app = TestApp::new();
    app.lock("u1", &["A"]).await;

    let (status, body) = app.lock("u1", &["B"]).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "SELECTION_ALREADY_ACTIVE");

    let (status, report) = app
        .call(
            Method::POST,
            "/api/v1/seats/unlock",
            Some("u1"),
            Some(json!({ "eventScheduleId": "ES1", "seatMappingIds": ["A"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["released"], json!(["A"]));

    let (status, _) = app.lock("u1", &["B"]).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unlocking_someone_elses_seat_is_409_with_report() {
    let app = TestApp::new();
    app.lock("u1", &["A"]).await;
    app.lock("u2", &["B"]).await;

    let (status, report) = app
        .call(
            Method::POST,
            "/api/v1/seats/unlock",
            Some("u1"),
            Some(json!({ "eventScheduleId": "ES1", "seatMappingIds": ["A", "B"] })),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(report["released"], json!(["A"]));
    assert_eq!(report["heldByOthers"], json!(["B"]));

    let (status, lease) = app.call(Method::GET, "/api/v1/seats/ES1/B", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lease["userId"], "u2");
}

#[tokio::test]
async fn consume_hands_out_a_lease_once() {
    let app = TestApp::new();
    app.lock("u1", &["A"]).await;

    let (status, lease) = app.call(Method::POST, "/api/v1/seats/ES1/A/consume", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lease["seatMappingId"], "A");

    let (status, _) = app.call(Method::POST, "/api/v1/seats/ES1/A/consume", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Operator
// ============================================================================

#[tokio::test]
async fn operator_throttles_capacity() {
    let app = TestApp::with_max_concurrent(10);
    app.call(Method::POST, "/api/v1/queue/E1/enter", Some("u1"), None).await;
    app.call(Method::POST, "/api/v1/queue/E1/enter", Some("u2"), None).await;
    app.call(Method::POST, "/api/v1/queue/E1/ticketing", Some("u1"), None).await;

    let (status, usage) = app
        .call(Method::PUT, "/api/v1/admin/events/E1/slots", None, Some(json!({ "maxConcurrent": 1 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usage["maxConcurrent"], 1);
    assert_eq!(usage["current"], 1);

    let (_, denied) = app.call(Method::POST, "/api/v1/queue/E1/ticketing", Some("u2"), None).await;
    assert_eq!(denied, json!({ "admitted": false }));

    let (_, cleared) = app.call(Method::DELETE, "/api/v1/admin/events/E1/slots", None, None).await;
    assert_eq!(cleared, json!({ "cleared": true }));
    let (_, usage) = app.call(Method::GET, "/api/v1/admin/events/E1/slots", None, None).await;
    assert_eq!(usage["maxConcurrent"], 10);
}

#[tokio::test]
async fn zero_capacity_is_422() {
    let app = TestApp::new();
    let (status, body) = app
        .call(Method::PUT, "/api/v1/admin/events/E1/slots", None, Some(json!({ "maxConcurrent": 0 })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_CAPACITY");
}

#[tokio::test]
async fn close_is_refused_while_slots_are_held() {
    let app = TestApp::new();
    app.call(Method::POST, "/api/v1/queue/E1/enter", Some("u1"), None).await;
    app.call(Method::POST, "/api/v1/queue/E1/ticketing", Some("u1"), None).await;

    let (status, body) = app.call(Method::DELETE, "/api/v1/admin/events/E1", None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "SLOTS_STILL_ACTIVE");

    let (_, released) = app.call(Method::POST, "/api/v1/admin/events/E1/slots/release", None, None).await;
    assert_eq!(released, json!({ "released": true }));

    let (status, _) = app.call(Method::DELETE, "/api/v1/admin/events/E1", None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

// ============================================================================
// Errors and Health
// ============================================================================

#[tokio::test]
async fn missing_user_is_401() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::POST, "/api/v1/queue/E1/enter", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn malformed_event_id_is_400() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::POST, "/api/v1/queue/bad%20id/enter", Some("u1"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_IDENTIFIER");
}

#[tokio::test]
async fn store_outage_fails_closed_with_503() {
    let app = TestApp::new();
    app.store.set_unavailable(true);

    let (status, body) = app.call(Method::POST, "/api/v1/queue/E1/ticketing", Some("u1"), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "STORE_UNAVAILABLE");

    let (status, body) = app.call(Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);

    app.store.set_unavailable(false);
    let event = EventId::parse("E1").unwrap();
    let user = UserId::parse("u1").unwrap();
    assert!(!app.state.admission().queue_status(&event, &user).await.unwrap().is_admitted);
}

#[tokio::test]
async fn health_and_correlation_header() {
    let app = TestApp::new();

    let request = Request::builder().uri("/health").header(CORRELATION_ID_HEADER, "req-1").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(CORRELATION_ID_HEADER).unwrap(), "req-1");

    let (status, _) = app.call(Method::GET, "/metrics", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
