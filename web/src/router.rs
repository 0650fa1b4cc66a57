//! Router configuration.

use crate::handlers::{admin, health, queue, seats, websocket};
use crate::middleware::correlation_id_layer;
use crate::state::AppState;
use axum::{
    Router,
    routing::{delete, get, post},
};
use ficket_runtime::StoreBackend;
use tower_http::trace::TraceLayer;

/// Build the complete router.
///
/// Health and metrics live at the root; everything else is under `/api/v1`.
/// Requests get a correlation id span and an HTTP trace span.
pub fn build_router<B: StoreBackend>(state: AppState<B>) -> Router {
    let queue_routes = Router::new()
        .route("/:event_id", delete(queue::leave_queue::<B>))
        .route("/:event_id/enter", post(queue::enter_queue::<B>))
        .route("/:event_id/status", get(queue::queue_status::<B>))
        .route(
            "/:event_id/ticketing",
            post(queue::enter_ticketing::<B>).delete(queue::leave_ticketing::<B>),
        )
        .route("/:event_id/keep-alive", post(queue::keep_alive::<B>));

    let seat_routes = Router::new()
        .route("/lock", post(seats::lock_seats::<B>))
        .route("/unlock", post(seats::unlock_seats::<B>))
        .route("/:schedule_id/mine", get(seats::my_seats::<B>))
        .route("/:schedule_id/:seat_id", get(seats::get_lease::<B>))
        .route("/:schedule_id/:seat_id/consume", post(seats::consume_lease::<B>));

    let admin_routes = Router::new()
        .route("/events/:event_id", delete(admin::close_event::<B>))
        .route(
            "/events/:event_id/slots",
            get(admin::slot_usage::<B>)
                .put(admin::set_capacity::<B>)
                .delete(admin::clear_capacity::<B>),
        )
        .route("/events/:event_id/slots/release", post(admin::force_release::<B>));

    let ws_routes = Router::new()
        .route("/queue/:event_id", get(websocket::queue_socket::<B>))
        .route("/work/:event_id", get(websocket::work_socket::<B>));

    let api_routes = Router::new()
        .nest("/queue", queue_routes)
        .nest("/seats", seat_routes)
        .nest("/admin", admin_routes)
        .nest("/ws", ws_routes);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check::<B>))
        .route("/metrics", get(health::metrics::<B>))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
