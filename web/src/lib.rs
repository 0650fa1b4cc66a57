//! HTTP and WebSocket surface for Ficket.
//!
//! Handlers are thin: extract and validate, call a `ficket-runtime` service,
//! map the outcome to a response. Capacity denial and seat contention come
//! back as ordinary responses; store failures become 503.
//!
//! # Surfaces
//!
//! - `/api/v1/queue/...`: waiting queue and working slots
//! - `/api/v1/seats/...`: seat leases
//! - `/api/v1/admin/...`: operator throttling
//! - `/api/v1/ws/...`: real-time channels
//! - `/health`, `/ready`, `/metrics`
//!
//! # Example
//!
//! ```ignore
//! use ficket_web::{AppState, ServiceConfig, build_router};
//!
//! let state = AppState::new(store, Arc::new(SystemClock), ServiceConfig::default());
//! let app = build_router(state);
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use error::AppError;
pub use extractors::{CorrelationId, JsonBody, USER_ID_HEADER, UserIdentity};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use router::build_router;
pub use state::{AppState, ServiceConfig};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
