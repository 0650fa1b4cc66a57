//! HTTP and WebSocket handlers, one module per surface.

pub mod admin;
pub mod health;
pub mod queue;
pub mod seats;
pub mod websocket;

pub use health::{health_check, metrics, readiness_check};
pub use websocket::{ClientMessage, ControlMessage, queue_socket, work_socket};
