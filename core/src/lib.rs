//! # Ficket Core
//!
//! Types and traits for the admission and seat reservation core of a ticket
//! sale platform.
//!
//! ## Concepts
//!
//! - **Waiting queue**: per-event FIFO of users with monotonic sequence numbers
//! - **Working slot**: one of a bounded number of purchase-screen seats per event,
//!   held through a TTL'd working lease
//! - **Seat lease**: exclusive, TTL'd hold on one physical seat
//! - **Expiry**: every lease is reclaimed by TTL; expirations drive slot
//!   reclamation and client notices
//!
//! This crate does no I/O. Store bindings implement the traits in
//! [`providers`]; services in `ficket-runtime` consume them.

pub use chrono::{DateTime, Utc};

pub mod error;
pub mod ids;
pub mod keys;
pub mod notice;
pub mod providers;
pub mod queue;
pub mod seat;

pub use error::{QueueError, Result};
pub use ids::{EventId, EventScheduleId, SeatMappingId, UserId};
pub use notice::{Notice, WorkStatus, WorkStatusMessage};
pub use queue::{
    Admission, QueueStatus, QueueStatusKind, QueueStatusMessage, ReapOutcome, SlotCounters, SlotUsage,
};
pub use seat::{PreoccupyOutcome, ReleaseReport, SeatHold, SeatLease, SeatRelease, SeatRequest};

/// Environment traits injected into services.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time for testability.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
