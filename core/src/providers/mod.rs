//! Provider traits.
//!
//! Services in `ficket-runtime` depend on these traits only. `ficket-redis`
//! implements them against Redis, `ficket-testing` in memory.
//!
//! Every mutating operation on shared state must be atomic inside the store:
//! implementations run each operation as one server-side script or one
//! critical section, never as a client-side read-then-write.

pub mod expiry_feed;
pub mod lock_store;
pub mod notifier;
pub mod queue_store;
pub mod seat_store;

pub use expiry_feed::{ExpiredKeyStream, ExpiryFeed};
pub use lock_store::NamedLockStore;
pub use notifier::Notifier;
pub use queue_store::QueueStore;
pub use seat_store::SeatLockStore;
