//! # Ficket Redis
//!
//! Redis implementation of the Ficket store traits.
//!
//! - [`RedisStore`] implements `QueueStore`, `SeatLockStore` and
//!   `NamedLockStore` over one multiplexed `ConnectionManager`. Every mutation
//!   that touches more than one key runs as a Lua script.
//! - [`RedisExpiryFeed`] subscribes to keyspace expiration events
//!   (`__keyevent@{db}__:expired`).
//!
//! # Example
//!
//! ```no_run
//! use ficket_redis::RedisStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisStore::new("redis://127.0.0.1:6379").await?;
//! # Ok(())
//! # }
//! ```

mod expiry;
mod lock_store;
mod queue_store;
pub mod scripts;
mod seat_store;
mod store;

pub use expiry::RedisExpiryFeed;
pub use store::RedisStore;
