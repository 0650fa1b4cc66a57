//! # Ficket Runtime
//!
//! Services of the admission and seat reservation core.
//!
//! ## Core Components
//!
//! - **`QueueAdmissionService`**: waiting queue, working slot pool, promotion
//!   ticks and the operator surface
//! - **`SeatLockCoordinator`**: all-or-nothing seat leases with per-user limits
//! - **`ExpiryReactor`**: turns key expirations into slot reclamation and
//!   client notices, plus a periodic sweep for missed notifications
//! - **`ConnectionRegistry`** / **`ClientNotifier`**: process-local routing of
//!   notices to live connections
//! - **`DisconnectGrace`**: cancellable delayed cleanup after a disconnect
//! - **`NamedLock`**: scoped mutual exclusion for operator read-then-write paths
//!
//! Every service is generic over the provider traits in
//! [`ficket_core::providers`], so the same code runs against Redis in
//! production and against `ficket_testing::InMemoryStore` in tests.
//!
//! ## Example
//!
//! ```ignore
//! use ficket_runtime::{AdmissionConfig, ClientNotifier, ConnectionRegistry, LockConfig, QueueAdmissionService};
//!
//! let registry = ConnectionRegistry::new(32);
//! let admission = QueueAdmissionService::new(
//!     store.clone(),
//!     NamedLock::new(store.clone(), LockConfig::default()),
//!     ClientNotifier::new(registry.clone()),
//!     AdmissionConfig::default(),
//! );
//!
//! let sequence = admission.enter_queue(&event, &user).await?;
//! let tick = admission.advance(&event, &user).await?;
//! ```

use ficket_core::providers::{NamedLockStore, QueueStore, SeatLockStore};

/// Waiting queue and working slot service
pub mod admission;

/// Service configuration
pub mod config;

/// Expiration handling
pub mod expiry;

/// Disconnect grace window
pub mod grace;

/// Scoped named locks
pub mod lock;

/// Prometheus metrics for observability
pub mod metrics;

/// Notifier backed by the connection registry
pub mod notifier;

/// Live connection routing table
pub mod registry;

/// Retry logic with exponential backoff
pub mod retry;

/// Seat lease service
pub mod seat_lock;

pub use admission::{QueueAdmissionService, QueueTick};
pub use config::{AdmissionConfig, LockConfig, RealtimeConfig, SeatLockConfig};
pub use expiry::{ExpiryOutcome, ExpiryReactor};
pub use grace::{DisconnectGrace, ReleasePlan, ReleaseSession, SessionReleaser};
pub use lock::NamedLock;
pub use notifier::ClientNotifier;
pub use registry::{ChannelKey, ConnectionId, ConnectionRegistry, Registration};
pub use seat_lock::SeatLockCoordinator;

/// A store that backs every service.
///
/// Blanket-implemented; exists so applications can name one type parameter.
pub trait StoreBackend: QueueStore + SeatLockStore + NamedLockStore + Clone + Send + Sync + 'static {}

impl<T> StoreBackend for T where T: QueueStore + SeatLockStore + NamedLockStore + Clone + Send + Sync + 'static {}
