//! Configuration management for the Ficket server.
//!
//! Loads configuration from environment variables with sensible defaults.

use ficket_runtime::{AdmissionConfig, LockConfig, RealtimeConfig, SeatLockConfig};
use ficket_web::ServiceConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Redis configuration
    pub redis: RedisConfig,
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Waiting queue and working slots
    pub queue: QueueConfig,
    /// Seat leases
    pub seats: SeatConfig,
    /// WebSocket channels
    pub realtime: ChannelConfig,
    /// Expiry handling
    pub expiry: ExpiryConfig,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL without a database path
    pub url: String,
    /// Logical database index
    pub database: i64,
    /// Run `CONFIG SET notify-keyspace-events Ex` before subscribing
    pub configure_notifications: bool,
}

impl RedisConfig {
    /// The URL with the database index appended.
    #[must_use]
    pub fn connection_url(&self) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), self.database)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

/// Queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Working lease TTL in seconds (default: 20 minutes)
    pub working_ttl_secs: u64,
    /// Concurrent working slots per event when no override is set
    pub default_max_concurrent: u32,
    /// Highest rank that is offered a slot
    pub promote_threshold: u64,
    /// Highest rank reported as `ALMOST_DONE`
    pub almost_done_threshold: u64,
    /// Status push interval in seconds
    pub status_interval_secs: u64,
}

/// Seat lease configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatConfig {
    /// Seat lease TTL in seconds (default: 8 minutes)
    pub lease_ttl_secs: u64,
    /// Seats one user may hold per schedule
    pub max_per_selection: u32,
}

/// WebSocket channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Seconds a dropped connection has to come back
    pub disconnect_grace_secs: u64,
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Idle timeout in seconds
    pub idle_timeout_secs: u64,
}

/// Expiry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryConfig {
    /// Orphan sweep interval in seconds
    pub sweep_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable values fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            redis: RedisConfig {
                url: lookup("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
                database: parse_or(&lookup, "REDIS_DATABASE", 0),
                configure_notifications: parse_or(&lookup, "REDIS_CONFIGURE_NOTIFICATIONS", false),
            },
            server: ServerConfig {
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "PORT", 8080),
                shutdown_timeout: parse_or(&lookup, "SHUTDOWN_TIMEOUT", 30),
            },
            queue: QueueConfig {
                working_ttl_secs: parse_or(&lookup, "QUEUE_WORKING_TTL_SECS", 1200),
                default_max_concurrent: parse_or(&lookup, "QUEUE_DEFAULT_MAX_CONCURRENT", 100),
                promote_threshold: parse_or(&lookup, "QUEUE_PROMOTE_THRESHOLD", 1),
                almost_done_threshold: parse_or(&lookup, "QUEUE_ALMOST_DONE_THRESHOLD", 100),
                status_interval_secs: parse_or(&lookup, "QUEUE_STATUS_INTERVAL_SECS", 5),
            },
            seats: SeatConfig {
                lease_ttl_secs: parse_or(&lookup, "SEAT_LEASE_TTL_SECS", 480),
                max_per_selection: parse_or(&lookup, "SEAT_MAX_PER_SELECTION", 4),
            },
            realtime: ChannelConfig {
                disconnect_grace_secs: parse_or(&lookup, "REALTIME_DISCONNECT_GRACE_SECS", 5),
                max_connections: parse_or(&lookup, "REALTIME_MAX_CONNECTIONS", 10_000),
                idle_timeout_secs: parse_or(&lookup, "REALTIME_IDLE_TIMEOUT_SECS", 300),
            },
            expiry: ExpiryConfig {
                sweep_interval_secs: parse_or(&lookup, "EXPIRY_SWEEP_INTERVAL_SECS", 60),
            },
        }
    }

    /// Address the HTTP listener binds to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Typed configuration for the web services.
    #[must_use]
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            admission: AdmissionConfig::default()
                .with_working_lease_ttl(Duration::from_secs(self.queue.working_ttl_secs))
                .with_default_max_concurrent(self.queue.default_max_concurrent)
                .with_promote_threshold(self.queue.promote_threshold)
                .with_almost_done_threshold(self.queue.almost_done_threshold),
            seats: SeatLockConfig::default()
                .with_lease_ttl(Duration::from_secs(self.seats.lease_ttl_secs))
                .with_max_seats_per_selection(self.seats.max_per_selection),
            realtime: RealtimeConfig::default()
                .with_status_interval(Duration::from_secs(self.queue.status_interval_secs))
                .with_disconnect_grace(Duration::from_secs(self.realtime.disconnect_grace_secs))
                .with_max_connections(self.realtime.max_connections)
                .with_idle_timeout(Duration::from_secs(self.realtime.idle_timeout_secs)),
            lock: LockConfig::default(),
        }
    }

    /// Interval of the orphan working-lease sweep.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry.sweep_interval_secs)
    }

    /// How long in-flight requests may run after a shutdown signal.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout)
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|s| s.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = load(&[]);

        assert_eq!(config.redis.connection_url(), "redis://127.0.0.1:6379/0");
        assert!(!config.redis.configure_notifications);
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));

        let services = config.service_config();
        assert_eq!(services.admission.working_lease_ttl, Duration::from_secs(1200));
        assert_eq!(services.admission.default_max_concurrent, 100);
        assert_eq!(services.admission.promote_threshold, 1);
        assert_eq!(services.admission.almost_done_threshold, 100);
        assert_eq!(services.seats.lease_ttl, Duration::from_secs(480));
        assert_eq!(services.seats.max_seats_per_selection, 4);
        assert_eq!(services.realtime.status_interval, Duration::from_secs(5));
        assert_eq!(services.realtime.disconnect_grace, Duration::from_secs(5));
        assert_eq!(services.realtime.max_connections, 10_000);
        assert_eq!(services.realtime.idle_timeout, Duration::from_secs(300));
    }

    #[test]
    fn values_are_read_from_the_environment() {
        let config = load(&[
            ("REDIS_URL", "redis://cache:6380/"),
            ("REDIS_DATABASE", "3"),
            ("REDIS_CONFIGURE_NOTIFICATIONS", "true"),
            ("PORT", "9000"),
            ("QUEUE_DEFAULT_MAX_CONCURRENT", "250"),
            ("SEAT_MAX_PER_SELECTION", "6"),
            ("REALTIME_DISCONNECT_GRACE_SECS", "10"),
        ]);

        assert_eq!(config.redis.connection_url(), "redis://cache:6380/3");
        assert!(config.redis.configure_notifications);
        assert_eq!(config.server.port, 9000);

        let services = config.service_config();
        assert_eq!(services.admission.default_max_concurrent, 250);
        assert_eq!(services.seats.max_seats_per_selection, 6);
        assert_eq!(services.realtime.disconnect_grace, Duration::from_secs(10));
    }

    #[test]
    fn unparsable_values_fall_back_to_defaults() {
        let config = load(&[("PORT", "eighty"), ("SEAT_LEASE_TTL_SECS", "-1")]);

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.seats.lease_ttl_secs, 480);
    }
}
