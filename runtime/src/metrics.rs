//! Prometheus metrics.
//!
//! Services record through the small recorder structs below; the web layer
//! renders the installed [`PrometheusHandle`] at `/metrics`.
//!
//! # Example
//!
//! ```rust,no_run
//! use ficket_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let recorder = MetricsRecorder::install()?;
//! let text = recorder.render();
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installed Prometheus recorder.
#[derive(Clone)]
pub struct MetricsRecorder {
    handle: PrometheusHandle,
}

impl MetricsRecorder {
    /// Describe every metric and install the global Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Install` if a recorder is already installed.
    pub fn install() -> Result<Self, MetricsError> {
        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = builder
            .install_recorder()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        register_metrics();
        tracing::info!("Prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Render current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder").finish_non_exhaustive()
    }
}

fn register_metrics() {
    // Queue
    describe_counter!("queue_entries_total", "Users appended to a waiting queue");
    describe_counter!(
        "queue_admissions_total",
        "Admission attempts by outcome (granted, denied)"
    );
    describe_counter!(
        "queue_slots_released_total",
        "Working slots returned to the pool by reason (leave, expired, operator)"
    );
    describe_histogram!(
        "queue_admission_duration_seconds",
        "Time taken by the admission script"
    );

    // Seats
    describe_counter!(
        "seat_preoccupy_total",
        "Seat lease attempts by outcome (locked, conflict, rejected)"
    );
    describe_counter!("seat_leases_released_total", "Seat leases released explicitly");
    describe_counter!("seat_leases_consumed_total", "Seat leases taken by the payment flow");

    // Expiry
    describe_counter!(
        "expiry_events_total",
        "Expired keys processed by kind (working_lease, seat_selection, ignored)"
    );
    describe_counter!(
        "expiry_reaped_total",
        "Working leases reaped by source (notification, sweep)"
    );
    describe_counter!("expiry_errors_total", "Expired keys whose handling failed");

    // Realtime
    describe_gauge!("realtime_connections", "Open real-time connections");
    describe_counter!(
        "realtime_notices_total",
        "Notices pushed to clients by outcome (delivered, undeliverable)"
    );
    describe_counter!(
        "realtime_disconnect_releases_total",
        "Resources released after the disconnect grace window"
    );
}

/// Queue metrics recorder.
pub struct AdmissionMetrics;

impl AdmissionMetrics {
    /// Record a queue entry.
    pub fn record_entry() {
        counter!("queue_entries_total").increment(1);
    }

    /// Record an admission attempt.
    pub fn record_admission(granted: bool, duration: Duration) {
        let outcome = if granted { "granted" } else { "denied" };
        counter!("queue_admissions_total", "outcome" => outcome).increment(1);
        histogram!("queue_admission_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a slot returned to the pool.
    pub fn record_slot_released(reason: &'static str) {
        counter!("queue_slots_released_total", "reason" => reason).increment(1);
    }
}

/// Seat metrics recorder.
pub struct SeatMetrics;

impl SeatMetrics {
    /// Record a preoccupy attempt.
    pub fn record_preoccupy(outcome: &'static str) {
        counter!("seat_preoccupy_total", "outcome" => outcome).increment(1);
    }

    /// Record released leases.
    pub fn record_released(count: usize) {
        counter!("seat_leases_released_total").increment(u64::try_from(count).unwrap_or(u64::MAX));
    }

    /// Record a consumed lease.
    pub fn record_consumed() {
        counter!("seat_leases_consumed_total").increment(1);
    }
}

/// Expiry metrics recorder.
pub struct ExpiryMetrics;

impl ExpiryMetrics {
    /// Record a processed expired key.
    pub fn record_event(kind: &'static str) {
        counter!("expiry_events_total", "kind" => kind).increment(1);
    }

    /// Record a reaped lease.
    pub fn record_reaped(source: &'static str) {
        counter!("expiry_reaped_total", "source" => source).increment(1);
    }

    /// Record a handling failure.
    pub fn record_error() {
        counter!("expiry_errors_total").increment(1);
    }
}

/// Realtime metrics recorder.
pub struct RealtimeMetrics;

impl RealtimeMetrics {
    /// Set the open connection gauge.
    #[allow(clippy::cast_precision_loss)]
    pub fn set_connections(count: usize) {
        gauge!("realtime_connections").set(count as f64);
    }

    /// Record a notice push.
    pub fn record_notice(delivered: bool) {
        let outcome = if delivered { "delivered" } else { "undeliverable" };
        counter!("realtime_notices_total", "outcome" => outcome).increment(1);
    }

    /// Record a grace-window release.
    pub fn record_disconnect_release() {
        counter!("realtime_disconnect_releases_total").increment(1);
    }
}
