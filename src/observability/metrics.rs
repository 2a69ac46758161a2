//! # Metrics Collection
//!
//! Counters recorded through the `metrics` facade. They are no-ops until a
//! recorder is installed; [`init_metrics`] installs the Prometheus exporter.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use ::tracing::{info, warn};
use metrics::{counter, describe_counter, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

pub const LOGIN_TOTAL: &str = "credence_login_total";
pub const REFRESH_TOTAL: &str = "credence_refresh_total";
pub const REFRESH_REUSE_DETECTED_TOTAL: &str = "credence_refresh_reuse_detected_total";
pub const TOKENS_SWEPT_TOTAL: &str = "credence_tokens_swept_total";
pub const WORKFLOW_FAILURES_TOTAL: &str = "credence_workflow_failures_total";

/// Records credential-core metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Register descriptions and zero the counters so they export before first use.
    pub fn register(&self) {
        describe_counter!(LOGIN_TOTAL, Unit::Count, "Login attempts by outcome");
        describe_counter!(REFRESH_TOTAL, Unit::Count, "Refresh token rotations by outcome");
        describe_counter!(
            REFRESH_REUSE_DETECTED_TOTAL,
            Unit::Count,
            "Revoked refresh tokens presented again"
        );
        describe_counter!(TOKENS_SWEPT_TOTAL, Unit::Count, "Dead tokens deleted by cleanup sweeps");
        describe_counter!(
            WORKFLOW_FAILURES_TOTAL,
            Unit::Count,
            "Workflow operations that returned an error, by kind"
        );

        for outcome in ["success", "failure"] {
            counter!(LOGIN_TOTAL, "outcome" => outcome).absolute(0);
            counter!(REFRESH_TOTAL, "outcome" => outcome).absolute(0);
        }
        counter!(REFRESH_REUSE_DETECTED_TOTAL).absolute(0);
        for kind in ["refresh", "email"] {
            counter!(TOKENS_SWEPT_TOTAL, "kind" => kind).absolute(0);
        }
    }

    pub fn record_login(&self, success: bool) {
        counter!(LOGIN_TOTAL, "outcome" => outcome(success)).increment(1);
    }

    pub fn record_refresh(&self, success: bool) {
        counter!(REFRESH_TOTAL, "outcome" => outcome(success)).increment(1);
    }

    pub fn record_reuse_detected(&self) {
        counter!(REFRESH_REUSE_DETECTED_TOTAL).increment(1);
    }

    /// `kind` is `"refresh"` or `"email"`.
    pub fn record_tokens_swept(&self, kind: &'static str, count: u64) {
        counter!(TOKENS_SWEPT_TOTAL, "kind" => kind).increment(count);
    }

    pub fn record_workflow_failure(&self, operation: &'static str, kind: &'static str) {
        counter!(WORKFLOW_FAILURES_TOTAL, "operation" => operation, "kind" => kind).increment(1);
    }
}

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Install the Prometheus exporter and register the counters.
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no bind address configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        Error::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    MetricsRecorder::new().register();

    info!(
        metrics_addr = %metrics_addr,
        service_name = %config.service_name,
        "Metrics collection initialized"
    );
    Ok(())
}
